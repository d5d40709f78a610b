use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use engine::AspectRatio;
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "veo-studio")]
#[command(about = "Build a short movie by generating and extending clips one prompt at a time")]
#[command(version)]
pub struct Cli {
    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory of pre-rendered clips served as generation results
    #[arg(short, long)]
    pub library: Option<PathBuf>,

    /// Directory that downloads are written to
    #[arg(short, long)]
    pub export_dir: Option<PathBuf>,

    /// External program used to play clips (for example `ffplay -autoexit`)
    #[arg(short, long)]
    pub player: Option<String>,

    /// Aspect ratio of the first clip (16:9 or 9:16)
    #[arg(short, long)]
    pub aspect_ratio: Option<AspectRatio>,

    #[arg(short, long)]
    pub verbose: bool,
}

/// Values accepted in the JSON config file.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ConfigFile {
    pub library: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub player: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    pub verbose: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Resolved studio settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub library: PathBuf,
    pub export_dir: PathBuf,
    pub player: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub verbose: bool,
}

impl StudioConfig {
    /// Reads the config file named on the command line, if any, and merges it.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Self::merge(cli, file)
    }

    /// Command-line flags win over file values, which win over defaults.
    pub fn merge(cli: Cli, file: ConfigFile) -> Result<Self> {
        let Some(library) = cli.library.or(file.library) else {
            bail!("no clip library configured (pass --library or set `library` in the config file)");
        };

        Ok(Self {
            library,
            export_dir: cli
                .export_dir
                .or(file.export_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            player: cli.player.or(file.player).filter(|p| !p.trim().is_empty()),
            aspect_ratio: cli.aspect_ratio.or(file.aspect_ratio).unwrap_or_default(),
            verbose: cli.verbose || file.verbose.unwrap_or(false),
        })
    }
}
