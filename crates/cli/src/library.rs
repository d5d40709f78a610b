use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use engine::{
    AspectRatio, ClipAsset, GeneratedClip, GenerationBackend, GenerationFailure,
    GenerationOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Offline generation backend that serves pre-rendered clips.
///
/// Clips are the regular files of one directory in file-name order. A new
/// sequence starts with the first file; each extension serves the file after
/// the one recorded in the asset it extends.
#[derive(Debug, Clone)]
pub struct ClipLibraryBackend {
    dir: PathBuf,
}

/// Asset format owned by this backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibraryAsset {
    clip: String,
    position: usize,
    aspect_ratio: AspectRatio,
}

impl ClipLibraryBackend {
    /// Opens a library directory; it must exist and hold at least one clip.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let backend = Self { dir: dir.into() };
        let clips = backend
            .clip_paths()
            .with_context(|| format!("failed to read clip library {}", backend.dir.display()))?;
        ensure!(
            !clips.is_empty(),
            "clip library {} has no clips",
            backend.dir.display()
        );
        info!(dir = %backend.dir.display(), clips = clips.len(), "clip library opened");
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn clip_paths(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn serve(&self, position: usize, prompt: &str, aspect_ratio: AspectRatio) -> GenerationOutcome {
        let clips = self
            .clip_paths()
            .map_err(|err| GenerationFailure::new(format!("clip library unavailable: {err}")))?;
        let Some(path) = clips.get(position) else {
            return Err(GenerationFailure::new(format!(
                "clip library exhausted after {} clips",
                clips.len()
            )));
        };
        let bytes = fs::read(path).map_err(|err| {
            GenerationFailure::new(format!("failed to read clip {}: {err}", path.display()))
        })?;

        let asset = LibraryAsset {
            clip: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            position,
            aspect_ratio,
        };
        debug!(position, clip = %asset.clip, prompt, "serving library clip");
        let asset = serde_json::to_value(&asset)
            .map_err(|err| GenerationFailure::new(format!("failed to encode clip asset: {err}")))?;

        Ok(GeneratedClip {
            media: Arc::from(bytes),
            asset: ClipAsset::new(asset),
        })
    }
}

impl GenerationBackend for ClipLibraryBackend {
    fn request_new_clip(&self, prompt: &str, aspect_ratio: AspectRatio) -> GenerationOutcome {
        self.serve(0, prompt, aspect_ratio)
    }

    fn request_extension(&self, asset: &ClipAsset, prompt: &str) -> GenerationOutcome {
        let previous: LibraryAsset = serde_json::from_value(asset.as_value().clone())
            .map_err(|err| GenerationFailure::new(format!("malformed clip asset: {err}")))?;
        self.serve(previous.position + 1, prompt, previous.aspect_ratio)
    }
}
