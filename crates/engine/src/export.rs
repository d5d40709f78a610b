use std::fs;
use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Local file export used by downloads.
pub trait LocalExport {
    /// Saves `bytes` under `file_name` and returns where they landed.
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Exporter that writes files into one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryExport {
    dir: PathBuf,
}

impl DirectoryExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LocalExport for DirectoryExport {
    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        ensure_plain_file_name(file_name)?;
        fs::create_dir_all(&self.dir).map_err(|source| EngineError::ExportIo {
            context: "failed to create export directory",
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(file_name);
        fs::write(&path, bytes).map_err(|source| EngineError::ExportIo {
            context: "failed to write exported clip",
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = bytes.len(), "clip exported");
        Ok(path)
    }
}

/// File name used when downloading the clip of entry `entry_id`.
pub fn download_file_name(entry_id: Uuid) -> String {
    format!("veo-studio-{entry_id}.mp4")
}

fn ensure_plain_file_name(file_name: &str) -> Result<()> {
    let plain = !file_name.is_empty()
        && file_name != "."
        && file_name != ".."
        && !file_name.contains(['/', '\\']);
    if plain {
        Ok(())
    } else {
        Err(EngineError::InvalidFileName {
            file_name: file_name.to_owned(),
        })
    }
}
