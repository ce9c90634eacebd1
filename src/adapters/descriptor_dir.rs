use crate::domain::model::{DeviceDescriptor, DeviceDescriptorSet};
use crate::domain::ports::DescriptorStore;
use crate::utils::error::{JugglerError, Result};
use std::path::{Path, PathBuf};

/// Reads one descriptor per regular file directly inside a directory. The
/// file's base name becomes the descriptor name; subdirectories are skipped.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn read_error(path: &Path, source: std::io::Error) -> JugglerError {
    JugglerError::DescriptorRead {
        path: path.to_path_buf(),
        source,
    }
}

impl DescriptorStore for DirectoryStore {
    async fn read_all(&self) -> Result<DeviceDescriptorSet> {
        tracing::info!("Reading files from {}", self.dir.display());
        let mut devices = DeviceDescriptorSet::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| read_error(&self.dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| read_error(&self.dir, e))?
        {
            let path = entry.path();
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| read_error(&path, e))?;
            if metadata.is_dir() {
                tracing::debug!("Skipping directory {}", path.display());
                continue;
            }

            let xml = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| read_error(&path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            tracing::debug!("Loaded device {} ({} bytes)", name, xml.len());
            devices.insert(DeviceDescriptor::new(name, xml));
        }

        if devices.is_empty() {
            tracing::warn!("No device files found in {}", self.dir.display());
        }
        Ok(devices)
    }
}
