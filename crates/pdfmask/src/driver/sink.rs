use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

use crate::config::CoordinatorConfig;
use crate::error::OutputError;
use crate::sanitize::redact_filename;

/// Destination for downloaded artifacts.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Stores `content` under (a variant of) `file_name` and returns where it went.
    async fn save(&self, file_name: &str, content: Vec<u8>) -> Result<PathBuf, OutputError>;
}

/// Writes artifacts into a directory, never overwriting an existing file.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self::new(config.resolved_download_dir())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn available_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.directory.join(file_name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }

        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

        let mut counter = 1;
        loop {
            let name = match &extension {
                Some(ext) => format!("{} ({}).{}", stem, counter, ext),
                None => format!("{} ({})", stem, counter),
            };
            let candidate = self.directory.join(name);
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            counter += 1;
        }
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn save(&self, file_name: &str, content: Vec<u8>) -> Result<PathBuf, OutputError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| OutputError::CreateDirectory {
                path: self.directory.clone(),
                source,
            })?;

        let file_name = safe_file_name(file_name);
        let path = self.available_path(&file_name).await;
        tokio::fs::write(&path, &content)
            .await
            .map_err(|source| OutputError::WriteFile {
                path: path.clone(),
                source,
            })?;

        info!(
            "Saved {} ({} bytes) to {}",
            redact_filename(&file_name),
            content.len(),
            self.directory.display()
        );
        Ok(path)
    }
}

/// Keeps only the final path component of a name supplied by the service.
fn safe_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download".to_string())
}
