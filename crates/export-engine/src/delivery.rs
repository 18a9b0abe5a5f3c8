//! Handing finished exports to the host.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use framecast_common::error::{ExportError, ExportResult};
use framecast_export_model::is_plain_file_name;

/// MIME type of every artifact the pipeline produces.
pub const MP4_MIME_TYPE: &str = "video/mp4";

/// A finalized container.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    /// Suggested file name, `<name>.mp4`.
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl ExportArtifact {
    pub fn mp4(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: MP4_MIME_TYPE,
            bytes,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Receives finished artifacts.
#[async_trait::async_trait]
pub trait ArtifactDelivery: Send + Sync {
    async fn deliver(&self, artifact: &ExportArtifact) -> ExportResult<()>;
}

/// Writes artifacts into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where an artifact with this file name lands.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

#[async_trait::async_trait]
impl ArtifactDelivery for DirectoryDelivery {
    async fn deliver(&self, artifact: &ExportArtifact) -> ExportResult<()> {
        if !is_plain_file_name(&artifact.file_name) {
            return Err(ExportError::invalid_settings(format!(
                "artifact name {:?} would leave {}",
                artifact.file_name,
                self.dir.display()
            )));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&artifact.file_name);
        tokio::fs::write(&path, &artifact.bytes).await?;
        tracing::info!(
            path = %path.display(),
            bytes = artifact.len(),
            "Export delivered"
        );
        Ok(())
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingDelivery {
    artifacts: Arc<Mutex<Vec<ExportArtifact>>>,
}

impl CollectingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> Vec<ExportArtifact> {
        self.artifacts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait::async_trait]
impl ArtifactDelivery for CollectingDelivery {
    async fn deliver(&self, artifact: &ExportArtifact) -> ExportResult<()> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_delivery_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = DirectoryDelivery::new(dir.path().join("nested"));
        let artifact = ExportArtifact::mp4("clip.mp4", vec![1, 2, 3]);
        delivery.deliver(&artifact).await.unwrap();

        let written = std::fs::read(dir.path().join("nested/clip.mp4")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_directory_delivery_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = DirectoryDelivery::new(dir.path().join("out"));
        let artifact = ExportArtifact::mp4("../escaped.mp4", vec![1]);
        assert!(delivery.deliver(&artifact).await.is_err());
        assert!(!dir.path().join("escaped.mp4").exists());
    }

    #[tokio::test]
    async fn test_collecting_delivery_keeps_artifacts() {
        let delivery = CollectingDelivery::new();
        delivery
            .deliver(&ExportArtifact::mp4("a.mp4", vec![0]))
            .await
            .unwrap();
        let artifacts = delivery.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].mime_type, "video/mp4");
    }
}
