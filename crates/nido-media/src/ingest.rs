//! [`MediaIngest`] ties classification and storage together.

use std::sync::Arc;

use tracing::debug;

use nido_shared::media::MediaDescriptor;

use crate::error::MediaError;
use crate::mime::{format_from_mime, kind_from_mime};
use crate::storage::ObjectStorage;

/// The media ingestion adapter: classify, upload, describe.
#[derive(Clone)]
pub struct MediaIngest {
    storage: Arc<dyn ObjectStorage>,
}

impl MediaIngest {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Upload a payload and produce its descriptor.
    ///
    /// Callers treat a failure here as a precondition failure: the enclosing
    /// send / create / reply operation must abort without persisting
    /// anything.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<MediaDescriptor, MediaError> {
        let kind = kind_from_mime(mime_type);
        let format = format_from_mime(mime_type);

        let url = self.storage.put(bytes, mime_type, filename).await?;

        debug!(%kind, ?format, %url, "ingested media attachment");

        Ok(MediaDescriptor { url, kind, format })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsObjectStorage;
    use async_trait::async_trait;
    use nido_shared::media::MediaKind;
    use tempfile::TempDir;

    struct FailingStorage;

    #[async_trait]
    impl ObjectStorage for FailingStorage {
        async fn put(&self, _: &[u8], _: &str, _: &str) -> Result<String, MediaError> {
            Err(MediaError::Storage("bucket offline".to_string()))
        }
    }

    #[tokio::test]
    async fn ingest_produces_full_descriptor() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path().to_path_buf(), 1024, "/media")
            .await
            .unwrap();
        let ingest = MediaIngest::new(Arc::new(storage));

        let descriptor = ingest.ingest(b"pixels", "image/png", "pic.png").await.unwrap();
        assert_eq!(descriptor.kind, MediaKind::Image);
        assert_eq!(descriptor.format.as_deref(), Some("png"));
        assert!(descriptor.url.starts_with("/media/"));
    }

    #[tokio::test]
    async fn unrecognized_subtype_keeps_attachment_without_format() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path().to_path_buf(), 1024, "/media")
            .await
            .unwrap();
        let ingest = MediaIngest::new(Arc::new(storage));

        let descriptor = ingest
            .ingest(b"data", "application/x-proprietary", "blob")
            .await
            .unwrap();
        assert_eq!(descriptor.kind, MediaKind::Document);
        assert_eq!(descriptor.format, None);
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let ingest = MediaIngest::new(Arc::new(FailingStorage));
        let err = ingest.ingest(b"data", "image/png", "pic.png").await.unwrap_err();
        assert!(matches!(err, MediaError::Storage(_)));
    }
}
