//! The object-storage collaborator.
//!
//! [`ObjectStorage`] is the external upload seam; [`FsObjectStorage`] is the
//! bundled filesystem backend for self-hosted deployments, with the stored
//! object served back under a configurable public base URL.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MediaError;
use crate::mime::format_from_mime;

/// Bytes + metadata in, URL out.  Implementations must be safe to call from
/// concurrent connection handlers.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store the payload and return a URL the client can fetch it from.
    async fn put(&self, bytes: &[u8], mime_type: &str, filename: &str)
        -> Result<String, MediaError>;
}

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal via crafted object names.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, MediaError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(MediaError::Storage("Path traversal detected".to_string()));
            }
            _ => {} // RootDir, CurDir, Prefix -- skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(MediaError::Storage("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

/// Filesystem-backed object storage.  Objects are stored under freshly
/// generated uuid names (plus a recognized extension) so client-supplied
/// filenames never touch the filesystem.
#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    base_path: PathBuf,
    max_size: usize,
    public_base_url: String,
}

impl FsObjectStorage {
    pub async fn new(
        base_path: PathBuf,
        max_size: usize,
        public_base_url: impl Into<String>,
    ) -> Result<Self, MediaError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            MediaError::Storage(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media storage initialized");

        Ok(Self {
            base_path,
            max_size,
            public_base_url: public_base_url.into(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a stored object by its public name (for the download route).
    pub async fn read_object(&self, name: &str) -> Result<Vec<u8>, MediaError> {
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(MediaError::Storage("Path traversal detected".to_string()));
        }
        let path = ensure_within(&self.base_path, &self.base_path.join(name))?;
        if !path.exists() {
            return Err(MediaError::Storage(format!("No such object: {name}")));
        }
        Ok(fs::read(&path).await?)
    }

    fn object_name(&self, mime_type: &str, filename: &str) -> String {
        let id = Uuid::new_v4();
        // Prefer the format derived from the MIME type; fall back to the
        // original filename's extension when it is plain ascii.
        let ext = format_from_mime(mime_type).or_else(|| {
            Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
                .map(|e| e.to_ascii_lowercase())
        });

        match ext {
            Some(ext) => format!("{id}.{ext}"),
            None => id.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(
        &self,
        bytes: &[u8],
        mime_type: &str,
        filename: &str,
    ) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if bytes.len() > self.max_size {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                max: self.max_size,
            });
        }

        let name = self.object_name(mime_type, filename);
        let path = ensure_within(&self.base_path, &self.base_path.join(&name))?;

        fs::write(&path, bytes)
            .await
            .map_err(|e| MediaError::Storage(format!("Failed to write object {name}: {e}")))?;

        debug!(object = %name, size = bytes.len(), "Stored media object");
        Ok(format!("{}/{}", self.public_base_url.trim_end_matches('/'), name))
    }
}
