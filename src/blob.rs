//! Object storage for bundled descriptor sets.
//!
//! Lets an AddConfig request reference a descriptor set by key instead of
//! carrying the bytes inline.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Read access to stored blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Vec<u8>>;
}

/// Blobs stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `key` below the root. Absolute paths and `..` are rejected.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let normal = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !normal {
            return Err(Error::validation("blob.download", format!("invalid blob key {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        const OP: &str = "blob.download";
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(key = %key, size = bytes.len(), "Blob downloaded");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(OP, format!("blob {key}")))
            }
            Err(e) => Err(Error::transient(OP, format!("read {}: {e}", path.display()))),
        }
    }
}
