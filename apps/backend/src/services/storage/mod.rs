//! Storage adapters for media files.
//!
//! A stored reference is an opaque relative key such as
//! `tracks/4f1c..._sinnerman.flac`. The local adapter resolves it under a
//! media root directory; the S3 adapter maps it to an object key in a bucket.

mod local;
mod naming;
mod s3;

pub use local::LocalStorage;
pub use naming::{MediaSlot, NamingEngine};
pub use s3::S3Storage;

#[cfg(test)]
pub(crate) use s3::tests::offline_storage as offline_s3_storage;

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::config::{StorageBackend, StorageConfig};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage reference: {0}")]
    InvalidReference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object storage error: {0}")]
    Backend(String),

    #[error("Failed to sign URL: {0}")]
    Signing(String),

    #[error("{0} is not supported by this storage backend")]
    Unsupported(&'static str),
}

/// How the download flow delivers files from an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Files are opened and streamed through the server.
    Local,
    /// Files are handed out as time-limited signed URLs.
    Object,
}

pub type StoredReader = Pin<Box<dyn AsyncRead + Send>>;

/// An opened stored file, ready to be streamed.
pub struct StoredFile {
    pub reader: StoredReader,
    pub len: Option<u64>,
    pub content_type: String,
}

impl std::fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredFile")
            .field("len", &self.len)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Trait implemented by every storage backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Opens a stored file for reading.
    ///
    /// Returns [`StorageError::NotFound`] when nothing is stored under `reference`.
    async fn open(&self, reference: &str) -> Result<StoredFile, StorageError>;

    /// Produces a signed GET URL valid for `ttl` that asks the store to
    /// answer with the given `Content-Disposition`.
    async fn signed_url(
        &self,
        reference: &str,
        content_disposition: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;

    /// Writes `data` under `reference`, replacing any previous content.
    async fn save(&self, reference: &str, data: Bytes) -> Result<(), StorageError>;

    async fn delete(&self, reference: &str) -> Result<(), StorageError>;

    /// URL under which catalog responses expose a stored reference.
    fn public_url(&self, reference: &str) -> String;
}

/// Builds the adapter selected by `storage.backend`.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>, StorageError> {
    let adapter: Arc<dyn StorageAdapter> = match config.backend {
        StorageBackend::Local => {
            tokio::fs::create_dir_all(&config.media_root).await?;
            Arc::new(LocalStorage::new(config.media_root.clone()))
        }
        StorageBackend::S3 => Arc::new(S3Storage::new(&config.s3).await),
    };

    tracing::info!(backend = ?config.backend, "Storage adapter ready");
    Ok(adapter)
}

/// Guesses a MIME type from the reference's extension.
pub(crate) fn content_type_for(reference: &str) -> String {
    mime_guess::from_path(reference)
        .first_or_octet_stream()
        .to_string()
}
