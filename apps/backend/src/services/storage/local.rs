//! Local filesystem storage adapter.
//!
//! References resolve to files under a single media root directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use super::{content_type_for, StorageAdapter, StorageError, StorageKind, StoredFile};

/// Public path prefix under which the media root is served.
pub const MEDIA_URL_PREFIX: &str = "/media";

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Validates that a reference stays inside the media root.
    ///
    /// Rejects empty and absolute references, `..` components, and symlinks
    /// that resolve outside the root. Returns the full path if safe.
    async fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let path = Path::new(reference);
        if reference.trim().is_empty() {
            return Err(StorageError::InvalidReference("empty reference".to_string()));
        }

        let mut current = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    current.push(part);
                    if let Ok(metadata) = tokio::fs::symlink_metadata(&current).await {
                        if metadata.is_symlink() {
                            let resolved = tokio::fs::canonicalize(&current).await?;
                            let canonical_root = tokio::fs::canonicalize(&self.root).await?;
                            if !resolved.starts_with(&canonical_root) {
                                return Err(StorageError::InvalidReference(format!(
                                    "{} escapes the media root",
                                    reference
                                )));
                            }
                        }
                    }
                }
                Component::CurDir => {}
                _ => {
                    return Err(StorageError::InvalidReference(format!(
                        "{} contains {:?}",
                        reference, component
                    )));
                }
            }
        }

        Ok(current)
    }
}

fn not_found_or_io(reference: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(reference.to_string())
    } else {
        StorageError::Io(e)
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn open(&self, reference: &str) -> Result<StoredFile, StorageError> {
        let full_path = self.resolve(reference).await?;

        let file = tokio::fs::File::open(&full_path)
            .await
            .map_err(|e| not_found_or_io(reference, e))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(reference.to_string()));
        }

        tracing::debug!(path = ?full_path, size = metadata.len(), "Opened stored file");

        Ok(StoredFile {
            reader: Box::pin(file),
            len: Some(metadata.len()),
            content_type: content_type_for(reference),
        })
    }

    async fn signed_url(
        &self,
        _reference: &str,
        _content_disposition: &str,
        _ttl: Duration,
    ) -> Result<String, StorageError> {
        Err(StorageError::Unsupported("signed URLs"))
    }

    async fn save(&self, reference: &str, data: Bytes) -> Result<(), StorageError> {
        let full_path = self.resolve(reference).await?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, &data).await?;

        tracing::debug!(path = ?full_path, size = data.len(), "File written");
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let full_path = self.resolve(reference).await?;

        tokio::fs::remove_file(&full_path)
            .await
            .map_err(|e| not_found_or_io(reference, e))?;

        tracing::debug!(path = ?full_path, "File deleted");
        Ok(())
    }

    fn public_url(&self, reference: &str) -> String {
        format!(
            "{}/{}",
            MEDIA_URL_PREFIX,
            reference.trim_start_matches('/')
        )
    }
}
