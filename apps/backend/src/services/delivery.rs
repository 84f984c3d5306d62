//! File delivery for track downloads.
//!
//! Resolves a track's stored file into either a stream (local storage) or a
//! signed URL (object storage), recording a download event first.

use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::db::repository::{DownloadLedger, TrackRepository};
use crate::db::DbError;
use crate::services::storage::{StorageAdapter, StorageError, StorageKind, StoredFile};

/// Extension used when the stored reference has none.
const DEFAULT_EXTENSION: &str = ".mp3";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Track not found")]
    NotFound,

    #[error("No file associated with this track")]
    NoFileAssociated,

    #[error("File not found on server")]
    FileNotFound,

    #[error("Download failed: {0}")]
    DeliveryFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// What the caller should send back for a resolved download.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Stream the file as an attachment.
    Stream {
        file: StoredFile,
        filename: String,
        content_disposition: String,
    },
    /// Hand the client a time-limited URL to fetch the file from the store.
    Redirect {
        download_url: String,
        filename: String,
    },
}

pub struct DeliveryResolver<'a> {
    tracks: &'a dyn TrackRepository,
    ledger: &'a dyn DownloadLedger,
    storage: &'a dyn StorageAdapter,
    signed_url_ttl: Duration,
}

impl<'a> DeliveryResolver<'a> {
    pub fn new(
        tracks: &'a dyn TrackRepository,
        ledger: &'a dyn DownloadLedger,
        storage: &'a dyn StorageAdapter,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            tracks,
            ledger,
            storage,
            signed_url_ttl,
        }
    }

    /// Resolves a download for `requester`.
    ///
    /// The ledger row is written before any file access and stays even when
    /// the file cannot be delivered.
    pub async fn resolve_download(
        &self,
        track_id: i64,
        requester: Option<i64>,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let user_id = requester.ok_or(DeliveryError::Unauthorized)?;

        let track = self
            .tracks
            .find_for_delivery(track_id)
            .await?
            .ok_or(DeliveryError::NotFound)?;

        let entry = self.ledger.append(user_id, track.track_id, Utc::now()).await?;
        tracing::info!(track_id, user_id, log_id = entry.id, "Download logged");

        if track.file.is_empty() {
            return Err(DeliveryError::NoFileAssociated);
        }

        let filename = download_filename(&track.artist_name, &track.title, &track.file);
        let content_disposition = content_disposition(&filename);

        match self.storage.kind() {
            StorageKind::Object => {
                let download_url = self
                    .storage
                    .signed_url(&track.file, &content_disposition, self.signed_url_ttl)
                    .await
                    .map_err(|e| delivery_failed(track_id, e))?;

                Ok(DeliveryOutcome::Redirect {
                    download_url,
                    filename,
                })
            }
            StorageKind::Local => match self.storage.open(&track.file).await {
                Ok(file) => Ok(DeliveryOutcome::Stream {
                    file,
                    filename,
                    content_disposition,
                }),
                Err(StorageError::NotFound(reference)) => {
                    tracing::warn!(track_id, reference = %reference, "Track file missing from storage");
                    Err(DeliveryError::FileNotFound)
                }
                Err(e) => Err(delivery_failed(track_id, e)),
            },
        }
    }

    /// Records a download without resolving the file.
    pub async fn log_download_only(
        &self,
        track_id: i64,
        requester: Option<i64>,
    ) -> Result<(), DeliveryError> {
        let user_id = requester.ok_or(DeliveryError::Unauthorized)?;

        let track = self
            .tracks
            .find_for_delivery(track_id)
            .await?
            .ok_or(DeliveryError::NotFound)?;

        let entry = self.ledger.append(user_id, track.track_id, Utc::now()).await?;
        tracing::info!(
            track_id,
            user_id,
            log_id = entry.id,
            "Download logged without delivery"
        );

        Ok(())
    }
}

fn delivery_failed(track_id: i64, error: StorageError) -> DeliveryError {
    tracing::error!(track_id, error = %error, "Storage failure during download");
    DeliveryError::DeliveryFailed(error.to_string())
}

/// Builds the user-facing file name `"{artist} - {title}{ext}"`.
///
/// Path separators in the artist name and title become underscores; the
/// extension comes from the stored reference.
pub fn download_filename(artist_name: &str, title: &str, reference: &str) -> String {
    let extension = Path::new(reference)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    format!(
        "{} - {}{}",
        strip_separators(artist_name),
        strip_separators(title),
        extension
    )
}

fn strip_separators(value: &str) -> String {
    value.replace(['/', '\\'], "_")
}

/// Builds an attachment `Content-Disposition` value with an ASCII fallback
/// and an RFC 5987 UTF-8 form.
pub fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}
