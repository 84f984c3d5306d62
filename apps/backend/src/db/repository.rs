//! Repository interfaces over the catalog and the download ledger.
//!
//! The download flow and the admin handlers depend on these traits rather
//! than on a connection, so alternative stores can be swapped in for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{Album, Artist, DownloadLog};
use super::DbError;

/// The slice of a track the download flow needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFileRecord {
    pub track_id: i64,
    pub title: String,
    pub artist_name: String,
    /// Storage reference of the primary audio asset, empty when missing.
    pub file: String,
}

#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Looks up a track together with its artist name.
    async fn find_for_delivery(&self, track_id: i64) -> Result<Option<TrackFileRecord>, DbError>;
}

/// Append-only log of download events.
#[async_trait]
pub trait DownloadLedger: Send + Sync {
    async fn append(
        &self,
        user_id: i64,
        track_id: i64,
        at: DateTime<Utc>,
    ) -> Result<DownloadLog, DbError>;
}

#[async_trait]
pub trait ArtistRepository: Send + Sync {
    /// Returns the artist named `name`, creating it with `bio` if absent.
    ///
    /// The boolean is `true` when the artist was created by this call.
    async fn find_or_create_artist(&self, name: &str, bio: &str)
        -> Result<(Artist, bool), DbError>;
}

#[async_trait]
pub trait AlbumRepository: Send + Sync {
    /// Returns the album `title` owned by `artist_id`, creating it with
    /// `release_date` if absent.
    ///
    /// The boolean is `true` when the album was created by this call.
    async fn find_or_create_album(
        &self,
        title: &str,
        artist_id: i64,
        release_date: &str,
    ) -> Result<(Album, bool), DbError>;
}
