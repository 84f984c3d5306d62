//! SQLite-backed implementation of the catalog repositories.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::models::{Album, Artist, DownloadLog, Track};
use super::repository::{
    AlbumRepository, ArtistRepository, DownloadLedger, TrackFileRecord, TrackRepository,
};
use super::DbError;

/// Column list matching [`map_artist_row`].
pub const ARTIST_COLUMNS: &str = "id, name, bio, image";

/// Column list matching [`map_album_row`].
pub const ALBUM_COLUMNS: &str = "id, title, artist_id, release_date, cover_image";

/// Column list matching [`map_track_row`].
pub const TRACK_COLUMNS: &str =
    "id, title, album_id, artist_id, file, preview_file, duration, genre, created_at";

/// Catalog store sharing the application's SQLite connection.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Mutex<Connection>>,
}

impl CatalogStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TrackRepository for CatalogStore {
    async fn find_for_delivery(&self, track_id: i64) -> Result<Option<TrackFileRecord>, DbError> {
        let db = self.db.lock().await;

        let record = db
            .query_row(
                r#"
                SELECT t.id, t.title, a.name, t.file
                FROM tracks t
                JOIN artists a ON a.id = t.artist_id
                WHERE t.id = ?1
                "#,
                [track_id],
                |row| {
                    Ok(TrackFileRecord {
                        track_id: row.get(0)?,
                        title: row.get(1)?,
                        artist_name: row.get(2)?,
                        file: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }
}

#[async_trait]
impl DownloadLedger for CatalogStore {
    async fn append(
        &self,
        user_id: i64,
        track_id: i64,
        at: DateTime<Utc>,
    ) -> Result<DownloadLog, DbError> {
        let downloaded_at = at.to_rfc3339_opts(SecondsFormat::Micros, true);

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO download_logs (user_id, track_id, downloaded_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, track_id, downloaded_at],
        )?;

        Ok(DownloadLog {
            id: db.last_insert_rowid(),
            user_id,
            track_id,
            downloaded_at,
        })
    }
}

#[async_trait]
impl ArtistRepository for CatalogStore {
    async fn find_or_create_artist(
        &self,
        name: &str,
        bio: &str,
    ) -> Result<(Artist, bool), DbError> {
        let db = self.db.lock().await;

        // The unique index on artists(name) makes concurrent creators converge.
        let inserted = db.execute(
            "INSERT INTO artists (name, bio) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            rusqlite::params![name, bio],
        )?;

        let artist = db.query_row(
            &format!("SELECT {} FROM artists WHERE name = ?1", ARTIST_COLUMNS),
            [name],
            map_artist_row,
        )?;

        if inserted > 0 {
            tracing::info!(artist_id = artist.id, name = %artist.name, "Artist created");
        }

        Ok((artist, inserted > 0))
    }
}

#[async_trait]
impl AlbumRepository for CatalogStore {
    async fn find_or_create_album(
        &self,
        title: &str,
        artist_id: i64,
        release_date: &str,
    ) -> Result<(Album, bool), DbError> {
        let db = self.db.lock().await;

        let inserted = db.execute(
            r#"
            INSERT INTO albums (title, artist_id, release_date) VALUES (?1, ?2, ?3)
            ON CONFLICT(artist_id, title) DO NOTHING
            "#,
            rusqlite::params![title, artist_id, release_date],
        )?;

        let album = db.query_row(
            &format!(
                "SELECT {} FROM albums WHERE artist_id = ?1 AND title = ?2",
                ALBUM_COLUMNS
            ),
            rusqlite::params![artist_id, title],
            map_album_row,
        )?;

        if inserted > 0 {
            tracing::info!(album_id = album.id, title = %album.title, "Album created");
        }

        Ok((album, inserted > 0))
    }
}

/// Maps a database row to an Artist struct.
pub fn map_artist_row(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        bio: row.get(2)?,
        image: row.get(3)?,
    })
}

/// Maps a database row to an Album struct.
pub fn map_album_row(row: &rusqlite::Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        artist_id: row.get(2)?,
        release_date: row.get(3)?,
        cover_image: row.get(4)?,
    })
}

/// Maps a database row to a Track struct.
pub fn map_track_row(row: &rusqlite::Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        album_id: row.get(2)?,
        artist_id: row.get(3)?,
        file: row.get(4)?,
        preview_file: row.get(5)?,
        duration: row.get(6)?,
        genre: row.get(7)?,
        created_at: row.get(8)?,
    })
}
