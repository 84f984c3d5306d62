//! Music API endpoints: catalog browsing, downloads and download history.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, Result};
use crate::middleware;
use crate::services::delivery::{DeliveryOutcome, DeliveryResolver};
use crate::services::{Claims, StorageAdapter};
use crate::AppState;

use super::{contains_pattern, MessageResponse, PageQuery, PaginatedResponse};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for listing tracks.
#[derive(Debug, Deserialize)]
pub struct ListTracksQuery {
    /// Matches title, artist name, album title or genre.
    pub search: Option<String>,
    /// Filter by artist ID.
    pub artist: Option<i64>,
    /// Filter by album ID.
    pub album: Option<i64>,
    /// Filter by genre (case-insensitive exact match).
    pub genre: Option<String>,
    /// `created_at`, `title` or `duration`, prefixed with `-` for descending.
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Query parameters for listing artists.
#[derive(Debug, Deserialize)]
pub struct ListArtistsQuery {
    pub search: Option<String>,
    /// `name` or `tracks_count`, prefixed with `-` for descending.
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Query parameters for listing albums.
#[derive(Debug, Deserialize)]
pub struct ListAlbumsQuery {
    /// Matches album title or artist name.
    pub search: Option<String>,
    pub artist: Option<i64>,
    /// `release_date` or `title`, prefixed with `-` for descending.
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// An artist with catalog counts.
#[derive(Debug, Clone, Serialize)]
pub struct ArtistSummary {
    pub id: i64,
    pub name: String,
    pub bio: String,
    pub image: Option<String>,
    pub tracks_count: i64,
    pub albums_count: i64,
}

/// An album with its artist.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumSummary {
    pub id: i64,
    pub title: String,
    pub release_date: String,
    pub cover_image: Option<String>,
    pub artist_name: String,
    pub artist: ArtistSummary,
    pub tracks_count: i64,
}

/// Lightweight track representation for lists.
#[derive(Debug, Clone, Serialize)]
pub struct TrackListItem {
    pub id: i64,
    pub title: String,
    pub artist_name: String,
    pub album_title: String,
    pub album_cover: Option<String>,
    pub duration: u32,
    pub genre: String,
    pub preview_file: Option<String>,
    pub file: Option<String>,
    pub created_at: String,
}

/// Full track representation.
#[derive(Debug, Serialize)]
pub struct TrackDetail {
    pub id: i64,
    pub title: String,
    pub file: Option<String>,
    pub preview_file: Option<String>,
    pub duration: u32,
    pub genre: String,
    pub created_at: String,
    pub artist: ArtistSummary,
    pub album: AlbumSummary,
    pub download_count: i64,
}

/// A download history entry.
#[derive(Debug, Serialize)]
pub struct DownloadEntry {
    pub id: i64,
    pub track: TrackListItem,
    pub downloaded_at: String,
}

/// Body returned when a download is served through a signed URL.
#[derive(Debug, Serialize)]
pub struct SignedDownload {
    pub download_url: String,
    pub filename: String,
}

// =============================================================================
// Queries and row mapping
// =============================================================================

pub(crate) const ARTIST_SUMMARY_SELECT: &str = r#"
    SELECT a.id, a.name, a.bio, a.image,
           (SELECT COUNT(*) FROM tracks WHERE artist_id = a.id) AS tracks_count,
           (SELECT COUNT(*) FROM albums WHERE artist_id = a.id) AS albums_count
    FROM artists a
"#;

pub(crate) const ALBUM_SUMMARY_SELECT: &str = r#"
    SELECT al.id, al.title, al.release_date, al.cover_image,
           (SELECT COUNT(*) FROM tracks WHERE album_id = al.id) AS tracks_count,
           ar.id, ar.name, ar.bio, ar.image,
           (SELECT COUNT(*) FROM tracks WHERE artist_id = ar.id),
           (SELECT COUNT(*) FROM albums WHERE artist_id = ar.id)
    FROM albums al
    JOIN artists ar ON ar.id = al.artist_id
"#;

pub(crate) const TRACK_ITEM_SELECT: &str = r#"
    SELECT t.id, t.title, ar.name, al.title, al.cover_image,
           t.duration, t.genre, t.preview_file, t.file, t.created_at
    FROM tracks t
    JOIN artists ar ON ar.id = t.artist_id
    JOIN albums al ON al.id = t.album_id
"#;

/// Public URL for an optional stored reference; empty references have none.
fn media_url(storage: &dyn StorageAdapter, reference: Option<String>) -> Option<String> {
    reference
        .filter(|r| !r.is_empty())
        .map(|r| storage.public_url(&r))
}

fn map_artist_summary(
    row: &rusqlite::Row,
    offset: usize,
    storage: &dyn StorageAdapter,
) -> rusqlite::Result<ArtistSummary> {
    Ok(ArtistSummary {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        bio: row.get(offset + 2)?,
        image: media_url(storage, row.get(offset + 3)?),
        tracks_count: row.get(offset + 4)?,
        albums_count: row.get(offset + 5)?,
    })
}

pub(crate) fn map_artist_row(
    row: &rusqlite::Row,
    storage: &dyn StorageAdapter,
) -> rusqlite::Result<ArtistSummary> {
    map_artist_summary(row, 0, storage)
}

pub(crate) fn map_album_row(
    row: &rusqlite::Row,
    storage: &dyn StorageAdapter,
) -> rusqlite::Result<AlbumSummary> {
    let artist = map_artist_summary(row, 5, storage)?;
    Ok(AlbumSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        release_date: row.get(2)?,
        cover_image: media_url(storage, row.get(3)?),
        tracks_count: row.get(4)?,
        artist_name: artist.name.clone(),
        artist,
    })
}

pub(crate) fn map_track_item_row(
    row: &rusqlite::Row,
    storage: &dyn StorageAdapter,
) -> rusqlite::Result<TrackListItem> {
    Ok(TrackListItem {
        id: row.get(0)?,
        title: row.get(1)?,
        artist_name: row.get(2)?,
        album_title: row.get(3)?,
        album_cover: media_url(storage, row.get(4)?),
        duration: row.get(5)?,
        genre: row.get(6)?,
        preview_file: media_url(storage, row.get(7)?),
        file: media_url(storage, row.get(8)?),
        created_at: row.get(9)?,
    })
}

pub(crate) fn load_artist(
    db: &Connection,
    storage: &dyn StorageAdapter,
    id: i64,
) -> rusqlite::Result<Option<ArtistSummary>> {
    db.query_row(
        &format!("{} WHERE a.id = ?1", ARTIST_SUMMARY_SELECT),
        [id],
        |row| map_artist_row(row, storage),
    )
    .optional()
}

pub(crate) fn load_album(
    db: &Connection,
    storage: &dyn StorageAdapter,
    id: i64,
) -> rusqlite::Result<Option<AlbumSummary>> {
    db.query_row(
        &format!("{} WHERE al.id = ?1", ALBUM_SUMMARY_SELECT),
        [id],
        |row| map_album_row(row, storage),
    )
    .optional()
}

/// Loads a track with nested artist, album and download count.
pub(crate) fn load_track_detail(
    db: &Connection,
    storage: &dyn StorageAdapter,
    id: i64,
) -> Result<TrackDetail> {
    let not_found = || AppError::NotFound("Track not found".to_string());

    let track = db
        .query_row(
            &format!(
                "SELECT {} FROM tracks WHERE id = ?1",
                crate::db::catalog::TRACK_COLUMNS
            ),
            [id],
            crate::db::catalog::map_track_row,
        )
        .optional()?
        .ok_or_else(not_found)?;

    let artist = load_artist(db, storage, track.artist_id)?.ok_or_else(not_found)?;
    let album = load_album(db, storage, track.album_id)?.ok_or_else(not_found)?;
    let download_count: i64 = db.query_row(
        "SELECT COUNT(*) FROM download_logs WHERE track_id = ?1",
        [id],
        |row| row.get(0),
    )?;

    Ok(TrackDetail {
        id: track.id,
        title: track.title,
        file: media_url(storage, Some(track.file)),
        preview_file: media_url(storage, track.preview_file),
        duration: track.duration,
        genre: track.genre,
        created_at: track.created_at,
        artist,
        album,
        download_count,
    })
}

/// Translates an `ordering` parameter into an ORDER BY clause.
///
/// Unknown fields fall back to `default`.
fn order_clause(ordering: Option<&str>, allowed: &[(&str, &str)], default: &str) -> String {
    let Some(raw) = ordering.map(str::trim).filter(|o| !o.is_empty()) else {
        return default.to_string();
    };
    let (field, direction) = match raw.strip_prefix('-') {
        Some(field) => (field, "DESC"),
        None => (raw, "ASC"),
    };

    allowed
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, column)| format!("{} {}", column, direction))
        .unwrap_or_else(|| default.to_string())
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: AppState) -> Router<AppState> {
    // Delivery endpoints resolve anonymous callers themselves
    let delivery_routes = Router::new()
        .route("/tracks/:id/download", get(download_track))
        .route("/tracks/:id/log-download", post(log_download))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth_middleware,
        ));

    let history_routes = Router::new()
        .route("/downloads", get(list_my_downloads))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/tracks", get(list_tracks))
        .route("/tracks/:id", get(get_track))
        .route("/artists", get(list_artists))
        .route("/artists/:id", get(get_artist))
        .route("/albums", get(list_albums))
        .route("/albums/:id", get(get_album))
        .merge(delivery_routes)
        .merge(history_routes)
}

// =============================================================================
// Track Handlers
// =============================================================================

/// GET /api/music/tracks
///
/// Lists tracks with search, filters, ordering and pagination.
pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<ListTracksQuery>,
) -> Result<Json<PaginatedResponse<TrackListItem>>> {
    let page = PageQuery::new(query.page, query.limit).resolve();
    let search = query
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(contains_pattern);
    let genre = query.genre.as_deref().filter(|g| !g.trim().is_empty());
    let order = order_clause(
        query.ordering.as_deref(),
        &[
            ("created_at", "t.created_at"),
            ("title", "t.title"),
            ("duration", "t.duration"),
        ],
        "t.created_at DESC",
    );

    let filter = r#"
        WHERE (?1 IS NULL OR t.title LIKE ?1 ESCAPE '\' OR ar.name LIKE ?1 ESCAPE '\'
               OR al.title LIKE ?1 ESCAPE '\' OR t.genre LIKE ?1 ESCAPE '\')
          AND (?2 IS NULL OR t.artist_id = ?2)
          AND (?3 IS NULL OR t.album_id = ?3)
          AND (?4 IS NULL OR t.genre = ?4 COLLATE NOCASE)
    "#;

    let db = state.db.lock().await;
    let storage = state.storage.as_ref();

    let total: u64 = db.query_row(
        &format!(
            "SELECT COUNT(*) FROM tracks t
             JOIN artists ar ON ar.id = t.artist_id
             JOIN albums al ON al.id = t.album_id {}",
            filter
        ),
        rusqlite::params![search, query.artist, query.album, genre],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(&format!(
        "{} {} ORDER BY {}, t.id DESC LIMIT ?5 OFFSET ?6",
        TRACK_ITEM_SELECT, filter, order
    ))?;
    let items = stmt
        .query_map(
            rusqlite::params![search, query.artist, query.album, genre, page.limit, page.offset],
            |row| map_track_item_row(row, storage),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, &page)))
}

/// GET /api/music/tracks/:id
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrackDetail>> {
    let db = state.db.lock().await;
    let detail = load_track_detail(&db, state.storage.as_ref(), id)?;
    Ok(Json(detail))
}

/// GET /api/music/tracks/:id/download
///
/// Streams the track file (local storage) or returns a signed URL (object
/// storage). Every authenticated attempt on an existing track is logged.
pub async fn download_track(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    claims: Option<Extension<Claims>>,
) -> Result<Response> {
    let requester = claims.map(|Extension(c)| c.sub);
    let resolver = DeliveryResolver::new(
        &state.catalog,
        &state.catalog,
        state.storage.as_ref(),
        state.config.storage.signed_url_ttl(),
    );

    match resolver.resolve_download(id, requester).await? {
        DeliveryOutcome::Redirect {
            download_url,
            filename,
        } => Ok(Json(SignedDownload {
            download_url,
            filename,
        })
        .into_response()),
        DeliveryOutcome::Stream {
            file,
            content_disposition,
            ..
        } => {
            let disposition = HeaderValue::from_str(&content_disposition)
                .map_err(|e| AppError::Internal(format!("Invalid Content-Disposition: {}", e)))?;
            let content_type = HeaderValue::from_str(&file.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_DISPOSITION, disposition);
            if let Some(len) = file.len {
                response = response.header(header::CONTENT_LENGTH, len);
            }

            response
                .body(Body::from_stream(ReaderStream::new(file.reader)))
                .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
        }
    }
}

/// POST /api/music/tracks/:id/log-download
///
/// Records a download without serving the file.
pub async fn log_download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    claims: Option<Extension<Claims>>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let requester = claims.map(|Extension(c)| c.sub);
    let resolver = DeliveryResolver::new(
        &state.catalog,
        &state.catalog,
        state.storage.as_ref(),
        state.config.storage.signed_url_ttl(),
    );

    resolver.log_download_only(id, requester).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Download logged successfully")),
    ))
}

// =============================================================================
// Artist Handlers
// =============================================================================

/// GET /api/music/artists
pub async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<ListArtistsQuery>,
) -> Result<Json<PaginatedResponse<ArtistSummary>>> {
    let page = PageQuery::new(query.page, query.limit).resolve();
    let search = query
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(contains_pattern);
    let order = order_clause(
        query.ordering.as_deref(),
        &[("name", "a.name"), ("tracks_count", "tracks_count")],
        "a.name ASC",
    );

    let db = state.db.lock().await;
    let storage = state.storage.as_ref();

    let total: u64 = db.query_row(
        r"SELECT COUNT(*) FROM artists a WHERE (?1 IS NULL OR a.name LIKE ?1 ESCAPE '\')",
        rusqlite::params![search],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(&format!(
        r"{} WHERE (?1 IS NULL OR a.name LIKE ?1 ESCAPE '\') ORDER BY {}, a.id LIMIT ?2 OFFSET ?3",
        ARTIST_SUMMARY_SELECT, order
    ))?;
    let items = stmt
        .query_map(rusqlite::params![search, page.limit, page.offset], |row| {
            map_artist_row(row, storage)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, &page)))
}

/// GET /api/music/artists/:id
pub async fn get_artist(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ArtistSummary>> {
    let db = state.db.lock().await;
    load_artist(&db, state.storage.as_ref(), id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Artist not found".to_string()))
}

// =============================================================================
// Album Handlers
// =============================================================================

/// GET /api/music/albums
pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<ListAlbumsQuery>,
) -> Result<Json<PaginatedResponse<AlbumSummary>>> {
    let page = PageQuery::new(query.page, query.limit).resolve();
    let search = query
        .search
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(contains_pattern);
    let order = order_clause(
        query.ordering.as_deref(),
        &[("release_date", "al.release_date"), ("title", "al.title")],
        "al.release_date DESC",
    );

    let filter = r#"
        WHERE (?1 IS NULL OR al.title LIKE ?1 ESCAPE '\' OR ar.name LIKE ?1 ESCAPE '\')
          AND (?2 IS NULL OR al.artist_id = ?2)
    "#;

    let db = state.db.lock().await;
    let storage = state.storage.as_ref();

    let total: u64 = db.query_row(
        &format!(
            "SELECT COUNT(*) FROM albums al JOIN artists ar ON ar.id = al.artist_id {}",
            filter
        ),
        rusqlite::params![search, query.artist],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(&format!(
        "{} {} ORDER BY {}, al.id DESC LIMIT ?3 OFFSET ?4",
        ALBUM_SUMMARY_SELECT, filter, order
    ))?;
    let items = stmt
        .query_map(
            rusqlite::params![search, query.artist, page.limit, page.offset],
            |row| map_album_row(row, storage),
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, &page)))
}

/// GET /api/music/albums/:id
pub async fn get_album(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AlbumSummary>> {
    let db = state.db.lock().await;
    load_album(&db, state.storage.as_ref(), id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Album not found".to_string()))
}

// =============================================================================
// Download History
// =============================================================================

/// GET /api/music/downloads
///
/// Lists the caller's downloads, newest first.
pub async fn list_my_downloads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(paging): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<DownloadEntry>>> {
    let page = paging.resolve();
    let db = state.db.lock().await;
    let storage = state.storage.as_ref();

    let total: u64 = db.query_row(
        "SELECT COUNT(*) FROM download_logs WHERE user_id = ?1",
        [claims.sub],
        |row| row.get(0),
    )?;

    let mut stmt = db.prepare(
        "SELECT t.id, t.title, ar.name, al.title, al.cover_image,
                t.duration, t.genre, t.preview_file, t.file, t.created_at,
                d.id, d.downloaded_at
         FROM download_logs d
         JOIN tracks t ON t.id = d.track_id
         JOIN artists ar ON ar.id = t.artist_id
         JOIN albums al ON al.id = t.album_id
         WHERE d.user_id = ?1
         ORDER BY d.downloaded_at DESC, d.id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let items = stmt
        .query_map(
            rusqlite::params![claims.sub, page.limit, page.offset],
            |row| {
                Ok(DownloadEntry {
                    track: map_track_item_row(row, storage)?,
                    id: row.get(10)?,
                    downloaded_at: row.get(11)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Json(PaginatedResponse::new(items, total, &page)))
}
