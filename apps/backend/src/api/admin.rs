//! Admin API endpoints for managing the catalog.
//!
//! Uploads arrive as multipart forms. Stored files are written before the
//! rows referencing them and removed best-effort after the rows are gone, so
//! the database lock is never held across storage I/O.

use std::collections::HashMap;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, post, put},
    Json, Router,
};
use bytes::Bytes;
use chrono::NaiveDate;
use rusqlite::OptionalExtension;

use crate::db::catalog::{map_track_row, TRACK_COLUMNS};
use crate::db::repository::{AlbumRepository, ArtistRepository};
use crate::error::{AppError, Result};
use crate::services::storage::{MediaSlot, StorageAdapter, StorageError};
use crate::AppState;

use super::music::{load_album, load_artist, load_track_detail, AlbumSummary, ArtistSummary, TrackDetail};

/// Maximum accepted request body for uploads (200 MiB).
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Release date used when an upload creates an album without one.
const DEFAULT_RELEASE_DATE: &str = "2024-01-01";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-track", post(upload_track))
        .route("/create-artist", post(create_artist))
        .route("/create-album", post(create_album))
        .route("/update-track/:id", put(update_track).patch(update_track))
        .route("/delete-track/:id", delete(delete_track))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// =============================================================================
// Multipart form handling
// =============================================================================

/// A file part of a multipart form.
#[derive(Debug, Clone)]
struct Upload {
    file_name: String,
    data: Bytes,
}

/// A fully read multipart form. Empty file parts are treated as absent.
#[derive(Debug, Default)]
struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl Form {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Form::default();

        while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field.bytes().await.map_err(invalid_multipart)?;
                    if !data.is_empty() {
                        form.files.insert(name, Upload { file_name, data });
                    }
                }
                None => {
                    let value = field.text().await.map_err(invalid_multipart)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Trimmed text field; `None` when absent.
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.text(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("{} is required", name)))
    }

    fn file(&self, name: &str) -> Option<&Upload> {
        self.files.get(name)
    }

    fn duration(&self) -> Result<Option<u32>> {
        self.text("duration")
            .map(|raw| {
                raw.parse::<u32>().map_err(|_| {
                    AppError::BadRequest("duration must be a non-negative integer".to_string())
                })
            })
            .transpose()
    }

    fn release_date(&self) -> Result<Option<String>> {
        self.text("release_date")
            .filter(|v| !v.is_empty())
            .map(validate_date)
            .transpose()
    }
}

fn invalid_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart body: {}", e))
}

fn validate_date(raw: &str) -> Result<String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| AppError::BadRequest("release_date must be formatted YYYY-MM-DD".to_string()))
}

// =============================================================================
// Storage helpers
// =============================================================================

/// Stores an upload under a fresh reference and returns the reference.
async fn store_upload(
    state: &AppState,
    slot: MediaSlot,
    label: &str,
    upload: &Upload,
) -> Result<String> {
    let reference = state.naming.reference_for(slot, label, &upload.file_name);
    state.storage.save(&reference, upload.data.clone()).await?;

    tracing::info!(reference = %reference, size = upload.data.len(), "Stored upload");
    Ok(reference)
}

/// Deletes a stored file, logging instead of failing.
async fn discard_stored(storage: &dyn StorageAdapter, reference: &str) {
    if reference.is_empty() {
        return;
    }
    match storage.delete(reference).await {
        Ok(()) => tracing::debug!(reference = %reference, "Removed stored file"),
        Err(StorageError::NotFound(_)) => {
            tracing::debug!(reference = %reference, "Stored file already gone")
        }
        Err(e) => {
            tracing::warn!(reference = %reference, error = %e, "Failed to remove stored file")
        }
    }
}

/// References stored for a track's audio and preview during one request.
#[derive(Debug, Default)]
struct StoredMedia {
    file: Option<String>,
    preview_file: Option<String>,
}

impl StoredMedia {
    /// Removes everything stored, for when no row ends up pointing at it.
    async fn discard(self, storage: &dyn StorageAdapter) {
        for reference in self.file.iter().chain(self.preview_file.iter()) {
            discard_stored(storage, reference).await;
        }
    }
}

/// Stores a track's audio and preview uploads, if any.
///
/// When the preview cannot be stored the audio stored before it is removed.
async fn store_track_media(
    state: &AppState,
    title: &str,
    audio: Option<&Upload>,
    preview: Option<&Upload>,
) -> Result<StoredMedia> {
    let mut media = StoredMedia::default();

    if let Some(audio) = audio {
        media.file = Some(store_upload(state, MediaSlot::Track, title, audio).await?);
    }
    if let Some(preview) = preview {
        match store_upload(state, MediaSlot::Preview, title, preview).await {
            Ok(reference) => media.preview_file = Some(reference),
            Err(e) => {
                media.discard(state.storage.as_ref()).await;
                return Err(e);
            }
        }
    }

    Ok(media)
}

/// Fetches an album cover from a remote URL. Failures are logged and ignored.
async fn fetch_cover(state: &AppState, url: &str) -> Option<Upload> {
    let response = match state.http_client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to download album cover");
            return None;
        }
    };

    if !response.status().is_success() {
        tracing::warn!(url = %url, status = %response.status(), "Album cover download rejected");
        return None;
    }

    match response.bytes().await {
        Ok(data) if !data.is_empty() => Some(Upload {
            file_name: "cover.jpg".to_string(),
            data,
        }),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to read album cover body");
            None
        }
    }
}

/// Stores a new album cover and points the album at it, removing the old one.
async fn replace_album_cover(
    state: &AppState,
    album_id: i64,
    album_title: &str,
    upload: &Upload,
) -> Result<()> {
    let reference = store_upload(state, MediaSlot::AlbumCover, album_title, upload).await?;

    let previous: Option<String> = {
        let db = state.db.lock().await;
        let previous = db
            .query_row(
                "SELECT cover_image FROM albums WHERE id = ?1",
                [album_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        db.execute(
            "UPDATE albums SET cover_image = ?1 WHERE id = ?2",
            rusqlite::params![reference, album_id],
        )?;
        previous
    };

    if let Some(previous) = previous {
        discard_stored(state.storage.as_ref(), &previous).await;
    }
    Ok(())
}

async fn track_detail(state: &AppState, id: i64) -> Result<TrackDetail> {
    let db = state.db.lock().await;
    load_track_detail(&db, state.storage.as_ref(), id)
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/admin/upload-track
///
/// Creates a track from a multipart form, finding or creating its artist and
/// album by name. Required: `title`, `artist_name`, `album_title`, `file`.
/// Optional: `artist_bio`, `release_date`, `duration`, `genre`,
/// `preview_file`, `album_cover` or `album_cover_url`.
pub async fn upload_track(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<TrackDetail>)> {
    let form = Form::read(multipart).await?;

    let audio = form
        .file("file")
        .ok_or_else(|| AppError::BadRequest("Music file is required".to_string()))?;
    let title = form.required("title")?;
    let artist_name = form.required("artist_name")?;
    let album_title = form.required("album_title")?;
    let duration = form.duration()?.unwrap_or(0);
    let genre = form.text("genre").unwrap_or_default();
    let release_date = form
        .release_date()?
        .unwrap_or_else(|| DEFAULT_RELEASE_DATE.to_string());

    // Files go first so a storage failure leaves no catalog rows behind
    let media = store_track_media(&state, title, Some(audio), form.file("preview_file")).await?;

    let created = async {
        let (artist, _) = state
            .catalog
            .find_or_create_artist(artist_name, form.text("artist_bio").unwrap_or_default())
            .await?;
        let (album, _) = state
            .catalog
            .find_or_create_album(album_title, artist.id, &release_date)
            .await?;

        let db = state.db.lock().await;
        db.execute(
            r#"
            INSERT INTO tracks (title, album_id, artist_id, file, preview_file, duration, genre)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            rusqlite::params![
                title,
                album.id,
                artist.id,
                media.file,
                media.preview_file,
                duration,
                genre
            ],
        )?;
        Ok::<_, AppError>((artist, album, db.last_insert_rowid()))
    }
    .await;

    let (artist, album, track_id) = match created {
        Ok(created) => created,
        Err(e) => {
            media.discard(state.storage.as_ref()).await;
            return Err(e);
        }
    };

    let cover = match form.file("album_cover") {
        Some(upload) => Some(upload.clone()),
        None => match form.text("album_cover_url").filter(|u| !u.is_empty()) {
            Some(url) => fetch_cover(&state, url).await,
            None => None,
        },
    };
    if let Some(cover) = cover {
        if let Err(e) = replace_album_cover(&state, album.id, &album.title, &cover).await {
            tracing::error!(album_id = album.id, error = %e, "Failed to save album cover");
        }
    }

    tracing::info!(track_id, title = %title, artist = %artist.name, "Track uploaded");

    let detail = track_detail(&state, track_id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// PUT/PATCH /api/admin/update-track/:id
///
/// Partially updates a track; only supplied fields change. A new
/// `artist_name` or `album_title` is resolved by find-or-create. When
/// `album_title` names an existing album, a supplied `release_date` updates
/// it. Replaced files are removed from storage after the row is updated.
pub async fn update_track(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<TrackDetail>> {
    let form = Form::read(multipart).await?;

    let mut track = {
        let db = state.db.lock().await;
        db.query_row(
            &format!("SELECT {} FROM tracks WHERE id = ?1", TRACK_COLUMNS),
            [id],
            map_track_row,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("Track not found".to_string()))?
    };

    let duration = form.duration()?;
    let release_date = form.release_date()?;

    if let Some(title) = form.text("title").filter(|t| !t.is_empty()) {
        track.title = title.to_string();
    }
    if let Some(duration) = duration {
        track.duration = duration;
    }
    if let Some(genre) = form.text("genre") {
        track.genre = genre.to_string();
    }

    let media = store_track_media(
        &state,
        &track.title,
        form.file("file"),
        form.file("preview_file"),
    )
    .await?;

    let updated = async {
        if let Some(artist_name) = form.text("artist_name").filter(|n| !n.is_empty()) {
            let (artist, _) = state
                .catalog
                .find_or_create_artist(artist_name, form.text("artist_bio").unwrap_or_default())
                .await?;
            track.artist_id = artist.id;
        }

        if let Some(album_title) = form.text("album_title").filter(|t| !t.is_empty()) {
            let (album, created) = state
                .catalog
                .find_or_create_album(
                    album_title,
                    track.artist_id,
                    release_date.as_deref().unwrap_or(DEFAULT_RELEASE_DATE),
                )
                .await?;

            if let (false, Some(date)) = (created, &release_date) {
                let db = state.db.lock().await;
                db.execute(
                    "UPDATE albums SET release_date = ?1 WHERE id = ?2",
                    rusqlite::params![date, album.id],
                )?;
            }
            track.album_id = album.id;
        }

        if let Some(cover) = form.file("album_cover") {
            let album_title: String = {
                let db = state.db.lock().await;
                db.query_row(
                    "SELECT title FROM albums WHERE id = ?1",
                    [track.album_id],
                    |row| row.get(0),
                )?
            };
            replace_album_cover(&state, track.album_id, &album_title, cover).await?;
        }

        let db = state.db.lock().await;
        db.execute(
            r#"
            UPDATE tracks
            SET title = ?1, album_id = ?2, artist_id = ?3, file = ?4,
                preview_file = ?5, duration = ?6, genre = ?7
            WHERE id = ?8
            "#,
            rusqlite::params![
                track.title,
                track.album_id,
                track.artist_id,
                media.file.as_deref().unwrap_or(&track.file),
                media.preview_file.as_deref().or(track.preview_file.as_deref()),
                track.duration,
                track.genre,
                id,
            ],
        )?;
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = updated {
        media.discard(state.storage.as_ref()).await;
        return Err(e);
    }

    // The previous files are unreferenced once the row points at the new ones
    let mut replaced = Vec::new();
    if media.file.is_some() {
        replaced.push(track.file);
    }
    if media.preview_file.is_some() {
        replaced.extend(track.preview_file);
    }

    for reference in replaced {
        discard_stored(state.storage.as_ref(), &reference).await;
    }

    tracing::info!(track_id = id, "Track updated");

    Ok(Json(track_detail(&state, id).await?))
}

/// POST /api/admin/create-artist
///
/// Fields: `name` (required), `bio`, `image` (file).
pub async fn create_artist(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ArtistSummary>)> {
    let form = Form::read(multipart).await?;
    let name = form.required("name")?;
    let bio = form.text("bio").unwrap_or_default();

    let image_ref = match form.file("image") {
        Some(image) => Some(store_upload(&state, MediaSlot::ArtistImage, name, image).await?),
        None => None,
    };

    let inserted = {
        let db = state.db.lock().await;
        db.execute(
            "INSERT INTO artists (name, bio, image) VALUES (?1, ?2, ?3) ON CONFLICT(name) DO NOTHING",
            rusqlite::params![name, bio, image_ref],
        )
        .map(|count| (count > 0).then(|| db.last_insert_rowid()))
    };

    let artist_id = match inserted {
        Ok(Some(id)) => id,
        result => {
            if let Some(image_ref) = &image_ref {
                discard_stored(state.storage.as_ref(), image_ref).await;
            }
            return Err(match result {
                Err(e) => e.into(),
                _ => AppError::BadRequest("Artist with this name already exists".to_string()),
            });
        }
    };

    tracing::info!(artist_id, name = %name, "Artist created");

    let db = state.db.lock().await;
    let artist = load_artist(&db, state.storage.as_ref(), artist_id)?
        .ok_or_else(|| AppError::Internal("Created artist vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(artist)))
}

/// POST /api/admin/create-album
///
/// Fields: `title`, `artist` (artist ID) and `release_date` (all required),
/// `cover_image` (file).
pub async fn create_album(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AlbumSummary>)> {
    let form = Form::read(multipart).await?;
    let title = form.required("title")?;
    let artist_id: i64 = form
        .required("artist")?
        .parse()
        .map_err(|_| AppError::BadRequest("artist must be an artist ID".to_string()))?;
    let release_date = form
        .release_date()?
        .ok_or_else(|| AppError::BadRequest("release_date is required".to_string()))?;

    {
        let db = state.db.lock().await;
        let exists: bool = db.query_row(
            "SELECT EXISTS(SELECT 1 FROM artists WHERE id = ?1)",
            [artist_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(AppError::BadRequest("Artist not found".to_string()));
        }
    }

    let cover_ref = match form.file("cover_image") {
        Some(cover) => Some(store_upload(&state, MediaSlot::AlbumCover, title, cover).await?),
        None => None,
    };

    let inserted = {
        let db = state.db.lock().await;
        db.execute(
            r#"
            INSERT INTO albums (title, artist_id, release_date, cover_image)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(artist_id, title) DO NOTHING
            "#,
            rusqlite::params![title, artist_id, release_date, cover_ref],
        )
        .map(|count| (count > 0).then(|| db.last_insert_rowid()))
    };

    let album_id = match inserted {
        Ok(Some(id)) => id,
        result => {
            if let Some(cover_ref) = &cover_ref {
                discard_stored(state.storage.as_ref(), cover_ref).await;
            }
            return Err(match result {
                Err(e) => e.into(),
                _ => AppError::BadRequest(
                    "Album with this title already exists for this artist".to_string(),
                ),
            });
        }
    };

    tracing::info!(album_id, artist_id, title = %title, "Album created");

    let db = state.db.lock().await;
    let album = load_album(&db, state.storage.as_ref(), album_id)?
        .ok_or_else(|| AppError::Internal("Created album vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(album)))
}

/// DELETE /api/admin/delete-track/:id
///
/// Deletes the row first, then its file and preview. A failed file delete
/// leaves an orphan that is logged, never an undeletable track.
pub async fn delete_track(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let (file, preview_file): (String, Option<String>) = {
        let db = state.db.lock().await;
        let refs = db
            .query_row(
                "SELECT file, preview_file FROM tracks WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("Track not found".to_string()))?;
        db.execute("DELETE FROM tracks WHERE id = ?1", [id])?;
        refs
    };

    discard_stored(state.storage.as_ref(), &file).await;
    if let Some(preview_file) = preview_file {
        discard_stored(state.storage.as_ref(), &preview_file).await;
    }

    tracing::info!(track_id = id, "Track deleted");
    Ok(StatusCode::NO_CONTENT)
}
