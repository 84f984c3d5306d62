//! Catalog-wide search.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::AppState;

use super::contains_pattern;
use super::music::{
    map_album_row, map_artist_row, map_track_item_row, AlbumSummary, ArtistSummary,
    TrackListItem, ALBUM_SUMMARY_SELECT, ARTIST_SUMMARY_SELECT, TRACK_ITEM_SELECT,
};

/// Maximum results returned per entity type.
const SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub tracks: Vec<TrackListItem>,
    pub artists: Vec<ArtistSummary>,
    pub albums: Vec<AlbumSummary>,
}

/// GET /api/search?q=
///
/// Case-insensitive substring search over tracks (title, artist, album),
/// artists (name) and albums (title, artist). An empty query returns empty
/// lists.
pub async fn search_all(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>> {
    if query.q.trim().is_empty() {
        return Ok(Json(SearchResults::default()));
    }

    let pattern = contains_pattern(&query.q);
    let db = state.db.lock().await;
    let storage = state.storage.as_ref();

    let tracks = db
        .prepare(&format!(
            r"{} WHERE t.title LIKE ?1 ESCAPE '\' OR ar.name LIKE ?1 ESCAPE '\'
                   OR al.title LIKE ?1 ESCAPE '\'
               ORDER BY t.created_at DESC, t.id DESC LIMIT ?2",
            TRACK_ITEM_SELECT
        ))?
        .query_map(rusqlite::params![pattern, SEARCH_LIMIT], |row| {
            map_track_item_row(row, storage)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let artists = db
        .prepare(&format!(
            r"{} WHERE a.name LIKE ?1 ESCAPE '\' ORDER BY a.name LIMIT ?2",
            ARTIST_SUMMARY_SELECT
        ))?
        .query_map(rusqlite::params![pattern, SEARCH_LIMIT], |row| {
            map_artist_row(row, storage)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let albums = db
        .prepare(&format!(
            r"{} WHERE al.title LIKE ?1 ESCAPE '\' OR ar.name LIKE ?1 ESCAPE '\'
               ORDER BY al.release_date DESC, al.id DESC LIMIT ?2",
            ALBUM_SUMMARY_SELECT
        ))?
        .query_map(rusqlite::params![pattern, SEARCH_LIMIT], |row| {
            map_album_row(row, storage)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    tracing::debug!(
        query = %query.q,
        tracks = tracks.len(),
        artists = artists.len(),
        albums = albums.len(),
        "Catalog search"
    );

    Ok(Json(SearchResults {
        tracks,
        artists,
        albums,
    }))
}
