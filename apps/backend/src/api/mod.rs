//! API endpoint handlers for the SoundVault backend.

pub mod admin;
pub mod auth;
pub mod music;
pub mod search;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::config::StorageBackend;
use crate::{health_check, middleware, AppState};

/// Default and maximum page sizes for list endpoints.
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// Items in the current page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// Current page number (1-indexed).
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: &Page) -> Self {
        let pages = u32::try_from(total.div_ceil(u64::from(page.limit))).unwrap_or(u32::MAX);
        Self {
            items,
            total,
            page: page.number,
            pages,
        }
    }
}

/// Paging parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Page number (1-indexed, default: 1).
    pub page: Option<u32>,
    /// Items per page (default: 20, max: 100).
    pub limit: Option<u32>,
}

/// Clamped paging values.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
    pub offset: u32,
}

impl PageQuery {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self { page, limit }
    }

    pub fn resolve(&self) -> Page {
        let number = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Page {
            number,
            limit,
            offset: (number - 1).saturating_mul(limit),
        }
    }
}

/// Generic message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Builds a `LIKE` pattern matching `term` anywhere, escaping wildcards with `\`.
pub(crate) fn contains_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Builds the complete application router.
///
/// Shared by `main` and the integration tests so both run the same routes.
pub fn router(state: AppState) -> Router {
    let auth_layer = || axum_mw::from_fn_with_state(state.clone(), middleware::auth_middleware);

    // Auth routes (login/register public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout).layer(auth_layer()))
        .route("/me", get(auth::me).layer(auth_layer()));

    // Admin routes
    let admin_routes = admin::router()
        .layer(axum_mw::from_fn(middleware::require_admin))
        .layer(auth_layer());

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/music", music::router(state.clone()))
        .route("/api/search", get(search::search_all))
        .nest("/api/admin", admin_routes);

    // Media files are only served directly by the local backend
    if state.config.storage.backend == StorageBackend::Local {
        app = app.nest_service("/media", ServeDir::new(&state.config.storage.media_root));
    }

    app.with_state(state)
}
