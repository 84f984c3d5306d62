//! SoundVault Backend Library
//!
//! Core functionality for the SoundVault music catalog backend.
//! This library exposes modules for use in integration tests.

use axum::response::Json;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod services;

use config::Config;
use db::CatalogStore;
use services::storage::NamingEngine;
use services::{AuthService, StorageAdapter};

/// Timeout for outbound HTTP requests (album cover fetches).
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Mutex<Connection>>,
    pub auth_service: Arc<AuthService>,
    pub catalog: CatalogStore,
    pub storage: Arc<dyn StorageAdapter>,
    pub naming: Arc<NamingEngine>,
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Assembles the state around an open connection and storage adapter.
    pub fn new(
        config: Config,
        conn: Connection,
        auth_service: AuthService,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, error::AppError> {
        let db = Arc::new(Mutex::new(conn));
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| error::AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            naming: Arc::new(NamingEngine::new(config.storage.naming.clone())),
            config: Arc::new(config),
            catalog: CatalogStore::new(Arc::clone(&db)),
            db,
            auth_service: Arc::new(auth_service),
            storage,
            http_client,
        })
    }

    /// Get a reference to the auth service.
    pub fn auth_service(&self) -> &AuthService {
        &self.auth_service
    }
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub message: String,
    pub version: String,
}

pub async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "SoundVault Backend is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
