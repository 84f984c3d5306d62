//! Test infrastructure for SoundVault backend integration tests.
//!
//! Provides a `TestApp` wrapper around `axum_test::TestServer` with helper methods
//! for creating users, seeding the catalog, and making authenticated requests.

use axum_test::TestServer;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

use soundvault::config::{Config, S3Config, StorageBackend, StorageConfig};
use soundvault::db::models::UserRole;
use soundvault::services::storage::{LocalStorage, S3Storage};
use soundvault::services::{AuthService, StorageAdapter};
use soundvault::{api, db, AppState};

const TEST_JWT_SECRET: &str = "test-jwt-secret-for-integration-tests";

/// Bucket used by the object-storage variant.
#[allow(dead_code)]
pub const TEST_BUCKET: &str = "soundvault-media";

/// Test application wrapper around axum_test::TestServer.
pub struct TestApp {
    server: TestServer,
    db: Arc<Mutex<Connection>>,
    auth_service: AuthService,
    media_root: TempDir,
}

impl TestApp {
    /// Create a test application backed by local storage in a temp directory.
    ///
    /// Uses an in-memory SQLite database with all migrations applied and the
    /// same router as production.
    pub async fn new() -> Self {
        let media_root = TempDir::new().expect("Failed to create media root");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(LocalStorage::new(media_root.path().to_path_buf()));

        Self::build(media_root, StorageBackend::Local, storage, StorageConfig::default()).await
    }

    /// Create a test application whose local storage is wrapped by `wrap`.
    #[allow(dead_code)]
    pub async fn with_local_storage<F>(wrap: F) -> Self
    where
        F: FnOnce(LocalStorage) -> Arc<dyn StorageAdapter>,
    {
        let media_root = TempDir::new().expect("Failed to create media root");
        let storage = wrap(LocalStorage::new(media_root.path().to_path_buf()));

        Self::build(media_root, StorageBackend::Local, storage, StorageConfig::default()).await
    }

    /// Create a test application backed by S3-compatible object storage.
    ///
    /// Only URL signing is exercised, which needs no reachable endpoint.
    #[allow(dead_code)]
    pub async fn with_object_storage() -> Self {
        Self::with_object_storage_config(StorageConfig::default()).await
    }

    /// Object-storage variant with custom storage settings.
    #[allow(dead_code)]
    pub async fn with_object_storage_config(storage_config: StorageConfig) -> Self {
        let media_root = TempDir::new().expect("Failed to create media root");
        let s3 = S3Config {
            bucket: TEST_BUCKET.to_string(),
            access_key_id: Some("AKIDTEST".to_string()),
            secret_access_key: Some("test-secret".to_string()),
            endpoint_url: Some("http://localhost:9000".to_string()),
            force_path_style: true,
            ..Default::default()
        };
        let storage: Arc<dyn StorageAdapter> = Arc::new(S3Storage::new(&s3).await);

        Self::build(media_root, StorageBackend::S3, storage, storage_config).await
    }

    async fn build(
        media_root: TempDir,
        backend: StorageBackend,
        storage: Arc<dyn StorageAdapter>,
        storage_config: StorageConfig,
    ) -> Self {
        let conn = db::init_db_memory().expect("Failed to initialize test database");

        let config = Config {
            server: soundvault::config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                jwt_secret: Some(TEST_JWT_SECRET.to_string()),
            },
            database: soundvault::config::DatabaseConfig {
                path: ":memory:".into(),
            },
            storage: StorageConfig {
                backend,
                media_root: media_root.path().to_path_buf(),
                ..storage_config
            },
        };

        let state = AppState::new(
            config,
            conn,
            AuthService::new(TEST_JWT_SECRET.to_string()),
            storage,
        )
        .expect("Failed to build application state");
        let db = Arc::clone(&state.db);

        let server = TestServer::new(api::router(state)).expect("Failed to create test server");

        Self {
            server,
            db,
            auth_service: AuthService::new(TEST_JWT_SECRET.to_string()),
            media_root,
        }
    }

    pub fn server(&self) -> &TestServer {
        &self.server
    }

    /// Useful for seeding test data or verifying database state.
    #[allow(dead_code)]
    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    #[allow(dead_code)]
    pub fn media_root(&self) -> PathBuf {
        self.media_root.path().to_path_buf()
    }

    /// Number of files stored under `dir` in the media root.
    #[allow(dead_code)]
    pub fn stored_files(&self, dir: &str) -> usize {
        std::fs::read_dir(self.media_root.path().join(dir))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Create a test user in the database and return its ID.
    pub async fn create_test_user(&self, username: &str, password: &str, role: UserRole) -> i64 {
        let password_hash = self
            .auth_service
            .hash_password(password)
            .expect("Failed to hash password");

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
            rusqlite::params![username, password_hash, role.to_string()],
        )
        .expect("Failed to create test user");

        db.last_insert_rowid()
    }

    pub fn get_auth_token(&self, user_id: i64, role: UserRole) -> String {
        self.auth_service
            .create_token(user_id, role)
            .expect("Failed to create token")
    }

    /// Create an Authorization header tuple for use with HTTP requests.
    pub fn auth_header(&self, token: &str) -> (axum::http::HeaderName, axum::http::HeaderValue) {
        use axum::http::{header::AUTHORIZATION, HeaderValue};
        (
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).expect("Invalid token format"),
        )
    }

    /// Create a test admin user and return their ID and auth token.
    #[allow(dead_code)]
    pub async fn create_admin(&self) -> (i64, String) {
        let user_id = self
            .create_test_user("admin", "adminpass", UserRole::Admin)
            .await;
        let token = self.get_auth_token(user_id, UserRole::Admin);
        (user_id, token)
    }

    /// Create a test regular user and return their ID and auth token.
    #[allow(dead_code)]
    pub async fn create_user(&self) -> (i64, String) {
        let user_id = self
            .create_test_user("testuser", "userpass", UserRole::User)
            .await;
        let token = self.get_auth_token(user_id, UserRole::User);
        (user_id, token)
    }

    /// Write a file under the media root, as if it had been uploaded.
    #[allow(dead_code)]
    pub fn write_media(&self, reference: &str, contents: &[u8]) {
        let path = self.media_root.path().join(reference);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create media directory");
        }
        std::fs::write(path, contents).expect("Failed to write media file");
    }

    /// Insert an artist, album and track; returns the track ID.
    ///
    /// The album is shared across calls with the same artist and album title.
    #[allow(dead_code)]
    pub async fn seed_track(&self, artist: &str, album: &str, title: &str, file: &str) -> i64 {
        let db = self.db.lock().await;

        db.execute(
            "INSERT INTO artists (name, bio) VALUES (?1, '') ON CONFLICT(name) DO NOTHING",
            [artist],
        )
        .expect("Failed to insert artist");
        let artist_id: i64 = db
            .query_row("SELECT id FROM artists WHERE name = ?1", [artist], |row| {
                row.get(0)
            })
            .expect("Failed to read artist");

        db.execute(
            "INSERT INTO albums (title, artist_id, release_date) VALUES (?1, ?2, '2020-01-01')
             ON CONFLICT(artist_id, title) DO NOTHING",
            rusqlite::params![album, artist_id],
        )
        .expect("Failed to insert album");
        let album_id: i64 = db
            .query_row(
                "SELECT id FROM albums WHERE artist_id = ?1 AND title = ?2",
                rusqlite::params![artist_id, album],
                |row| row.get(0),
            )
            .expect("Failed to read album");

        db.execute(
            "INSERT INTO tracks (title, album_id, artist_id, file, duration, genre)
             VALUES (?1, ?2, ?3, ?4, 180, 'Jazz')",
            rusqlite::params![title, album_id, artist_id, file],
        )
        .expect("Failed to insert track");

        db.last_insert_rowid()
    }

    /// Number of download log rows for a track.
    #[allow(dead_code)]
    pub async fn download_count(&self, track_id: i64) -> i64 {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT COUNT(*) FROM download_logs WHERE track_id = ?1",
            [track_id],
            |row| row.get(0),
        )
        .expect("Failed to count downloads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_creation() {
        let app = TestApp::new().await;
        let response = app.server().get("/health").await;
        response.assert_status_ok();
    }
}
