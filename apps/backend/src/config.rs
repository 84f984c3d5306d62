//! Configuration module for the SoundVault backend.
//!
//! Loads configuration from `config.toml` with environment variable overrides.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub jwt_secret: Option<String>,
}

// Custom Debug implementation to avoid exposing jwt_secret
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "jwt_secret",
                &self.jwt_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            jwt_secret: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/soundvault.db")
}

/// Which storage adapter backs media references.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

/// Upper bound on the validity of signed download URLs, in seconds.
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the local backend.
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    /// Validity of signed download URLs, in seconds.
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub naming: NamingConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            media_root: default_media_root(),
            signed_url_ttl_secs: default_signed_url_ttl(),
            s3: S3Config::default(),
            naming: NamingConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Signed URL validity, never longer than [`MAX_SIGNED_URL_TTL_SECS`].
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs.min(MAX_SIGNED_URL_TTL_SECS))
    }
}

fn default_media_root() -> PathBuf {
    PathBuf::from("./media")
}

fn default_signed_url_ttl() -> u64 {
    MAX_SIGNED_URL_TTL_SECS
}

/// S3-compatible object storage settings.
#[derive(Clone, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO etc.)
    pub endpoint_url: Option<String>,
    /// Key prefix prepended to every stored reference, e.g. `media`.
    pub location: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

// Custom Debug implementation to avoid exposing credentials
impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("endpoint_url", &self.endpoint_url)
            .field("location", &self.location)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            location: None,
            force_path_style: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Patterns for the storage references of uploaded media.
#[derive(Debug, Clone, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_track_pattern")]
    pub track_pattern: String,
    #[serde(default = "default_preview_pattern")]
    pub preview_pattern: String,
    #[serde(default = "default_cover_pattern")]
    pub cover_pattern: String,
    #[serde(default = "default_artist_image_pattern")]
    pub artist_image_pattern: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            track_pattern: default_track_pattern(),
            preview_pattern: default_preview_pattern(),
            cover_pattern: default_cover_pattern(),
            artist_image_pattern: default_artist_image_pattern(),
        }
    }
}

fn default_track_pattern() -> String {
    "tracks/{id}_{title}.{ext}".to_string()
}

fn default_preview_pattern() -> String {
    "previews/{id}_{title}.{ext}".to_string()
}

fn default_cover_pattern() -> String {
    "albums/{id}_{album}.{ext}".to_string()
}

fn default_artist_image_pattern() -> String {
    "artists/{id}_{artist}.{ext}".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables with `SOUNDVAULT_` prefix
    ///
    /// Environment variables use double underscore for nesting:
    /// - `SOUNDVAULT_SERVER__PORT=9000` sets `server.port`
    /// - `SOUNDVAULT_STORAGE__BACKEND=s3` sets `storage.backend`
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        let config = ConfigLoader::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "./data/soundvault.db")?
            .set_default("storage.backend", "local")?
            .set_default("storage.media_root", "./media")?
            .set_default("storage.signed_url_ttl_secs", 3600)?
            .set_default("storage.s3.region", "us-east-1")?
            .add_source(File::with_name(config_path).required(false))
            // SOUNDVAULT_STORAGE__S3__BUCKET=music -> storage.s3.bucket = "music"
            .add_source(
                Environment::with_prefix("SOUNDVAULT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for required fields.
    fn validate(&self) -> Result<(), AppError> {
        if self.server.jwt_secret.is_none() {
            tracing::warn!("JWT secret not configured - a random secret will be generated");
        }

        if self.storage.backend == StorageBackend::S3 && self.storage.s3.bucket.trim().is_empty()
        {
            return Err(AppError::Config(config::ConfigError::Message(
                "storage.s3.bucket is required when storage.backend = \"s3\"".to_string(),
            )));
        }

        if self.storage.signed_url_ttl_secs == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "storage.signed_url_ttl_secs must be positive".to_string(),
            )));
        }

        if self.storage.signed_url_ttl_secs > MAX_SIGNED_URL_TTL_SECS {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "storage.signed_url_ttl_secs must not exceed {}",
                MAX_SIGNED_URL_TTL_SECS
            ))));
        }

        Ok(())
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, Ipv4Addr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.server.port)
    }
}
