//! S3-compatible object storage adapter.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;

use crate::config::S3Config;

use super::{content_type_for, StorageAdapter, StorageError, StorageKind, StoredFile};

pub struct S3Storage {
    client: Client,
    bucket: String,
    /// Key prefix for every stored reference, without slashes at either end.
    location: Option<String>,
    public_base: String,
}

impl S3Storage {
    /// Creates a client from configuration.
    ///
    /// Static keys are used when both are configured; otherwise the default
    /// AWS credential chain applies.
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "soundvault-config",
            ));
        }

        // Custom endpoint for S3-compatible services
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 client configured"
        );

        Self::with_client(Client::from_conf(s3_config), config)
    }

    pub fn with_client(client: Client, config: &S3Config) -> Self {
        let location = config
            .location
            .as_deref()
            .map(|l| l.trim_matches('/').to_string())
            .filter(|l| !l.is_empty());

        let public_base = match &config.endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
        };

        Self {
            client,
            bucket: config.bucket.clone(),
            location,
            public_base,
        }
    }

    /// Maps a stored reference to its object key.
    ///
    /// The configured location prefix is prepended unless the reference
    /// already carries it.
    pub fn object_key(&self, reference: &str) -> String {
        let reference = reference.trim_start_matches('/');
        match &self.location {
            Some(location) if !reference.starts_with(&format!("{}/", location)) => {
                format!("{}/{}", location, reference)
            }
            _ => reference.to_string(),
        }
    }
}

#[async_trait]
impl StorageAdapter for S3Storage {
    fn kind(&self) -> StorageKind {
        StorageKind::Object
    }

    /// Objects are handed out through signed URLs, never proxied.
    async fn open(&self, _reference: &str) -> Result<StoredFile, StorageError> {
        Err(StorageError::Unsupported("open"))
    }

    async fn signed_url(
        &self,
        reference: &str,
        content_disposition: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        let key = self.object_key(reference);
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::Signing(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .response_content_disposition(content_disposition)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Signing(e.to_string()))?;

        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Signed download URL");
        Ok(request.uri().to_string())
    }

    async fn save(&self, reference: &str, data: Bytes) -> Result<(), StorageError> {
        let key = self.object_key(reference);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type_for(reference))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Put object failed: {}", e)))?;

        tracing::debug!(key = %key, size, "Object uploaded");
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let key = self.object_key(reference);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Delete object failed: {}", e)))?;

        tracing::debug!(key = %key, "Object deleted");
        Ok(())
    }

    fn public_url(&self, reference: &str) -> String {
        format!("{}/{}", self.public_base, self.object_key(reference))
    }
}
