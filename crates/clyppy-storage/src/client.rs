//! CDN storage client.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use clyppy_models::limits::CDN_URL_BASE;

use crate::error::{StorageError, StorageResult};

/// Configuration for the CDN bucket.
#[derive(Debug, Clone)]
pub struct CdnConfig {
    /// S3 API endpoint URL.
    pub endpoint_url: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Bucket name.
    pub bucket_name: String,
    /// Region ("auto" for R2-style providers).
    pub region: String,
    /// Public base the bucket is served from.
    pub public_base: String,
}

impl CdnConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base: std::env::var("CDN_PUBLIC_BASE")
                .unwrap_or_else(|_| CDN_URL_BASE.to_string()),
        })
    }
}

/// Key for a reuploaded video.
pub fn video_key(filename: &str) -> String {
    format!("temp/{filename}")
}

/// Key for a thumbnail.
pub fn thumbnail_key(filename: &str) -> String {
    format!("img/{filename}")
}

/// Client for the public CDN bucket.
#[derive(Clone)]
pub struct CdnClient {
    client: Client,
    bucket: String,
    public_base: String,
}

impl CdnClient {
    /// Create a new client from configuration.
    pub fn new(config: CdnConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "clyppy-cdn",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base: config.public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(CdnConfig::from_env()?))
    }

    /// Public URL an uploaded key is served from.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base)
    }

    /// Upload a video under `temp/`, returning its public URL.
    pub async fn upload_video(
        &self,
        path: impl AsRef<Path>,
        filename: &str,
    ) -> StorageResult<String> {
        self.upload_file(path, &video_key(filename), "video/mp4")
            .await
    }

    /// Upload a thumbnail under `img/`, returning its public URL.
    pub async fn upload_thumbnail(
        &self,
        path: impl AsRef<Path>,
        filename: &str,
    ) -> StorageResult<String> {
        self.upload_file(path, &thumbnail_key(filename), "image/webp")
            .await
    }

    /// Upload a file world-readable, returning its public URL.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let path = path.as_ref();
        debug!(path = %path.display(), key = %key, "uploading to CDN");

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let url = self.public_url(key);
        info!(key = %key, url = %url, "uploaded to CDN");
        Ok(url)
    }

    /// Check connectivity with a head-bucket call. Used at startup so a
    /// broken credential fails fast instead of on the first clip.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("CDN connectivity check failed: {e}")))?;
        Ok(())
    }
}
