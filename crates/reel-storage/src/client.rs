//! S3-compatible client.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::object::{content_type_for, ObjectRef};

/// Longest expiry SigV4 presigning accepts.
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Custom endpoint (MinIO, R2, ...). `None` uses AWS.
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Bucket receiving rendered clips
    pub bucket_name: String,
    pub region: String,
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Object store holding uploaded sources and rendered clips.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "reel-storage",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(StorageConfig::from_env()?))
    }

    /// The default bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Reference to `key` in the default bucket.
    pub fn object_ref(&self, key: &str) -> ObjectRef {
        ObjectRef::new(&self.bucket, key)
    }

    /// Upload a file to the default bucket. The content type follows the extension.
    pub async fn upload_file(&self, path: impl AsRef<Path>, key: &str) -> StorageResult<ObjectRef> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(path))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(self.object_ref(key))
    }

    /// Download any object, in any bucket, to a local file.
    pub async fn download(&self, object: &ObjectRef, path: impl AsRef<Path>) -> StorageResult<u64> {
        let path = path.as_ref();
        debug!("Downloading {} to {}", object, path.display());

        let response = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(object.to_string())
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &bytes).await?;

        info!("Downloaded {} ({} bytes) to {}", object, bytes.len(), path.display());
        Ok(bytes.len() as u64)
    }

    /// Generate a presigned GET URL. Expiries beyond [`MAX_PRESIGN_EXPIRY`] are clamped.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        if expires_in > MAX_PRESIGN_EXPIRY {
            warn!(
                requested_secs = expires_in.as_secs(),
                "Presign expiry clamped to {} seconds",
                MAX_PRESIGN_EXPIRY.as_secs()
            );
        }
        let expires_in = expires_in.min(MAX_PRESIGN_EXPIRY);
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Delete an object, in any bucket.
    pub async fn delete(&self, object: &ObjectRef) -> StorageResult<()> {
        debug!("Deleting {}", object);

        self.client
            .delete_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("storage connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            access_key_id: "minio".to_string(),
            secret_access_key: "minio123".to_string(),
            bucket_name: "clips".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn test_object_ref_uses_default_bucket() {
        let store = ObjectStore::new(config());
        assert_eq!(store.bucket(), "clips");
        assert_eq!(store.object_ref("u/p/a.mp4").to_string(), "s3://clips/u/p/a.mp4");
    }

    #[tokio::test]
    async fn test_presign_is_local() {
        let store = ObjectStore::new(config());
        let url = store
            .presign_get("u/p/a.mp4", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://127.0.0.1:9000/clips/u/p/a.mp4?"));
        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn test_presign_clamps_long_expiry() {
        let store = ObjectStore::new(config());
        let url = store
            .presign_get("u/p/a.mp4", Duration::from_secs(30 * 24 * 60 * 60))
            .await
            .unwrap();
        assert!(url.contains("X-Amz-Expires=604800"));
    }
}
