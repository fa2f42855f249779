//! Publishing rendered clips.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reel_storage::ObjectStore;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Stores a finished clip and hands back a URL clients can fetch it from.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn publish(&self, path: &Path, key: &str) -> WorkerResult<String>;
}

/// Object-store upload followed by a presigned GET URL.
pub struct S3ArtifactStore {
    store: Arc<ObjectStore>,
    url_ttl: Duration,
}

impl S3ArtifactStore {
    pub fn new(store: Arc<ObjectStore>, url_ttl: Duration) -> Self {
        Self { store, url_ttl }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn publish(&self, path: &Path, key: &str) -> WorkerResult<String> {
        let object = self
            .store
            .upload_file(path, key)
            .await
            .map_err(|e| WorkerError::upload(format!("{}: {}", key, e)))?;

        let url = self
            .store
            .presign_get(&object.key, self.url_ttl)
            .await
            .map_err(|e| WorkerError::upload(format!("presign {}: {}", key, e)))?;

        info!(key = %object.key, "Published clip");
        Ok(url)
    }
}
