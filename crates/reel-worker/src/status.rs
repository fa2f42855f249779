//! Status callbacks to the frontend.

use std::time::Duration;

use async_trait::async_trait;
use reel_models::{ClipRecord, StatusUpdate};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};

const STATUS_PATH: &str = "/api/project-status";
const CLIPS_PATH: &str = "/api/get-clips";

/// Receives stage transitions and finished clips.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update(&self, update: &StatusUpdate) -> WorkerResult<()>;

    async fn clip_ready(&self, record: &ClipRecord) -> WorkerResult<()>;
}

/// Posts JSON payloads to the frontend.
pub struct HttpStatusSink {
    client: Client,
    base_url: String,
}

impl HttpStatusSink {
    pub fn new(base_url: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WorkerError::config_error(format!("status client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> WorkerResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| WorkerError::status(format!("{}: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::status(format!("{} returned {}: {}", path, status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn update(&self, update: &StatusUpdate) -> WorkerResult<()> {
        debug!(
            project_id = %update.project_id,
            stage = %update.stage,
            progress = update.progress,
            "Posting status"
        );
        self.post(STATUS_PATH, update).await
    }

    async fn clip_ready(&self, record: &ClipRecord) -> WorkerResult<()> {
        self.post(CLIPS_PATH, record).await
    }
}

/// Sink used when no frontend is configured.
#[derive(Debug, Default, Clone)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn update(&self, update: &StatusUpdate) -> WorkerResult<()> {
        info!(
            project_id = %update.project_id,
            status = %update.status,
            stage = %update.stage,
            progress = update.progress,
            remaining = ?update.remaining_estimate,
            "Status"
        );
        Ok(())
    }

    async fn clip_ready(&self, record: &ClipRecord) -> WorkerResult<()> {
        info!(project_id = %record.project_id, title = %record.title, "Clip ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::JobStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn update() -> StatusUpdate {
        StatusUpdate {
            user_id: "u1".into(),
            project_id: "p1".into(),
            status: JobStatus::Processing,
            stage: "transcribing".into(),
            progress: 20,
            title: Some("Talk".into()),
            processing_timeframe: None,
            remaining_estimate: Some(300.0),
        }
    }

    #[tokio::test]
    async fn test_update_posts_camel_case_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/project-status"))
            .and(body_partial_json(serde_json::json!({
                "userId": "u1",
                "projectId": "p1",
                "status": "processing",
                "progress": 20
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpStatusSink::new(format!("{}/", server.uri())).unwrap();
        sink.update(&update()).await.unwrap();
    }

    #[tokio::test]
    async fn test_clip_record_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/get-clips"))
            .and(body_partial_json(serde_json::json!({"project_id": "p1", "s3_uri": "https://signed"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let record = ClipRecord {
            project_id: "p1".into(),
            title: "Hook".into(),
            transcript: "words".into(),
            s3_uri: "https://signed".into(),
            score: 88,
            hook: "A".into(),
            flow: "A-".into(),
            engagement: "B+".into(),
            trend: "B".into(),
            hashtags: vec!["#clip".into()],
        };
        let sink = HttpStatusSink::new(server.uri()).unwrap();
        sink.clip_ready(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = HttpStatusSink::new(server.uri()).unwrap();
        let err = sink.update(&update()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Status(_)));
    }
}
