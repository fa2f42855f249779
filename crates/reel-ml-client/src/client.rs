//! Detector HTTP client.

use std::io::Cursor;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{MlError, MlResult};
use crate::types::{DetectRequest, DetectResponse, FaceDetection, HealthResponse};

/// Configuration for the detector client.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Base URL of the detector service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// JPEG quality of submitted frames
    pub jpeg_quality: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            jpeg_quality: 85,
        }
    }
}

impl DetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("FACE_DETECTOR_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("FACE_DETECTOR_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("FACE_DETECTOR_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            jpeg_quality: defaults.jpeg_quality,
        }
    }
}

/// Client for the face-detection service.
///
/// `reqwest::Client` is reentrant, so one instance is shared by all workers.
pub struct DetectorClient {
    http: Client,
    config: DetectorConfig,
}

impl DetectorClient {
    pub fn new(config: DetectorConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(DetectorConfig::from_env())
    }

    /// Check if the detector is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Detector health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Detector health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Detect faces in one frame.
    pub async fn detect_faces(&self, frame: &RgbImage) -> MlResult<Vec<FaceDetection>> {
        let request = DetectRequest {
            image: self.encode_frame(frame)?,
            width: frame.width(),
            height: frame.height(),
        };
        let url = format!("{}/detect", self.config.base_url);
        let (url, request) = (&url, &request);

        let response = self
            .with_retry(|| async move {
                let response = self
                    .http
                    .post(url)
                    .json(request)
                    .send()
                    .await
                    .map_err(MlError::Network)?;

                match response.status() {
                    s if s.is_success() => Ok(response),
                    StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => Err(
                        MlError::ServiceUnavailable(format!("detector returned {}", response.status())),
                    ),
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        Err(MlError::RequestFailed(format!(
                            "detector returned {}: {}",
                            status, body
                        )))
                    }
                }
            })
            .await?;

        let body: DetectResponse = response.json().await?;
        debug!(faces = body.faces.len(), "Detector response");
        Ok(body.faces)
    }

    fn encode_frame(&self, frame: &RgbImage) -> MlResult<String> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, self.config.jpeg_quality)
            .encode_image(frame)
            .map_err(|e| MlError::Encoding(e.to_string()))?;
        Ok(STANDARD.encode(buf.into_inner()))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(
                        "Detector request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
