//! Queue message for one clip-generation run.

use chrono::{DateTime, Utc};
use reel_models::{ClipLength, ClipWindow, JobId, Orientation, ProjectType, VideoQuality};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QueueError, QueueResult};

fn default_caption_style() -> String {
    "no_captions".to_string()
}

/// Submissions send `"1080"` as often as `"1080p"`.
fn lenient_quality<'de, D>(deserializer: D) -> Result<VideoQuality, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .map(VideoQuality::parse_lenient)
        .unwrap_or_default())
}

/// Job to turn one long-form source into clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipJob {
    /// Unique job ID
    pub job_id: JobId,
    pub user_id: String,
    /// Notification address, handled by the API layer
    #[serde(default)]
    pub email: Option<String>,
    pub project_id: String,
    /// Clip title; fetched from the source when absent
    #[serde(default)]
    pub title: Option<String>,
    /// Web URL or `s3://bucket/key` of an uploaded file
    pub source: String,
    #[serde(default, deserialize_with = "lenient_quality")]
    pub quality: VideoQuality,
    #[serde(default)]
    pub orientation: Orientation,
    /// Optional trim applied to the source before anything else
    #[serde(default)]
    pub trim: Option<ClipWindow>,
    #[serde(default)]
    pub clip_length: ClipLength,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default = "default_caption_style")]
    pub caption_style: String,
    #[serde(default)]
    pub add_watermark: bool,
    #[serde(default)]
    pub project_type: ProjectType,
    /// Explicit clip windows for manual projects
    #[serde(default)]
    pub clips: Vec<ClipWindow>,
    /// Human-readable trim range shown by the frontend, echoed in status updates
    #[serde(default)]
    pub processing_timeframe: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ClipJob {
    /// Create an auto-discovery job with default options.
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            user_id: user_id.into(),
            email: None,
            project_id: project_id.into(),
            title: None,
            source: source.into(),
            quality: VideoQuality::default(),
            orientation: Orientation::default(),
            trim: None,
            clip_length: ClipLength::default(),
            keywords: None,
            caption_style: default_caption_style(),
            add_watermark: false,
            project_type: ProjectType::Auto,
            clips: Vec::new(),
            processing_timeframe: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_caption_style(mut self, style: impl Into<String>) -> Self {
        self.caption_style = style.into();
        self
    }

    /// Switch to a manual project with the given clip windows.
    pub fn with_clips(mut self, clips: Vec<ClipWindow>) -> Self {
        self.project_type = ProjectType::Manual;
        self.clips = clips;
        self
    }

    /// Generate idempotency key for submission dedup.
    pub fn idempotency_key(&self) -> String {
        format!("clip:{}:{}", self.user_id, self.project_id)
    }

    /// Reject messages the worker could never complete.
    pub fn validate(&self) -> QueueResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(QueueError::invalid_job("user_id is empty"));
        }
        if self.project_id.trim().is_empty() {
            return Err(QueueError::invalid_job("project_id is empty"));
        }
        if self.source.trim().is_empty() {
            return Err(QueueError::invalid_job("source is empty"));
        }
        self.clip_length
            .validate()
            .map_err(|e| QueueError::invalid_job(e.to_string()))?;
        if let Some(trim) = &self.trim {
            trim.validate().map_err(|e| QueueError::invalid_job(e.to_string()))?;
        }
        if self.project_type == ProjectType::Manual {
            if self.clips.is_empty() {
                return Err(QueueError::invalid_job("manual project without clips"));
            }
            for clip in &self.clips {
                clip.validate().map_err(|e| QueueError::invalid_job(e.to_string()))?;
            }
        }
        Ok(())
    }
}
