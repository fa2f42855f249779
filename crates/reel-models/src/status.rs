//! Job status, pipeline stages and the status callback payload.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Externally visible job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage. Stages run strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Downloading,
    Transcribing,
    Analyzing,
    Generating,
    Uploading,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Downloading => "downloading",
            Stage::Transcribing => "transcribing",
            Stage::Analyzing => "analyzing",
            Stage::Generating => "generating",
            Stage::Uploading => "uploading",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload posted to the status sink on every stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusUpdate {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub status: JobStatus,
    /// Stage name, or a short description for terminal outcomes
    pub stage: String,
    pub progress: u8,
    pub title: Option<String>,
    pub processing_timeframe: Option<String>,
    /// Seconds remaining, absent once the job is terminal
    pub remaining_estimate: Option<f64>,
}

/// Per-clip result handed to the status sink after upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRecord {
    pub project_id: String,
    pub title: String,
    pub transcript: String,
    /// Signed URL of the uploaded artifact
    pub s3_uri: String,
    pub score: u8,
    pub hook: String,
    pub flow: String,
    pub engagement: String,
    pub trend: String,
    pub hashtags: Vec<String>,
}

impl ClipRecord {
    pub fn from_segment(project_id: impl Into<String>, segment: &Segment, url: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            title: segment.title.clone(),
            transcript: segment.transcript.clone(),
            s3_uri: url.into(),
            score: segment.score,
            hook: segment.grades.hook.to_string(),
            flow: segment.grades.flow.to_string(),
            engagement: segment.grades.engagement.to_string(),
            trend: segment.grades.trend.to_string(),
            hashtags: segment.hashtags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_update_wire_names() {
        let update = StatusUpdate {
            user_id: "u1".into(),
            project_id: "p1".into(),
            status: JobStatus::Processing,
            stage: Stage::Generating.to_string(),
            progress: 45,
            title: Some("Episode 12".into()),
            processing_timeframe: None,
            remaining_estimate: Some(120.5),
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["projectId"], "p1");
        assert_eq!(value["status"], "processing");
        assert_eq!(value["stage"], "generating");
        assert_eq!(value["remaining_estimate"], 120.5);
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::Downloading < Stage::Transcribing);
        assert!(Stage::Generating < Stage::Uploading);
    }

    #[test]
    fn test_terminal_status() {
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
