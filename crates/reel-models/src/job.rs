//! Job identity and submission options.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output orientation of rendered clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }

    /// Output frame size `(width, height)`.
    pub fn output_size(&self) -> (u32, u32) {
        match self {
            Orientation::Portrait => (1080, 1920),
            Orientation::Landscape => (1920, 1080),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(ModelError::InvalidOrientation(other.to_string())),
        }
    }
}

/// Target download resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum VideoQuality {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl VideoQuality {
    /// Parse leniently: `"1080"`, `"1080p"` and `"1080P"` are equivalent.
    /// Anything unrecognized maps to 720p.
    pub fn parse_lenient(s: &str) -> Self {
        let normalized = s.trim().to_lowercase();
        match normalized.trim_end_matches('p') {
            "360" => VideoQuality::P360,
            "480" => VideoQuality::P480,
            "1080" => VideoQuality::P1080,
            _ => VideoQuality::P720,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            VideoQuality::P360 => 360,
            VideoQuality::P480 => 480,
            VideoQuality::P720 => 720,
            VideoQuality::P1080 => 1080,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::P360 => "360p",
            VideoQuality::P480 => "480p",
            VideoQuality::P720 => "720p",
            VideoQuality::P1080 => "1080p",
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How segments are chosen for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    /// Segments discovered by the oracle
    #[default]
    Auto,
    /// Clip windows supplied with the job
    Manual,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Auto => "auto",
            ProjectType::Manual => "manual",
        }
    }
}

/// A `[start, end]` window in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipWindow {
    pub start: f64,
    pub end: f64,
}

impl ClipWindow {
    pub fn new(start: f64, end: f64) -> ModelResult<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.start < 0.0 || self.end <= self.start {
            return Err(ModelError::InvalidClipWindow(format!(
                "{:.2}..{:.2}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parse_lenient() {
        assert_eq!(VideoQuality::parse_lenient("1080"), VideoQuality::P1080);
        assert_eq!(VideoQuality::parse_lenient("480P"), VideoQuality::P480);
        assert_eq!(VideoQuality::parse_lenient("4k"), VideoQuality::P720);
    }

    #[test]
    fn test_quality_serde() {
        let q: VideoQuality = serde_json::from_str("\"360p\"").unwrap();
        assert_eq!(q, VideoQuality::P360);
        assert_eq!(serde_json::to_string(&VideoQuality::P1080).unwrap(), "\"1080p\"");
    }

    #[test]
    fn test_orientation_output_size() {
        assert_eq!(Orientation::Portrait.output_size(), (1080, 1920));
        assert_eq!("Landscape".parse::<Orientation>().unwrap(), Orientation::Landscape);
    }

    #[test]
    fn test_clip_window_validation() {
        assert!(ClipWindow::new(10.0, 20.0).is_ok());
        assert!(ClipWindow::new(20.0, 10.0).is_err());
        assert!(ClipWindow::new(-1.0, 10.0).is_err());
    }

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
