//! Extracted segment types.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::transcript::WordTiming;

/// Letter grade assigned by the oracle to one quality axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A+" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "A-" => Ok(Grade::AMinus),
            "B+" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            other => Err(ModelError::InvalidGrade(other.to_string())),
        }
    }
}

/// Per-axis grades for a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentGrades {
    pub hook: Grade,
    pub flow: Grade,
    pub engagement: Grade,
    pub trend: Grade,
}

/// Desired clip duration bounds in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipLength {
    pub min: f64,
    pub max: f64,
}

impl Default for ClipLength {
    fn default() -> Self {
        Self { min: 30.0, max: 60.0 }
    }
}

impl ClipLength {
    pub fn new(min: f64, max: f64) -> ModelResult<Self> {
        let length = Self { min, max };
        length.validate()?;
        Ok(length)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if !(self.min > 0.0) || self.min > self.max {
            return Err(ModelError::InvalidClipLength(format!(
                "expected 0 < min <= max, got {}..{}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// A time-bounded excerpt of the source chosen for clip output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    pub title: String,
    /// Raw lowercase words as matched against the transcript
    pub text: String,
    /// Punctuated transcript for display
    pub transcript: String,
    /// Start time in seconds (equals `word_timings[0].start`)
    pub start: f64,
    /// End time in seconds (equals last word's end)
    pub end: f64,
    pub word_timings: Vec<WordTiming>,
    pub score: u8,
    pub grades: SegmentGrades,
    pub hashtags: Vec<String>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Fraction of this segment's duration covered by a predecessor ending at `prev_end`.
    ///
    /// Zero when the predecessor ends before this segment starts.
    pub fn overlap_ratio(&self, prev_end: f64) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        ((prev_end - self.start) / duration).max(0.0)
    }
}

/// Descriptive metadata for a pre-specified clip (manual projects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipMetrics {
    pub title: String,
    pub transcript: String,
    pub score: u8,
    pub grades: SegmentGrades,
    pub hashtags: Vec<String>,
}
