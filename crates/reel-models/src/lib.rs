//! Shared data models for the reelcut clip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Word-level transcripts and extracted segments
//! - Job submission options (orientation, quality, project type)
//! - Job status, stages and the status callback payload
//! - Output artifact naming

pub mod artifact;
pub mod error;
pub mod job;
pub mod segment;
pub mod status;
pub mod transcript;

pub use artifact::{clip_filename, clip_object_key, sanitize_title};
pub use error::{ModelError, ModelResult};
pub use job::{ClipWindow, JobId, Orientation, ProjectType, VideoQuality};
pub use segment::{ClipLength, ClipMetrics, Grade, Segment, SegmentGrades};
pub use status::{ClipRecord, JobStatus, Stage, StatusUpdate};
pub use transcript::{normalize_word, Transcript, WordTiming};
