//! Clip pipeline worker.
//!
//! This crate provides:
//! - A fixed-size worker pool over the durable job queue
//! - Source download with proxy rotation and retry
//! - Transcription and oracle-driven segment extraction with temporal alignment
//! - Clip rendering (reframe, captions, watermark) and upload
//! - Status callbacks with monotonic progress and remaining-time estimates

pub mod config;
pub mod download;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod oracle;
pub mod processor;
pub mod progress;
pub mod proxy;
pub mod render;
pub mod retry;
pub mod segments;
pub mod status;
pub mod transcript;
pub mod upload;

pub use config::WorkerConfig;
pub use download::{DownloadBackend, DownloadManager, MediaAcquirer, PreparedClip, PreparedMedia, ProgressSender, YtDlpBackend};
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobHandler, JobSource};
pub use logging::JobLogger;
pub use oracle::{CandidateSegment, ClaudeOracle, ExtractionRequest, OracleError, SegmentOracle};
pub use processor::{process_job, JobOutcome, ProcessingContext, NO_SEGMENTS_STAGE};
pub use progress::{calculate_total_estimate, ProgressTracker};
pub use proxy::{ProxyEndpoint, ProxyPool};
pub use render::{ClipRenderer, ReelRenderer, RenderRequest};
pub use retry::{RetryPolicy, RetryResult};
pub use segments::{align_segment, SegmentExtractor};
pub use status::{HttpStatusSink, LogStatusSink, StatusSink};
pub use transcript::{DeepgramTranscriber, Transcriber};
pub use upload::{ArtifactStore, S3ArtifactStore};
