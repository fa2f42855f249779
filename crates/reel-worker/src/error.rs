//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failures of a pipeline run.
///
/// Each stage has its own variant so the terminal status and the DLQ entry
/// say where the job stopped. A segment that fails alignment is not an error.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Segment extraction failed: {0}")]
    SegmentExtraction(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Status callback failed: {0}")]
    Status(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue operation failed: {0}")]
    QueueFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("Face detector error: {0}")]
    Detector(#[from] reel_ml_client::MlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    pub fn segment_extraction(msg: impl Into<String>) -> Self {
        Self::SegmentExtraction(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn status(msg: impl Into<String>) -> Self {
        Self::Status(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    /// Short label for metrics and the DLQ entry.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Download(_) => "download",
            WorkerError::Transcription(_) => "transcription",
            WorkerError::SegmentExtraction(_) => "segment_extraction",
            WorkerError::Render(_) | WorkerError::Media(_) | WorkerError::Detector(_) => "render",
            WorkerError::Upload(_) | WorkerError::Storage(_) => "upload",
            WorkerError::Status(_) => "status",
            WorkerError::Config(_) => "config",
            WorkerError::QueueFailed(_) | WorkerError::Queue(_) => "queue",
            WorkerError::Io(_) => "io",
        }
    }
}
