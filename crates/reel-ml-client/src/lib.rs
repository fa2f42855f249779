//! Face-detection service client.
//!
//! The service receives one JPEG frame per request and answers with face
//! boxes in pixel coordinates. [`BlockingFaceDetector`] adapts the async
//! client to the reframe engine's synchronous `FaceDetector` seam.

pub mod client;
pub mod detector;
pub mod error;
pub mod types;

pub use client::{DetectorClient, DetectorConfig};
pub use detector::BlockingFaceDetector;
pub use error::{MlError, MlResult};
pub use types::{DetectRequest, DetectResponse, FaceDetection, HealthResponse};
