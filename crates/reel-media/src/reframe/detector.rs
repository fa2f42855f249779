//! Face detector seam.

use std::sync::Mutex;

use image::RgbImage;

use super::geometry::BoundingBox;
use crate::error::{MediaError, MediaResult};

/// External face detector.
///
/// Implementations are called from blocking threads, possibly several at once,
/// so a detector that is not reentrant must serialize calls itself.
pub trait FaceDetector: Send + Sync {
    /// Detected faces in pixel coordinates of `frame`, most prominent first.
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>>;
}

/// Detector that reports fixed results per frame index; for tests and dry runs.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    script: Vec<Vec<BoundingBox>>,
    cursor: Mutex<usize>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<BoundingBox>>) -> Self {
        Self {
            script,
            cursor: Mutex::new(0),
        }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&self, _frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| MediaError::detection_failed("script lock poisoned"))?;
        let faces = self.script.get(*cursor).cloned().unwrap_or_default();
        *cursor += 1;
        Ok(faces)
    }
}
