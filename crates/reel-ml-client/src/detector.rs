//! Synchronous `FaceDetector` adapter.

use std::sync::Arc;

use image::RgbImage;
use reel_media::{BoundingBox, FaceDetector, MediaError, MediaResult};
use tokio::runtime::Handle;

use crate::client::DetectorClient;
use crate::types::FaceDetection;

/// Detections below this confidence are ignored.
const MIN_CONFIDENCE: f64 = 0.5;

/// Runs detector requests from the reframe engine's blocking thread.
///
/// Must be called from outside the async context (e.g. inside
/// `spawn_blocking`), since it blocks on the runtime handle.
pub struct BlockingFaceDetector {
    client: Arc<DetectorClient>,
    handle: Handle,
}

impl BlockingFaceDetector {
    pub fn new(client: Arc<DetectorClient>, handle: Handle) -> Self {
        Self {
            client,
            handle,
        }
    }
}

impl FaceDetector for BlockingFaceDetector {
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        let faces = self
            .handle
            .block_on(self.client.detect_faces(frame))
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;
        Ok(to_boxes(&faces, frame.width(), frame.height(), MIN_CONFIDENCE))
    }
}

/// Confident faces as in-frame boxes, largest first.
fn to_boxes(faces: &[FaceDetection], frame_width: u32, frame_height: u32, min_confidence: f64) -> Vec<BoundingBox> {
    let mut boxes: Vec<BoundingBox> = faces
        .iter()
        .filter(|f| f.confidence >= min_confidence && f.width > 0.0 && f.height > 0.0)
        .map(|f| {
            let x = f.x.max(0.0).round() as u32;
            let y = f.y.max(0.0).round() as u32;
            BoundingBox::new(x, y, f.width.round() as u32, f.height.round() as u32)
                .clamp_to(frame_width, frame_height)
        })
        .filter(|b| !b.is_empty())
        .collect();
    boxes.sort_by(|a, b| b.area().cmp(&a.area()));
    boxes
}
