//! Crop box geometry for face-following portrait output.

use serde::{Deserialize, Serialize};

/// Width over height of the portrait crop.
pub const PORTRAIT_ASPECT: f64 = 9.0 / 16.0;

/// The face should sit between these fractions of the crop height.
const MIN_FACE_POSITION: f64 = 1.0 / 4.0;
const MAX_FACE_POSITION: f64 = 1.0 / 3.0;

/// Relative change beyond which a new box is treated as a different subject.
const SIGNIFICANT_CHANGE: f64 = 0.30;
/// Relative change below which a new box is ignored.
const MINOR_MOVEMENT: f64 = 0.30;

/// Axis-aligned box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }

    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the box lies entirely inside a `frame_width` x `frame_height` frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= frame_width as u64
            && self.y as u64 + self.height as u64 <= frame_height as u64
    }

    /// Shrink/shift the box so it fits inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let x = self.x.min(frame_width.saturating_sub(1));
        let y = self.y.min(frame_height.saturating_sub(1));
        BoundingBox {
            x,
            y,
            width: self.width.min(frame_width - x.min(frame_width)),
            height: self.height.min(frame_height - y.min(frame_height)),
        }
    }
}

/// How a freshly computed crop box relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxTransition {
    /// Large jump: treat as a new subject and cut to the candidate.
    Snap,
    /// Small jitter: keep the previous box.
    Hold,
    /// Moderate movement: follow the candidate.
    Adopt,
}

/// Policy applied to `BoxTransition::Adopt`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoxSmoothing {
    /// Move straight to the candidate.
    #[default]
    Off,
    /// Blend previous and candidate; the factor weights the previous box.
    Blend(f64),
}

/// Compute a 9:16 crop around `face` that keeps it in the upper third.
///
/// The box is scaled so the face occupies between a quarter and a third of
/// its height, centered horizontally on the face where the frame allows,
/// and always contained in the frame.
///
/// Containment wins over centering: near an edge the box is shifted inward,
/// so the face is off-center rather than the crop leaving the frame.
pub fn adjust_bounding_box(face: BoundingBox, frame_width: u32, frame_height: u32) -> BoundingBox {
    if face.is_empty() || frame_width == 0 || frame_height == 0 {
        return centered_crop(frame_width, frame_height);
    }

    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let (x, y, w, h) = (face.x as f64, face.y as f64, face.width as f64, face.height as f64);

    let min_height = h / MIN_FACE_POSITION;
    let mut width = min_height * PORTRAIT_ASPECT;
    let mut height = if width < fw {
        let scale = fw / width;
        width = fw;
        min_height * scale
    } else {
        min_height
    };

    if height > fh {
        height = fh;
        width = height * PORTRAIT_ASPECT;
    }

    let mut new_x = x + w / 2.0 - width / 2.0;
    if new_x < 0.0 {
        new_x = 0.0;
    } else if new_x + width > fw {
        new_x = fw - width;
    }

    let face_position = (h / height).clamp(MIN_FACE_POSITION, MAX_FACE_POSITION);
    let mut new_y = (y - (height * face_position - h) / 2.0).max(0.0);
    if new_y + height > fh {
        new_y = fh - height;
    }

    let bx = (new_x.max(0.0).floor() as u32).min(frame_width - 1);
    let by = (new_y.max(0.0).floor() as u32).min(frame_height - 1);
    BoundingBox {
        x: bx,
        y: by,
        width: (width.floor() as u32).min(frame_width - bx),
        height: (height.floor() as u32).min(frame_height - by),
    }
}

/// Full-height 9:16 crop centered in the frame.
pub fn centered_crop(frame_width: u32, frame_height: u32) -> BoundingBox {
    let width = ((frame_height as f64 * PORTRAIT_ASPECT).round() as u32).min(frame_width);
    BoundingBox {
        x: (frame_width - width) / 2,
        y: 0,
        width,
        height: frame_height,
    }
}

/// Classify the move from `prev` to `candidate`.
pub fn classify_transition(prev: &BoundingBox, candidate: &BoundingBox) -> BoxTransition {
    if prev.is_empty() {
        return BoxTransition::Snap;
    }

    let pw = prev.width as f64;
    let ph = prev.height as f64;
    let center_shift = (prev.cx() - candidate.cx()).abs() / pw;
    let y_shift = (prev.y as f64 - candidate.y as f64).abs() / ph;
    let width_change = (prev.width as f64 - candidate.width as f64).abs() / pw;
    let height_change = (prev.height as f64 - candidate.height as f64).abs() / ph;

    if center_shift > SIGNIFICANT_CHANGE || y_shift > SIGNIFICANT_CHANGE || width_change > SIGNIFICANT_CHANGE {
        BoxTransition::Snap
    } else if center_shift < MINOR_MOVEMENT && height_change < MINOR_MOVEMENT && y_shift < MINOR_MOVEMENT {
        BoxTransition::Hold
    } else {
        BoxTransition::Adopt
    }
}

/// Weighted blend of two boxes around their horizontal centers.
pub fn blend_boxes(prev: &BoundingBox, candidate: &BoundingBox, factor: f64) -> BoundingBox {
    let factor = factor.clamp(0.0, 1.0);
    let mix = |a: f64, b: f64| a * factor + b * (1.0 - factor);

    let width = mix(prev.width as f64, candidate.width as f64).floor();
    let cx = mix(prev.cx(), candidate.cx());
    BoundingBox {
        x: (cx - width / 2.0).max(0.0).floor() as u32,
        y: mix(prev.y as f64, candidate.y as f64).max(0.0).floor() as u32,
        width: width as u32,
        height: mix(prev.height as f64, candidate.height as f64).floor() as u32,
    }
}

/// Pick the crop box for the next face frame.
pub fn next_face_box(
    prev: Option<BoundingBox>,
    candidate: BoundingBox,
    smoothing: BoxSmoothing,
    frame_width: u32,
    frame_height: u32,
) -> BoundingBox {
    let Some(prev) = prev else {
        return candidate;
    };
    match (classify_transition(&prev, &candidate), smoothing) {
        (BoxTransition::Hold, _) => prev,
        (BoxTransition::Snap, _) | (BoxTransition::Adopt, BoxSmoothing::Off) => candidate,
        (BoxTransition::Adopt, BoxSmoothing::Blend(factor)) => {
            blend_boxes(&prev, &candidate, factor).clamp_to(frame_width, frame_height)
        }
    }
}
