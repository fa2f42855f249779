//! Adaptive reframing.
//!
//! Portrait output runs three passes over a clip:
//! 1. per-frame Face/Full decision from face-detection streaks
//! 2. jitter filter removing short mode runs
//! 3. synthesis of 1080x1920 frames (stabilized face crop or gradient letterbox)
//!
//! Landscape output is a plain 1920x1080 resize.

pub mod compose;
pub mod detector;
pub mod engine;
pub mod geometry;
pub mod modes;

pub use compose::{GradientColors, PlacedWatermark, Watermark};
pub use detector::{FaceDetector, ScriptedDetector};
pub use engine::{reframe_file, ReframeConfig, ReframeEngine, ReframeReport};
pub use geometry::{adjust_bounding_box, centered_crop, BoundingBox, BoxSmoothing, BoxTransition};
pub use modes::{decide_modes, filter_jitter, ModeThresholds, ReframeMode};
