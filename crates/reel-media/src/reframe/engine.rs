//! Three-pass reframing of one clip.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use metrics::counter;
use reel_models::Orientation;
use tracing::{debug, info};

use super::compose::{
    content_edge_colors, crop_and_scale, letterbox, scale_exact, ContentRect, GradientColors,
    PlacedWatermark, Watermark,
};
use super::detector::FaceDetector;
use super::geometry::{adjust_bounding_box, centered_crop, next_face_box, BoundingBox, BoxSmoothing};
use super::modes::{decide_modes, filter_jitter, runs, ModeThresholds, ReframeMode, MIN_MODE_RUN};
use crate::error::{MediaError, MediaResult};
use crate::frames::{FfmpegFrameSink, FfmpegFrameSource, FrameSink, FrameSource};
use crate::probe::probe_video;

/// Tunables for [`ReframeEngine`].
#[derive(Debug, Clone)]
pub struct ReframeConfig {
    pub thresholds: ModeThresholds,
    pub min_mode_run: usize,
    pub smoothing: BoxSmoothing,
    pub watermark: Option<Watermark>,
}

impl Default for ReframeConfig {
    fn default() -> Self {
        Self {
            thresholds: ModeThresholds::default(),
            min_mode_run: MIN_MODE_RUN,
            smoothing: BoxSmoothing::Off,
            watermark: None,
        }
    }
}

/// Outcome of one render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReframeReport {
    pub frames: usize,
    pub face_frames: usize,
    pub full_frames: usize,
    /// Mode switches visible in the output
    pub transitions: usize,
}

/// Mutable state of a single render. Never shared between clips.
#[derive(Debug, Default)]
struct RenderState {
    last_valid_box: Option<BoundingBox>,
    gradient: Option<GradientColors>,
}

/// Converts horizontal footage into portrait or landscape output frames.
pub struct ReframeEngine {
    detector: Arc<dyn FaceDetector>,
    config: ReframeConfig,
}

impl ReframeEngine {
    pub fn new(detector: Arc<dyn FaceDetector>, config: ReframeConfig) -> Self {
        Self { detector, config }
    }

    /// Render every frame of `source` into `sink`.
    ///
    /// Emits exactly one output frame per input frame.
    pub fn render(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        orientation: Orientation,
    ) -> MediaResult<ReframeReport> {
        let (out_w, out_h) = orientation.output_size();
        let watermark = self.config.watermark.as_ref().map(|w| w.prepare(out_h));

        let report = match orientation {
            Orientation::Landscape => self.render_landscape(source, sink, out_w, out_h, watermark.as_ref())?,
            Orientation::Portrait => self.render_portrait(source, sink, out_w, out_h, watermark.as_ref())?,
        };

        sink.finish()?;
        Ok(report)
    }

    fn render_landscape(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        out_w: u32,
        out_h: u32,
        watermark: Option<&PlacedWatermark>,
    ) -> MediaResult<ReframeReport> {
        let mut report = ReframeReport::default();
        while let Some(frame) = source.next_frame()? {
            let mut out = scale_exact(&frame, out_w, out_h);
            if let Some(w) = watermark {
                w.apply(&mut out);
            }
            sink.write_frame(&out)?;
            report.frames += 1;
        }
        Ok(report)
    }

    fn render_portrait(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        out_w: u32,
        out_h: u32,
        watermark: Option<&PlacedWatermark>,
    ) -> MediaResult<ReframeReport> {
        // Pass 1: detect once per frame and keep the results for synthesis.
        let mut detections: Vec<Vec<BoundingBox>> = Vec::new();
        while let Some(frame) = source.next_frame()? {
            detections.push(self.detector.detect(&frame)?);
        }
        let counts: Vec<usize> = detections.iter().map(Vec::len).collect();
        let modes = decide_modes(&counts, self.config.thresholds);

        // Pass 2
        let filtered = filter_jitter(&modes, self.config.min_mode_run);
        debug!(
            frames = filtered.len(),
            raw_runs = runs(&modes).len(),
            filtered_runs = runs(&filtered).len(),
            "Decided reframe modes"
        );

        // Pass 3
        source.rewind()?;
        let mut state = RenderState::default();
        let mut report = ReframeReport::default();
        let mut previous_mode = None;
        let no_faces: Vec<BoundingBox> = Vec::new();

        while let Some(frame) = source.next_frame()? {
            let index = report.frames;
            let mode = filtered
                .get(index)
                .or_else(|| filtered.last())
                .copied()
                .unwrap_or(ReframeMode::Full);
            let faces = detections.get(index).unwrap_or(&no_faces);

            let mut out = self.synthesize(&mut state, &frame, mode, faces, out_w, out_h)?;
            if let Some(w) = watermark {
                w.apply(&mut out);
            }
            sink.write_frame(&out)?;

            report.frames += 1;
            match mode {
                ReframeMode::Face => report.face_frames += 1,
                ReframeMode::Full => report.full_frames += 1,
            }
            if previous_mode.is_some_and(|p| p != mode) {
                report.transitions += 1;
            }
            previous_mode = Some(mode);
        }

        counter!("reframe_frames_total", "mode" => "face").increment(report.face_frames as u64);
        counter!("reframe_frames_total", "mode" => "full").increment(report.full_frames as u64);
        Ok(report)
    }

    fn synthesize(
        &self,
        state: &mut RenderState,
        frame: &RgbImage,
        mode: ReframeMode,
        faces: &[BoundingBox],
        out_w: u32,
        out_h: u32,
    ) -> MediaResult<RgbImage> {
        let (fw, fh) = frame.dimensions();

        let (out, rect) = match mode {
            ReframeMode::Face => {
                if let Some(face) = faces.first() {
                    let candidate = adjust_bounding_box(*face, fw, fh);
                    state.last_valid_box = Some(next_face_box(
                        state.last_valid_box,
                        candidate,
                        self.config.smoothing,
                        fw,
                        fh,
                    ));
                }
                let bbox = state.last_valid_box.unwrap_or_else(|| centered_crop(fw, fh));
                let out = crop_and_scale(frame, bbox, out_w, out_h)?;
                let rect = ContentRect {
                    x: 0,
                    y: 0,
                    width: out_w,
                    height: out_h,
                };
                (out, rect)
            }
            ReframeMode::Full => letterbox(frame, out_w, out_h, state.gradient),
        };

        state.gradient = Some(content_edge_colors(&out, rect));
        Ok(out)
    }
}

/// Reframe the video at `input` into `output`, keeping its audio.
///
/// Decoding, detection and encoding run on a blocking thread.
pub async fn reframe_file(
    engine: Arc<ReframeEngine>,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    orientation: Orientation,
) -> MediaResult<ReframeReport> {
    let input: PathBuf = input.as_ref().to_path_buf();
    let output: PathBuf = output.as_ref().to_path_buf();
    let info = probe_video(&input).await?;
    if info.width == 0 || info.height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "{} has no frame size",
            input.display()
        )));
    }

    let report = tokio::task::spawn_blocking(move || {
        let (out_w, out_h) = orientation.output_size();
        let mut source = FfmpegFrameSource::open(&input, info.width, info.height)?;
        let audio = info.has_audio.then_some(input.as_path());
        let mut sink = FfmpegFrameSink::create(&output, out_w, out_h, info.fps, audio)?;
        engine.render(&mut source, &mut sink, orientation)
    })
    .await
    .map_err(|e| MediaError::internal(format!("reframe task failed: {}", e)))??;

    info!(
        frames = report.frames,
        face_frames = report.face_frames,
        full_frames = report.full_frames,
        transitions = report.transitions,
        "Reframed clip"
    );
    Ok(report)
}
