//! Rendering one clip: cut, reframe, caption.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reel_media::{
    build_cues, cut_video, reframe_file, CaptionRenderer, CaptionStyle, FaceDetector,
    ReframeConfig, ReframeEngine, ReframeReport, Watermark,
};
use reel_models::{ClipWindow, Orientation, WordTiming};
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Everything needed to turn a stretch of source video into a finished clip.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: PathBuf,
    /// Window to cut out of `source` first; `None` renders `source` whole.
    pub window: Option<ClipWindow>,
    /// Words spoken in the clip.
    pub words: Vec<WordTiming>,
    /// Subtracted from word times so captions start at 0.
    pub caption_offset: f64,
    pub orientation: Orientation,
    pub caption_style: CaptionStyle,
    pub watermark: bool,
    pub output: PathBuf,
}

/// Produces the final clip file for a request.
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> WorkerResult<ReframeReport>;
}

/// Reframe engine plus caption renderer.
pub struct ReelRenderer {
    plain: Arc<ReframeEngine>,
    watermarked: Option<Arc<ReframeEngine>>,
    captions: Arc<dyn CaptionRenderer>,
}

impl ReelRenderer {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        config: ReframeConfig,
        watermark: Option<Watermark>,
        captions: Arc<dyn CaptionRenderer>,
    ) -> Self {
        let watermarked = watermark.map(|w| {
            let config = ReframeConfig {
                watermark: Some(w),
                ..config.clone()
            };
            Arc::new(ReframeEngine::new(Arc::clone(&detector), config))
        });
        let plain = Arc::new(ReframeEngine::new(
            detector,
            ReframeConfig {
                watermark: None,
                ..config
            },
        ));
        Self {
            plain,
            watermarked,
            captions,
        }
    }

    fn engine(&self, watermark: bool) -> Arc<ReframeEngine> {
        match (&self.watermarked, watermark) {
            (Some(engine), true) => Arc::clone(engine),
            (None, true) => {
                warn!("Watermark requested but none is configured");
                Arc::clone(&self.plain)
            }
            _ => Arc::clone(&self.plain),
        }
    }
}

fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "clip".to_string());
    output.with_file_name(format!("{}_{}.mp4", stem, suffix))
}

#[async_trait]
impl ClipRenderer for ReelRenderer {
    async fn render(&self, request: &RenderRequest) -> WorkerResult<ReframeReport> {
        let input = match request.window {
            Some(window) => {
                let cut = sibling(&request.output, "cut");
                cut_video(&request.source, &cut, window)
                    .await
                    .map_err(|e| WorkerError::render(format!("cut: {}", e)))?;
                cut
            }
            None => request.source.clone(),
        };

        let captioned = !request.caption_style.is_none();
        let reframed = if captioned {
            sibling(&request.output, "reframed")
        } else {
            request.output.clone()
        };

        let report = reframe_file(
            self.engine(request.watermark),
            &input,
            &reframed,
            request.orientation,
        )
        .await
        .map_err(|e| WorkerError::render(format!("reframe: {}", e)))?;

        if captioned {
            let cues = {
                let mut rng = rand::rng();
                build_cues(
                    request.caption_style,
                    &request.words,
                    request.caption_offset,
                    request.orientation,
                    &mut rng,
                )
            };
            let layout = request.caption_style.layout(request.orientation);
            debug!(cues = cues.len(), style = request.caption_style.as_str(), "Captioning clip");
            self.captions
                .render(&reframed, &request.output, &cues, &layout)
                .await
                .map_err(|e| WorkerError::render(format!("captions: {}", e)))?;
        }

        info!(
            output = %request.output.display(),
            frames = report.frames,
            orientation = %request.orientation,
            "Rendered clip"
        );
        metrics::record_clip_rendered(request.orientation.as_str());
        Ok(report)
    }
}
