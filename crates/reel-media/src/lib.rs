//! Media processing for the clip pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and execution
//! - FFprobe inspection, trimming and audio extraction
//! - yt-dlp source fetching through an optional proxy
//! - Raw RGB frame streaming in and out of FFmpeg
//! - The adaptive reframing engine (mode decision, jitter filter, frame synthesis)
//! - Caption styles and cue generation

pub mod captions;
pub mod clip;
pub mod command;
pub mod download;
pub mod error;
pub mod frames;
pub mod probe;
pub mod reframe;

pub use captions::{build_cues, CaptionCue, CaptionLayout, CaptionRenderer, CaptionStyle, CueAnchor, DrawTextRenderer};
pub use clip::{cut_video, extract_audio};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use download::{fetch_source, fetch_title, strip_playlist_param, FetchRequest};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegFrameSink, FfmpegFrameSource, FrameSink, FrameSource, VecFrameSink, VecFrameSource};
pub use probe::{probe_video, VideoInfo};
pub use reframe::{
    adjust_bounding_box, reframe_file, BoundingBox, BoxSmoothing, FaceDetector, ReframeConfig,
    ReframeEngine, ReframeMode, ReframeReport, ScriptedDetector, Watermark,
};
