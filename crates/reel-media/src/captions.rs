//! Caption styles and cue generation.
//!
//! Styles decide how words are grouped into on-screen cues and which cues
//! get emphasis. Drawing the cues is delegated to a [`CaptionRenderer`].

use std::path::Path;

use async_trait::async_trait;
use rand::Rng;
use reel_models::{Orientation, WordTiming};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

const PORTRAIT_FONT_SIZE: u32 = 80;
const LANDSCAPE_FONT_SIZE: u32 = 50;
const CAPTION_Y_RATIO: f64 = 0.75;
const IMAN_HIGHLIGHT_CHANCE: f64 = 0.4;
/// Rough glyph advance for bold sans fonts, as a fraction of font size.
const GLYPH_WIDTH_RATIO: f64 = 0.6;

/// Named caption style selected per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    Jre,
    Sadia,
    Iman,
    Jake,
    Elon,
    Chris,
    Matt,
    None,
}

impl CaptionStyle {
    /// Resolve a style from its job-facing name.
    pub fn from_name(name: &str) -> MediaResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jre" => Ok(Self::Jre),
            "sadia" => Ok(Self::Sadia),
            "iman" => Ok(Self::Iman),
            "jake" => Ok(Self::Jake),
            "elon" => Ok(Self::Elon),
            "chris" => Ok(Self::Chris),
            "matt" => Ok(Self::Matt),
            "" | "none" | "no_captions" => Ok(Self::None),
            other => Err(MediaError::UnknownCaptionStyle(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jre => "jre",
            Self::Sadia => "sadia",
            Self::Iman => "iman",
            Self::Jake => "jake",
            Self::Elon => "elon",
            Self::Chris => "chris",
            Self::Matt => "matt",
            Self::None => "no_captions",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Layout for the given output orientation.
    pub fn layout(&self, orientation: Orientation) -> CaptionLayout {
        let portrait = orientation == Orientation::Portrait;
        let max_chars = |p: usize, l: usize| if portrait { p } else { l };

        let (max_chars, text_color, background) = match self {
            Self::Iman | Self::Matt => (max_chars(20, 30), "white", None),
            Self::Jake => (max_chars(30, 30), "yellow", Some("black@0.7")),
            Self::Sadia => (max_chars(18, 30), "white", None),
            Self::Jre => (max_chars(18, 35), "white", None),
            Self::Elon => (max_chars(15, 30), "black", Some("white")),
            Self::Chris => (max_chars(15, 30), "white", None),
            Self::None => (0, "white", None),
        };

        CaptionLayout {
            font_size: if portrait { PORTRAIT_FONT_SIZE } else { LANDSCAPE_FONT_SIZE },
            max_chars,
            y_ratio: CAPTION_Y_RATIO,
            uppercase: true,
            text_color,
            background,
        }
    }

    fn chunking(&self) -> Chunking {
        match self {
            Self::Elon | Self::Chris => Chunking::IsolateLongWords,
            _ => Chunking::Greedy,
        }
    }
}

/// Typography parameters handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayout {
    pub font_size: u32,
    pub max_chars: usize,
    /// Vertical position of the caption line as a fraction of frame height
    pub y_ratio: f64,
    pub uppercase: bool,
    pub text_color: &'static str,
    pub background: Option<&'static str>,
}

/// Horizontal placement of a cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueAnchor {
    Centered,
    /// A word drawn over its own position inside a centered line
    Inline { line_chars: usize, prefix_chars: usize },
}

/// One timed piece of on-screen text, in clip-relative seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub color: String,
    pub background: Option<String>,
    pub anchor: CueAnchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunking {
    /// Count each word plus a trailing space against the budget
    Greedy,
    /// Like `Greedy`, but a word longer than the budget gets its own chunk
    IsolateLongWords,
}

fn chunk_words<'a>(words: &'a [WordTiming], max_chars: usize, chunking: Chunking) -> Vec<&'a [WordTiming]> {
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut chars = 0usize;

    for (i, word) in words.iter().enumerate() {
        let len = word.word.chars().count();

        if chunking == Chunking::IsolateLongWords && len > max_chars {
            if chunk_start < i {
                chunks.push(&words[chunk_start..i]);
            }
            chunks.push(&words[i..=i]);
            chunk_start = i + 1;
            chars = 0;
            continue;
        }

        if chars + len > max_chars && chunk_start < i {
            chunks.push(&words[chunk_start..i]);
            chunk_start = i;
            chars = 0;
        }
        chars += len + 1;
    }

    if chunk_start < words.len() {
        chunks.push(&words[chunk_start..]);
    }
    chunks
}

fn join_words(words: &[WordTiming], uppercase: bool) -> String {
    let line = words.iter().map(|w| w.word.as_str()).collect::<Vec<_>>().join(" ");
    if uppercase {
        line.to_uppercase()
    } else {
        line
    }
}

/// Build the cues for `words`, shifting times by `offset` so the clip starts at 0.
///
/// `rng` drives the random emphasis of the Iman style.
pub fn build_cues<R: Rng + ?Sized>(
    style: CaptionStyle,
    words: &[WordTiming],
    offset: f64,
    orientation: Orientation,
    rng: &mut R,
) -> Vec<CaptionCue> {
    if style.is_none() || words.is_empty() {
        return Vec::new();
    }

    let layout = style.layout(orientation);
    let background = layout.background.map(str::to_string);
    let mut cues = Vec::new();

    for chunk in chunk_words(words, layout.max_chars, style.chunking()) {
        let (first, last) = match (chunk.first(), chunk.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => continue,
        };
        let line = join_words(chunk, layout.uppercase);
        cues.push(CaptionCue {
            text: line.clone(),
            start: (first.start - offset).max(0.0),
            end: (last.end - offset).max(0.0),
            color: layout.text_color.to_string(),
            background: background.clone(),
            anchor: CueAnchor::Centered,
        });

        match style {
            CaptionStyle::Iman | CaptionStyle::Matt => {
                for word in chunk {
                    if rng.random_bool(IMAN_HIGHLIGHT_CHANCE) {
                        let color = if rng.random_bool(0.5) { "0x00FF00" } else { "0xFFFF00" };
                        cues.push(CaptionCue {
                            text: line.clone(),
                            start: (word.start - offset).max(0.0),
                            end: (word.end - offset).max(0.0),
                            color: color.to_string(),
                            background: None,
                            anchor: CueAnchor::Centered,
                        });
                    }
                }
            }
            CaptionStyle::Sadia | CaptionStyle::Jre => {
                let color = if style == CaptionStyle::Sadia { "0xFF00FF" } else { "0x00C800" };
                let line_chars = line.chars().count();
                let mut prefix_chars = 0;
                for word in chunk {
                    let text = if layout.uppercase {
                        word.word.to_uppercase()
                    } else {
                        word.word.clone()
                    };
                    let len = text.chars().count();
                    cues.push(CaptionCue {
                        text,
                        start: (word.start - offset).max(0.0),
                        end: (word.end - offset).max(0.0),
                        color: color.to_string(),
                        background: Some("black".to_string()),
                        anchor: CueAnchor::Inline {
                            line_chars,
                            prefix_chars,
                        },
                    });
                    prefix_chars += len + 1;
                }
            }
            _ => {}
        }
    }

    cues
}

/// Draws caption cues onto a rendered clip.
#[async_trait]
pub trait CaptionRenderer: Send + Sync {
    async fn render(
        &self,
        input: &Path,
        output: &Path,
        cues: &[CaptionCue],
        layout: &CaptionLayout,
    ) -> MediaResult<()>;
}

/// Caption renderer backed by FFmpeg's `drawtext` filter.
#[derive(Debug, Clone, Default)]
pub struct DrawTextRenderer {
    runner: FfmpegRunner,
}

impl DrawTextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `-vf` filter chain drawing every cue.
    pub fn filter_chain(&self, cues: &[CaptionCue], layout: &CaptionLayout) -> String {
        cues.iter()
            .map(|cue| self.drawtext(cue, layout))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn drawtext(&self, cue: &CaptionCue, layout: &CaptionLayout) -> String {
        let mut parts = vec![format!("text='{}'", escape_drawtext(&cue.text))];
        parts.push(format!("fontsize={}", layout.font_size));
        parts.push(format!("fontcolor={}", cue.color));
        parts.push("borderw=4".to_string());
        parts.push("bordercolor=black".to_string());

        let x = match cue.anchor {
            CueAnchor::Centered => "(w-text_w)/2".to_string(),
            CueAnchor::Inline {
                line_chars,
                prefix_chars,
            } => {
                let glyph = layout.font_size as f64 * GLYPH_WIDTH_RATIO;
                format!(
                    "(w-{:.0})/2+{:.0}",
                    line_chars as f64 * glyph,
                    prefix_chars as f64 * glyph
                )
            }
        };
        parts.push(format!("x={}", x));
        parts.push(format!("y=h*{:.2}-text_h/2", layout.y_ratio));

        if let Some(bg) = &cue.background {
            parts.push("box=1".to_string());
            parts.push(format!("boxcolor={}", bg));
            parts.push("boxborderw=12".to_string());
        }
        parts.push(format!("enable='between(t\\,{:.3}\\,{:.3})'", cue.start, cue.end));

        format!("drawtext={}", parts.join(":"))
    }
}

fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '\'' | ':' | '%' | ',' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl CaptionRenderer for DrawTextRenderer {
    async fn render(
        &self,
        input: &Path,
        output: &Path,
        cues: &[CaptionCue],
        layout: &CaptionLayout,
    ) -> MediaResult<()> {
        if cues.is_empty() {
            tokio::fs::copy(input, output).await?;
            return Ok(());
        }

        debug!(cues = cues.len(), output = %output.display(), "Drawing captions");
        let cmd = FfmpegCommand::new(input, output)
            .video_filter(self.filter_chain(cues, layout))
            .video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .audio_codec("copy");
        self.runner.run(&cmd).await
    }
}
