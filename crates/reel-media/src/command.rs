//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Number of trailing stderr lines kept when FFmpeg fails.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for single-input FFmpeg invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input_args: Vec<String>,
    input: String,
    output_args: Vec<String>,
    output: String,
}

impl FfmpegCommand {
    /// Create a command reading `input` and writing `output`.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input_args: Vec::new(),
            input: input.as_ref().to_string_lossy().to_string(),
            output_args: Vec::new(),
            output: output.as_ref().to_string_lossy().to_string(),
        }
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Restrict the input to `[start, end]` seconds.
    pub fn trim(mut self, start: f64, end: f64) -> Self {
        self.input_args.extend([
            "-ss".to_string(),
            format!("{:.3}", start),
            "-to".to_string(),
            format!("{:.3}", end),
        ]);
        self
    }

    /// Copy all streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Variable bitrate audio quality (`-q:a`).
    pub fn audio_quality(self, q: u8) -> Self {
        self.output_arg("-q:a").output_arg(q.to_string())
    }

    /// Build the argument vector (without the `ffmpeg` program name).
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.clone());
        args
    }
}

/// Runs FFmpeg commands as child processes.
#[derive(Debug, Default, Clone)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command to completion, surfacing the stderr tail on failure.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = child.wait_with_output().await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(stderr_tail(&stderr)),
            output.status.code(),
        ))
    }
}

pub(crate) fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Check if yt-dlp is available.
pub fn check_ytdlp() -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_applies_to_primary_input() {
        let args = FfmpegCommand::new("in.mp4", "out.mp4")
            .trim(12.5, 42.0)
            .stream_copy()
            .build_args();

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(args[ss + 1], "12.500");
        assert_eq!(args[ss + 3], "42.000");
        assert_eq!(args.last().unwrap(), "out.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    }

    #[test]
    fn test_output_options_follow_input() {
        let args = FfmpegCommand::new("clip.mp4", "clip.mp3")
            .audio_quality(0)
            .map("a")
            .build_args();

        assert_eq!(&args[..3], ["-y", "-v", "error"]);
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "clip.mp4");
        assert_eq!(&args[i + 2..], ["-q:a", "0", "-map", "a", "clip.mp3"]);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(&text);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }
}
