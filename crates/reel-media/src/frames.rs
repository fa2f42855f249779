//! Raw frame streaming.
//!
//! The reframe loop is CPU-bound and synchronous, so these types use
//! `std::process` pipes and are meant to be driven from a blocking thread.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;
use tracing::debug;

use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// A rewindable sequence of RGB frames.
pub trait FrameSource: Send {
    /// Frame size `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;

    /// Restart from the first frame.
    fn rewind(&mut self) -> MediaResult<()>;
}

/// Consumer of rendered frames.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and finalize the output.
    fn finish(&mut self) -> MediaResult<()>;
}

/// In-memory frame source.
#[derive(Debug, Clone)]
pub struct VecFrameSource {
    frames: Vec<RgbImage>,
    cursor: usize,
    dimensions: (u32, u32),
}

impl VecFrameSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        let dimensions = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            frames,
            cursor: 0,
            dimensions,
        }
    }
}

impl FrameSource for VecFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// In-memory frame sink.
#[derive(Debug, Default, Clone)]
pub struct VecFrameSink {
    pub frames: Vec<RgbImage>,
    pub finished: bool,
}

impl FrameSink for VecFrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        Ok(())
    }
}

/// Decodes a video file into `rgb24` frames through an FFmpeg pipe.
pub struct FfmpegFrameSource {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<(Child, ChildStdout)>,
}

impl FfmpegFrameSource {
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> MediaResult<Self> {
        check_ffmpeg()?;
        let mut source = Self {
            path: path.as_ref().to_path_buf(),
            width,
            height,
            child: None,
        };
        source.spawn()?;
        Ok(source)
    }

    fn spawn(&mut self) -> MediaResult<()> {
        self.stop();
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdout not captured"))?;
        debug!(path = %self.path.display(), "Opened frame decoder");
        self.child = Some((child, stdout));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((mut child, _)) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let Some((_, stdout)) = self.child.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        if !read_frame(stdout, &mut buf)? {
            self.stop();
            return Ok(None);
        }

        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::internal("frame buffer size mismatch"))
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.spawn()
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fill `buf` with one frame. `Ok(false)` on a clean end of stream.
fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> MediaResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(MediaError::InvalidVideo(format!(
                    "truncated frame: {} of {} bytes",
                    filled,
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Encodes `rgb24` frames to H.264, muxing audio from the original clip.
///
/// A sink dropped before [`FrameSink::finish`] kills and reaps the encoder.
pub struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    output: PathBuf,
    reaped: bool,
}

impl FfmpegFrameSink {
    pub fn create(
        output: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        audio_from: Option<&Path>,
    ) -> MediaResult<Self> {
        check_ffmpeg()?;
        let size = format!("{}x{}", width, height);
        let rate = format!("{:.3}", fps);

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size, "-r", &rate, "-i", "pipe:0"]);
        if let Some(audio) = audio_from {
            cmd.arg("-i").arg(audio).args(["-map", "0:v", "-map", "1:a?", "-c:a", "aac", "-shortest"]);
        }
        cmd.args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "20", "-pix_fmt", "yuv420p"])
            .arg(output.as_ref());

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take();

        Ok(Self {
            child,
            stdin,
            output: output.as_ref().to_path_buf(),
            reaped: false,
        })
    }
}

impl FrameSink for FfmpegFrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder already finished"))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        drop(self.stdin.take());

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = self.child.wait()?;
        self.reaped = true;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("encoding {} failed", self.output.display()),
                Some(stderr),
                status.code(),
            ));
        }
        Ok(())
    }
}

impl Drop for FfmpegFrameSink {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            debug!(output = %self.output.display(), "Encoder already exited: {}", e);
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_vec_source_rewinds() {
        let frames = vec![RgbImage::from_pixel(4, 2, Rgb([1, 2, 3])); 3];
        let mut source = VecFrameSource::new(frames);
        assert_eq!(source.dimensions(), (4, 2));

        let mut count = 0;
        while source.next_frame().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);

        source.rewind().unwrap();
        assert!(source.next_frame().unwrap().is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unfinished_sink_reaps_encoder() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        let pid = child.id();
        let stdin = child.stdin.take();
        let sink = FfmpegFrameSink {
            child,
            stdin,
            output: PathBuf::from("aborted.mp4"),
            reaped: false,
        };

        drop(sink);
        assert!(!Path::new(&format!("/proc/{}", pid)).exists());
    }

    #[test]
    fn test_read_frame_detects_truncation() {
        let mut buf = [0u8; 6];
        let mut full: &[u8] = &[1, 2, 3, 4, 5, 6];
        assert!(read_frame(&mut full, &mut buf).unwrap());

        let mut empty: &[u8] = &[];
        assert!(!read_frame(&mut empty, &mut buf).unwrap());

        let mut short: &[u8] = &[1, 2, 3];
        assert!(read_frame(&mut short, &mut buf).is_err());
    }
}
