//! Trimming and audio extraction.

use std::path::{Path, PathBuf};

use reel_models::ClipWindow;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Cut `[window.start, window.end]` out of `input` without re-encoding.
pub async fn cut_video(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    window: ClipWindow,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .trim(window.start, window.end)
        .stream_copy();
    FfmpegRunner::new().run(&cmd).await?;

    info!(
        output = %output.as_ref().display(),
        start = window.start,
        end = window.end,
        "Cut video window"
    );
    Ok(())
}

/// Extract the audio track of `input` as VBR mp3 next to it.
pub async fn extract_audio(input: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let input = input.as_ref();
    let output = input.with_extension("mp3");

    let cmd = FfmpegCommand::new(input, &output).audio_quality(0).map("a");
    FfmpegRunner::new().run(&cmd).await?;

    info!(output = %output.display(), "Extracted audio track");
    Ok(output)
}

/// Path of the sub-clip cut for `window` from `source`.
pub fn window_path(source: &Path, window: ClipWindow) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string());
    source.with_file_name(format!("{}_clip_{:.2}_{:.2}.mp4", stem, window.start, window.end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_path() {
        let window = ClipWindow::new(1.5, 20.25).unwrap();
        let path = window_path(Path::new("/tmp/job/source.mp4"), window);
        assert_eq!(path, PathBuf::from("/tmp/job/source_clip_1.50_20.25.mp4"));
    }
}
