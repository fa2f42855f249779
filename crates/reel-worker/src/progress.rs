//! Job progress and remaining-time estimation.

use std::time::Instant;

use reel_models::{Stage, VideoQuality};

pub const DOWNLOAD_START: u8 = 1;
pub const DOWNLOAD_END: u8 = 15;
pub const TRANSCRIBING: u8 = 20;
pub const ANALYZING: u8 = 25;
pub const GENERATING_START: u8 = 30;
pub const GENERATING_END: u8 = 90;
pub const UPLOADING: u8 = 95;
pub const COMPLETED: u8 = 100;

/// Fixed overhead of a job in seconds.
const BASE_TIME_SECS: f64 = 90.0;
/// Safety margin applied to rate-based estimates.
const ESTIMATE_BUFFER: f64 = 1.1;

/// Processing seconds per minute of source at `quality`.
pub fn per_minute_rate(quality: VideoQuality) -> f64 {
    match quality {
        VideoQuality::P360 => 25.0,
        VideoQuality::P480 => 35.0,
        VideoQuality::P720 => 45.0,
        VideoQuality::P1080 => 55.0,
    }
}

/// Remaining seconds for a job.
///
/// While generating clips with progress in `30..=90`, the observed rate
/// `progress / elapsed` is extrapolated to 100 with a 10% buffer. Everywhere
/// else the quality-based initial estimate is returned.
pub fn calculate_total_estimate(
    duration_secs: f64,
    elapsed_secs: f64,
    progress: u8,
    stage: Stage,
    quality: VideoQuality,
) -> f64 {
    let initial = BASE_TIME_SECS + per_minute_rate(quality) * (duration_secs.max(0.0) / 60.0);

    let in_window = (GENERATING_START..=GENERATING_END).contains(&progress);
    if stage == Stage::Generating && in_window && elapsed_secs > 0.0 {
        let rate = f64::from(progress) / elapsed_secs;
        return f64::from(COMPLETED - progress) / rate * ESTIMATE_BUFFER;
    }
    initial
}

/// Progress of clip `done` out of `total` inside the generating band.
pub fn generating_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return GENERATING_END;
    }
    let span = usize::from(GENERATING_END - GENERATING_START);
    let step = (done.min(total) * span) / total;
    GENERATING_START + step as u8
}

/// Map a download fraction onto the downloading band.
pub fn download_progress(fraction: f64) -> u8 {
    let span = f64::from(DOWNLOAD_END - DOWNLOAD_START);
    DOWNLOAD_START + (fraction.clamp(0.0, 1.0) * span).floor() as u8
}

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub stage: Stage,
    pub progress: u8,
    pub remaining_estimate: f64,
}

/// Keeps reported progress monotonic for one job.
#[derive(Debug)]
pub struct ProgressTracker {
    started: Instant,
    duration_secs: f64,
    quality: VideoQuality,
    last: u8,
}

impl ProgressTracker {
    pub fn new(duration_secs: f64, quality: VideoQuality) -> Self {
        Self {
            started: Instant::now(),
            duration_secs,
            quality,
            last: 0,
        }
    }

    /// Source duration becomes known once the media is probed.
    pub fn set_duration(&mut self, duration_secs: f64) {
        self.duration_secs = duration_secs;
    }

    pub fn last(&self) -> u8 {
        self.last
    }

    /// Record `progress` for `stage`. Lower values than already reported are
    /// raised to the last value.
    pub fn advance(&mut self, stage: Stage, progress: u8) -> ProgressSnapshot {
        self.last = self.last.max(progress.min(COMPLETED));
        let remaining_estimate = calculate_total_estimate(
            self.duration_secs,
            self.started.elapsed().as_secs_f64(),
            self.last,
            stage,
            self.quality,
        );
        ProgressSnapshot {
            stage,
            progress: self.last,
            remaining_estimate,
        }
    }

    /// Same as [`advance`](Self::advance) but only reports a change.
    pub fn advance_if_moved(&mut self, stage: Stage, progress: u8) -> Option<ProgressSnapshot> {
        (progress > self.last).then(|| self.advance(stage, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generating_window_uses_rate() {
        let estimate = calculate_total_estimate(600.0, 100.0, 50, Stage::Generating, VideoQuality::P720);
        // rate 0.5%/s, 50% left, 10% buffer
        assert!((estimate - 110.0).abs() < 1e-9);

        let initial = 90.0 + 45.0 * 10.0;
        assert!((estimate - initial).abs() > 1.0);
    }

    #[test]
    fn test_initial_estimate_outside_window() {
        let before = calculate_total_estimate(600.0, 0.0, 0, Stage::Downloading, VideoQuality::P1080);
        assert!((before - (90.0 + 55.0 * 10.0)).abs() < 1e-9);

        let analyzing = calculate_total_estimate(600.0, 50.0, 25, Stage::Analyzing, VideoQuality::P360);
        assert!((analyzing - (90.0 + 25.0 * 10.0)).abs() < 1e-9);

        let uploading = calculate_total_estimate(600.0, 50.0, 95, Stage::Generating, VideoQuality::P480);
        assert!((uploading - (90.0 + 35.0 * 10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_generating_progress_band() {
        assert_eq!(generating_progress(0, 4), 30);
        assert_eq!(generating_progress(1, 4), 45);
        assert_eq!(generating_progress(4, 4), 90);
        assert_eq!(generating_progress(1, 3), 50);
        assert_eq!(generating_progress(0, 0), 90);
    }

    #[test]
    fn test_download_progress_band() {
        assert_eq!(download_progress(0.0), 1);
        assert_eq!(download_progress(0.5), 8);
        assert_eq!(download_progress(1.0), 15);
        assert_eq!(download_progress(7.0), 15);
    }

    #[test]
    fn test_tracker_never_decreases() {
        let mut tracker = ProgressTracker::new(600.0, VideoQuality::P720);
        assert_eq!(tracker.advance(Stage::Transcribing, 20).progress, 20);
        assert_eq!(tracker.advance(Stage::Transcribing, 12).progress, 20);
        assert_eq!(tracker.advance(Stage::Analyzing, 25).progress, 25);
        assert!(tracker.advance_if_moved(Stage::Analyzing, 25).is_none());
        assert_eq!(tracker.advance_if_moved(Stage::Generating, 30).map(|s| s.progress), Some(30));
    }
}
