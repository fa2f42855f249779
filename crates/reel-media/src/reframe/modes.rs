//! Per-frame mode decision and jitter filtering.

use serde::{Deserialize, Serialize};

/// Consecutive single-face frames needed to lock Face mode.
pub const FACE_STREAK_THRESHOLD: u32 = 3;
/// Consecutive non-single-face frames needed to lock Full mode.
pub const NONE_STREAK_THRESHOLD: u32 = 10;
/// Mode runs shorter than this many frames are absorbed by their predecessor.
pub const MIN_MODE_RUN: usize = 60;

/// Framing used for one output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReframeMode {
    /// Crop that follows the detected face
    Face,
    /// Whole frame letterboxed onto the canvas
    Full,
}

/// Streak thresholds for [`decide_modes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeThresholds {
    pub face_streak: u32,
    pub none_streak: u32,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            face_streak: FACE_STREAK_THRESHOLD,
            none_streak: NONE_STREAK_THRESHOLD,
        }
    }
}

/// Pass 1: tag every frame with a mode from its face count.
///
/// Until the first lock each frame is tagged by its own detection. After
/// that the active mode only changes once a streak reaches its threshold;
/// frames in between inherit the previous tag.
pub fn decide_modes(face_counts: &[usize], thresholds: ModeThresholds) -> Vec<ReframeMode> {
    let mut modes = Vec::with_capacity(face_counts.len());
    let mut face_streak = 0u32;
    let mut none_streak = 0u32;
    let mut initial_phase = true;

    for &count in face_counts {
        let single_face = count == 1;
        if single_face {
            face_streak += 1;
            none_streak = 0;
        } else {
            none_streak += 1;
            face_streak = 0;
        }

        let mode = if initial_phase {
            if face_streak >= thresholds.face_streak || none_streak >= thresholds.none_streak {
                initial_phase = false;
            }
            if single_face {
                ReframeMode::Face
            } else {
                ReframeMode::Full
            }
        } else if face_streak >= thresholds.face_streak {
            ReframeMode::Face
        } else if none_streak >= thresholds.none_streak {
            ReframeMode::Full
        } else {
            modes.last().copied().unwrap_or(ReframeMode::Full)
        };
        modes.push(mode);
    }

    modes
}

/// Pass 2: rewrite runs shorter than `min_run` to the preceding filtered mode.
///
/// A short first run has nothing to fall back to and is kept.
pub fn filter_jitter(modes: &[ReframeMode], min_run: usize) -> Vec<ReframeMode> {
    let mut filtered: Vec<ReframeMode> = Vec::with_capacity(modes.len());

    for run in runs(modes) {
        let mode = match filtered.last() {
            Some(&prev) if run.len < min_run => prev,
            _ => run.mode,
        };
        filtered.extend(std::iter::repeat(mode).take(run.len));
    }

    filtered
}

/// A maximal run of identical modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRun {
    pub mode: ReframeMode,
    pub len: usize,
}

/// Split a mode sequence into maximal runs.
pub fn runs(modes: &[ReframeMode]) -> Vec<ModeRun> {
    let mut out: Vec<ModeRun> = Vec::new();
    for &mode in modes {
        match out.last_mut() {
            Some(run) if run.mode == mode => run.len += 1,
            _ => out.push(ModeRun { mode, len: 1 }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReframeMode::{Face, Full};

    fn decide(counts: &[usize]) -> Vec<ReframeMode> {
        decide_modes(counts, ModeThresholds::default())
    }

    #[test]
    fn test_initial_phase_tags_each_frame() {
        let modes = decide(&[1, 0, 1]);
        assert_eq!(modes, vec![Face, Full, Face]);
    }

    #[test]
    fn test_face_lock_after_three_frames() {
        let mut counts = vec![1, 1, 1];
        // after the lock two misses are not enough to leave Face mode
        counts.extend([0, 0]);
        let modes = decide(&counts);
        assert_eq!(modes, vec![Face, Face, Face, Face, Face]);
    }

    #[test]
    fn test_full_requires_ten_consecutive_misses_after_lock() {
        let mut counts = vec![1, 1, 1];
        counts.extend(std::iter::repeat(2).take(9));
        counts.push(0);
        let modes = decide(&counts);
        assert!(modes[..12].iter().all(|m| *m == Face));
        assert_eq!(modes[12], Full);
    }

    #[test]
    fn test_streaks_reset_on_opposite_outcome() {
        let mut counts = vec![0; 10];
        // single faces interrupted before the third
        counts.extend([1, 1, 0, 1, 1, 0]);
        let modes = decide(&counts);
        assert!(modes.iter().all(|m| *m == Full));
    }

    #[test]
    fn test_multiple_faces_count_as_no_detection() {
        let modes = decide(&[2, 2, 3]);
        assert_eq!(modes, vec![Full, Full, Full]);
    }

    #[test]
    fn test_filter_absorbs_short_runs() {
        let mut modes = vec![Full; 80];
        modes.extend(vec![Face; 20]);
        modes.extend(vec![Full; 70]);
        let filtered = filter_jitter(&modes, MIN_MODE_RUN);
        assert_eq!(filtered.len(), modes.len());
        assert!(filtered.iter().all(|m| *m == Full));
    }

    #[test]
    fn test_filter_keeps_short_first_run() {
        let mut modes = vec![Face; 5];
        modes.extend(vec![Full; 100]);
        let filtered = filter_jitter(&modes, MIN_MODE_RUN);
        assert_eq!(&filtered[..5], &[Face; 5]);
        assert!(filtered[5..].iter().all(|m| *m == Full));
    }

    #[test]
    fn test_filter_uses_filtered_predecessor() {
        // Full(70) Face(10) Full(10) Face(70): the middle Full run follows a
        // rewritten Face run, so it also becomes Full.
        let mut modes = vec![Full; 70];
        modes.extend(vec![Face; 10]);
        modes.extend(vec![Full; 10]);
        modes.extend(vec![Face; 70]);
        let filtered = filter_jitter(&modes, MIN_MODE_RUN);
        assert!(filtered[..90].iter().all(|m| *m == Full));
        assert!(filtered[90..].iter().all(|m| *m == Face));
    }

    #[test]
    fn test_no_short_runs_after_filter() {
        // deterministic pseudo-random detection counts
        let mut state = 0x2545_f491u32;
        let counts: Vec<usize> = (0..2000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % 3) as usize
            })
            .collect();

        let filtered = filter_jitter(&decide(&counts), MIN_MODE_RUN);
        let runs = runs(&filtered);
        for run in runs.iter().skip(1) {
            assert!(run.len >= MIN_MODE_RUN, "short run {:?}", run);
        }
        assert_eq!(filtered.len(), counts.len());
    }

    #[test]
    fn test_empty_sequence() {
        assert!(decide(&[]).is_empty());
        assert!(filter_jitter(&[], MIN_MODE_RUN).is_empty());
    }
}
