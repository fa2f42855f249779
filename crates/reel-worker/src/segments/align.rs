//! Temporal alignment of oracle text against the word-level transcript.

use reel_models::{normalize_word, ClipWindow, Segment, WordTiming};

use crate::oracle::CandidateSegment;

/// Tokens compared at each boundary.
pub const ALIGN_WINDOW: usize = 10;

/// Lowercase, punctuation-free tokens of `text`.
pub fn normalize_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

/// First index `i >= from` where the next [`ALIGN_WINDOW`] words equal `tokens`.
fn find_window(words: &[String], tokens: &[String], from: usize) -> Option<usize> {
    if words.len() < ALIGN_WINDOW {
        return None;
    }
    (from..=words.len() - ALIGN_WINDOW).find(|&i| words[i..i + ALIGN_WINDOW] == *tokens)
}

/// Map a candidate onto exact transcript times.
///
/// The start is the first word of the first window matching the candidate's
/// first ten tokens, the end the last word of the first window at or after it
/// matching the last ten tokens. Returns `None` (segment dropped) when the
/// candidate has fewer than ten tokens or either boundary is missing.
pub fn align_segment(candidate: &CandidateSegment, words: &[WordTiming]) -> Option<Segment> {
    let tokens = normalize_tokens(&candidate.text);
    if tokens.len() < ALIGN_WINDOW {
        return None;
    }

    let head = &tokens[..ALIGN_WINDOW];
    let tail = &tokens[tokens.len() - ALIGN_WINDOW..];

    // transcript words go through the same normalization as candidate tokens
    let normalized: Vec<String> = words.iter().map(|w| normalize_word(&w.word)).collect();
    let start_idx = find_window(&normalized, head, 0)?;
    let end_idx = find_window(&normalized, tail, start_idx)? + ALIGN_WINDOW - 1;

    let word_timings = words[start_idx..=end_idx].to_vec();
    let start = word_timings.first()?.start;
    let end = word_timings.last()?.end;
    if end <= start {
        return None;
    }

    Some(Segment {
        title: candidate.title.clone(),
        text: tokens.join(" "),
        transcript: candidate.transcript.clone(),
        start,
        end,
        word_timings,
        score: candidate.score.clamp(60, 100),
        grades: candidate.grades(),
        hashtags: candidate.hashtags.clone(),
    })
}

/// Words inside `window`, re-based so the window starts at zero.
pub fn relative_word_timings(words: &[WordTiming], window: ClipWindow) -> Vec<WordTiming> {
    words
        .iter()
        .filter(|w| w.start >= window.start && w.end <= window.end)
        .map(|w| w.shifted(-window.start))
        .collect()
}
