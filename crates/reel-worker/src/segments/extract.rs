//! Segment extraction: chunking, oracle calls, alignment and de-duplication.

use std::ops::Range;
use std::sync::Arc;

use reel_models::{ClipLength, ClipMetrics, Segment, Transcript, WordTiming};
use tracing::{debug, info};

use super::align::align_segment;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::oracle::{CandidateSegment, ExtractionRequest, SegmentOracle};
use crate::retry::RetryPolicy;

/// Transcripts longer than this are split into chunks.
pub const CHUNK_MINUTES: f64 = 30.0;
/// Words shared by adjacent chunks.
pub const CHUNK_OVERLAP_WORDS: usize = 150;
/// A segment overlapping its predecessor by more than this share of its own
/// duration is dropped.
pub const MAX_OVERLAP_RATIO: f64 = 0.6;

/// Number of oracle calls for a transcript of `duration_minutes`.
pub fn chunk_count(duration_minutes: f64) -> usize {
    if duration_minutes <= CHUNK_MINUTES {
        1
    } else {
        ((duration_minutes / CHUNK_MINUTES).round() as usize).max(2)
    }
}

/// Word ranges of `n` chunks over `len` words, adjacent chunks sharing
/// [`CHUNK_OVERLAP_WORDS`] words on each side of the cut.
pub fn chunk_ranges(len: usize, n: usize) -> Vec<Range<usize>> {
    if n <= 1 || len == 0 {
        return vec![0..len];
    }
    let per_chunk = len / n;
    (0..n)
        .map(|k| {
            let start = if k == 0 {
                0
            } else {
                (k * per_chunk).saturating_sub(CHUNK_OVERLAP_WORDS)
            };
            let end = if k == n - 1 {
                len
            } else {
                ((k + 1) * per_chunk + CHUNK_OVERLAP_WORDS).min(len)
            };
            start..end
        })
        .collect()
}

/// Sort by start and drop every segment that overlaps the previously kept
/// one by more than [`MAX_OVERLAP_RATIO`]. Returns the kept segments and the
/// number dropped.
pub fn dedup_overlapping(mut segments: Vec<Segment>) -> (Vec<Segment>, usize) {
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut kept: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut dropped = 0;
    for segment in segments {
        if let Some(prev) = kept.last() {
            if segment.start <= prev.start || segment.overlap_ratio(prev.end) > MAX_OVERLAP_RATIO {
                debug!(
                    title = %segment.title,
                    start = segment.start,
                    prev_end = prev.end,
                    "Dropping overlapping segment"
                );
                dropped += 1;
                continue;
            }
        }
        kept.push(segment);
    }
    (kept, dropped)
}

fn words_text(words: &[WordTiming]) -> String {
    words.iter().map(|w| w.word.as_str()).collect::<Vec<_>>().join(" ")
}

fn span_minutes(words: &[WordTiming]) -> f64 {
    match (words.first(), words.last()) {
        (Some(first), Some(last)) => (last.end - first.start).max(0.0) / 60.0,
        _ => 0.0,
    }
}

/// Turns a transcript into aligned, non-overlapping segments.
pub struct SegmentExtractor {
    oracle: Arc<dyn SegmentOracle>,
    retry: RetryPolicy,
}

impl SegmentExtractor {
    pub fn new(oracle: Arc<dyn SegmentOracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    /// Extract segments from `transcript`, sorted by start.
    ///
    /// An empty result is a successful "no clips found"; an oracle failing
    /// every attempt is a segment extraction error.
    pub async fn extract(
        &self,
        transcript: &Transcript,
        clip_length: ClipLength,
        keywords: Option<&str>,
    ) -> WorkerResult<Vec<Segment>> {
        let words = &transcript.words;
        if words.is_empty() {
            info!("Transcript is empty, nothing to extract");
            return Ok(Vec::new());
        }

        let minutes = transcript.duration() / 60.0;
        let ranges = chunk_ranges(words.len(), chunk_count(minutes));
        info!(
            minutes,
            chunks = ranges.len(),
            "Extracting segments"
        );

        let mut aligned = Vec::new();
        let mut misses = 0;
        for (i, range) in ranges.into_iter().enumerate() {
            let chunk = &words[range];
            let request = ExtractionRequest::new(
                words_text(chunk),
                clip_length,
                keywords.map(str::to_string),
                span_minutes(chunk),
            );
            let candidates = self.propose(&request).await?;
            debug!(chunk = i, candidates = candidates.len(), "Oracle answered");

            for candidate in &candidates {
                match align_segment(candidate, words) {
                    Some(segment) => aligned.push(segment),
                    None => {
                        debug!(title = %candidate.title, "Segment text not found in transcript");
                        misses += 1;
                    }
                }
            }
        }

        let (kept, overlapping) = dedup_overlapping(aligned);
        metrics::record_segments_dropped("alignment_miss", misses);
        metrics::record_segments_dropped("overlap", overlapping);
        metrics::record_segments_kept(kept.len());
        info!(
            kept = kept.len(),
            alignment_misses = misses,
            overlapping,
            "Segment extraction complete"
        );
        Ok(kept)
    }

    /// Metadata for a fixed clip of a manual project.
    pub async fn describe(&self, transcript: &str) -> WorkerResult<ClipMetrics> {
        let oracle = &self.oracle;
        self.retry
            .run_with(
                |_| async move { oracle.describe(transcript).await },
                |_, _| metrics::record_oracle_attempt("describe", "failure"),
            )
            .await
            .map_failure(|e, attempts| {
                WorkerError::segment_extraction(format!("{} after {} attempts", e, attempts))
            })
    }

    async fn propose(&self, request: &ExtractionRequest) -> WorkerResult<Vec<CandidateSegment>> {
        let oracle = &self.oracle;
        self.retry
            .run_with(
                |_| async move { oracle.propose(request).await },
                |_, _| metrics::record_oracle_attempt("propose", "failure"),
            )
            .await
            .map_failure(|e, attempts| {
                WorkerError::segment_extraction(format!("{} after {} attempts", e, attempts))
            })
    }
}
