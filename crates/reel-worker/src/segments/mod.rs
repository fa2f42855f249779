//! From transcript to clip-worthy segments.
//!
//! The oracle proposes segments as free text; [`align`] maps that text onto
//! exact word timings and [`extract`] handles chunking of long transcripts
//! and removal of overlapping proposals.

pub mod align;
pub mod extract;

pub use align::{align_segment, normalize_tokens, relative_word_timings, ALIGN_WINDOW};
pub use extract::{chunk_count, chunk_ranges, dedup_overlapping, SegmentExtractor, MAX_OVERLAP_RATIO};
