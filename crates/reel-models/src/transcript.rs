//! Word-level transcript types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single transcribed word with its position in the source audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTiming {
    /// Lowercased word, punctuation stripped
    pub word: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Shift both timestamps by `offset` seconds.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            word: self.word.clone(),
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// Full transcript of a job's audio track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    /// Words joined with single spaces
    pub text: String,
    /// Ordered word timings
    pub words: Vec<WordTiming>,
}

impl Transcript {
    /// Build a transcript from word timings, deriving `text`.
    pub fn from_words(words: Vec<WordTiming>) -> Self {
        let text = words
            .iter()
            .map(|w| w.word.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, words }
    }

    /// Spoken span in seconds, from the first word's start to the last word's end.
    pub fn duration(&self) -> f64 {
        match (self.words.first(), self.words.last()) {
            (Some(first), Some(last)) => (last.end - first.start).max(0.0),
            _ => 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Lowercase a word and strip everything but alphanumerics and apostrophes.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric() || *c == '\'')
        .flat_map(char::to_lowercase)
        .collect()
}
