//! Speech-to-text client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reel_models::{normalize_word, Transcript, WordTiming};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::config::required_env;
use crate::error::{WorkerError, WorkerResult};

const DEEPGRAM_URL: &str = "https://api.deepgram.com";
const DEEPGRAM_MODEL: &str = "nova-2";

/// Produces word-level transcripts of audio files.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Transcript>;
}

/// Deepgram prerecorded-audio client.
///
/// `reqwest::Client` is reentrant, so one instance serves every worker task.
pub struct DeepgramTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    words: Vec<DeepgramWord>,
}

#[derive(Debug, Deserialize)]
struct DeepgramWord {
    word: String,
    start: f64,
    end: f64,
}

impl DeepgramTranscriber {
    pub fn new(api_key: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| WorkerError::config_error(format!("transcription client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEEPGRAM_URL.to_string(),
        })
    }

    /// Create from `DEEPGRAM_API_KEY`.
    pub fn from_env() -> WorkerResult<Self> {
        Self::new(required_env("DEEPGRAM_API_KEY")?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn transcribe(&self, audio: &Path) -> WorkerResult<Transcript> {
        let bytes = tokio::fs::read(audio).await?;
        info!(audio = %audio.display(), bytes = bytes.len(), "Transcribing audio");

        let url = format!("{}/v1/listen", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("model", DEEPGRAM_MODEL), ("smart_format", "true")])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/mpeg")
            .body(bytes)
            .send()
            .await
            .map_err(|e| WorkerError::transcription(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::transcription(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ListenResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::transcription(format!("invalid response: {}", e)))?;

        let words = parsed
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.words)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|w| {
                let word = normalize_word(w.word.trim());
                (!word.is_empty()).then(|| WordTiming::new(word, w.start, w.end))
            })
            .collect::<Vec<_>>();

        info!(words = words.len(), "Transcription complete");
        Ok(Transcript::from_words(words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_transcribe_normalizes_words() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/listen"))
            .and(query_param("model", "nova-2"))
            .and(header("Authorization", "Token key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {"channels": [{"alternatives": [{"words": [
                    {"word": " Hello", "start": 0.0, "end": 0.4},
                    {"word": "World!", "start": 0.5, "end": 0.9}
                ]}]}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"ID3").unwrap();

        let transcriber = DeepgramTranscriber::new("key").unwrap().with_base_url(server.uri());
        let transcript = transcriber.transcribe(&audio).await.unwrap();

        assert_eq!(transcript.text, "hello world");
        assert_eq!(transcript.words[1], WordTiming::new("world", 0.5, 0.9));
    }

    #[tokio::test]
    async fn test_http_error_is_transcription_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"ID3").unwrap();

        let transcriber = DeepgramTranscriber::new("key").unwrap().with_base_url(server.uri());
        let err = transcriber.transcribe(&audio).await.unwrap_err();
        assert!(matches!(err, WorkerError::Transcription(_)));
    }
}
