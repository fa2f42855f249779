//! LLM oracle that proposes clip-worthy segments.
//!
//! The oracle is untrusted: every proposal is validated by aligning its text
//! against the transcript before it becomes a [`Segment`](reel_models::Segment).

use std::time::Duration;

use async_trait::async_trait;
use reel_models::{ClipLength, ClipMetrics, Grade, SegmentGrades};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::required_env;
use crate::error::{WorkerError, WorkerResult};

const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const SEGMENTS_TOOL: &str = "process_segments";
const DESCRIBE_TOOL: &str = "describe_clip";
const GRADES: [&str; 5] = ["A+", "A", "A-", "B+", "B"];

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Request(String),

    #[error("oracle returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("oracle response invalid: {0}")]
    InvalidResponse(String),
}

pub type OracleResult<T> = Result<T, OracleError>;

/// One segment as proposed by the oracle, before alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSegment {
    pub title: String,
    /// Words copied from the transcript, used for alignment
    pub text: String,
    /// Punctuated version for display
    pub transcript: String,
    pub score: u8,
    pub hook: Grade,
    pub flow: Grade,
    pub engagement: Grade,
    pub trend: Grade,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl CandidateSegment {
    pub fn grades(&self) -> SegmentGrades {
        SegmentGrades {
            hook: self.hook,
            flow: self.flow,
            engagement: self.engagement,
            trend: self.trend,
        }
    }
}

/// One extraction call: a whole transcript or one chunk of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub transcript: String,
    pub clip_length: ClipLength,
    pub keywords: Option<String>,
    /// Length of the covered audio in minutes
    pub chunk_minutes: f64,
    pub min_segments: usize,
    pub target_segments: usize,
}

impl ExtractionRequest {
    /// Build a request with segment counts scaled to `chunk_minutes`.
    pub fn new(
        transcript: impl Into<String>,
        clip_length: ClipLength,
        keywords: Option<String>,
        chunk_minutes: f64,
    ) -> Self {
        let (min_segments, target_segments) = segment_targets(chunk_minutes);
        Self {
            transcript: transcript.into(),
            clip_length,
            keywords,
            chunk_minutes,
            min_segments,
            target_segments,
        }
    }
}

/// Minimum and target segment counts for a stretch of `minutes`.
pub fn segment_targets(minutes: f64) -> (usize, usize) {
    if minutes <= 4.0 {
        (1, 4)
    } else if minutes <= 10.0 {
        (3, 6)
    } else if minutes <= 30.0 {
        (5, 12)
    } else {
        (7, 15)
    }
}

/// External text model proposing and describing clips.
#[async_trait]
pub trait SegmentOracle: Send + Sync {
    /// Propose candidate segments for a transcript.
    async fn propose(&self, request: &ExtractionRequest) -> OracleResult<Vec<CandidateSegment>>;

    /// Title, punctuation, score, grades and hashtags for a fixed clip.
    async fn describe(&self, transcript: &str) -> OracleResult<ClipMetrics>;
}

/// Anthropic Messages API with forced tool calls.
pub struct ClaudeOracle {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    tools: Vec<Value>,
    tool_choice: Value,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SegmentsInput {
    segments: Vec<CandidateSegment>,
}

#[derive(Debug, Deserialize)]
struct DescribeInput {
    title: String,
    transcript: String,
    score: u8,
    hook: Grade,
    flow: Grade,
    engagement: Grade,
    trend: Grade,
    #[serde(default)]
    hashtags: Vec<String>,
}

fn grade_schema() -> Value {
    json!({"type": "string", "enum": GRADES})
}

fn segment_properties() -> Value {
    json!({
        "title": {"type": "string", "description": "Catchy, relevant title"},
        "text": {"type": "string", "description": "Exact transcript words of the segment"},
        "transcript": {"type": "string", "description": "The segment with punctuation and capitalization"},
        "score": {"type": "integer", "minimum": 60, "maximum": 100},
        "hook": grade_schema(),
        "flow": grade_schema(),
        "engagement": grade_schema(),
        "trend": grade_schema(),
        "hashtags": {"type": "array", "items": {"type": "string"}, "minItems": 4, "maxItems": 5}
    })
}

fn segments_tool() -> Value {
    json!({
        "name": SEGMENTS_TOOL,
        "description": "Return the segments chosen from the transcript",
        "input_schema": {
            "type": "object",
            "properties": {
                "segments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": segment_properties(),
                        "required": ["title", "text", "transcript", "score", "hook", "flow", "engagement", "trend", "hashtags"]
                    }
                }
            },
            "required": ["segments"]
        }
    })
}

fn describe_tool() -> Value {
    let mut properties = segment_properties();
    if let Some(map) = properties.as_object_mut() {
        map.remove("text");
    }
    json!({
        "name": DESCRIBE_TOOL,
        "description": "Return metrics for the clip",
        "input_schema": {
            "type": "object",
            "properties": properties,
            "required": ["title", "transcript", "score", "hook", "flow", "engagement", "trend", "hashtags"]
        }
    })
}

fn extraction_prompt(request: &ExtractionRequest) -> String {
    let keywords = request
        .keywords
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .unwrap_or("none");
    format!(
        "Pick self-contained, engaging segments from this {:.1}-minute transcript for short-form clips.\n\
         Find at least {} and aim for {} segments, each {}-{} seconds long, spread across the transcript.\n\
         For every segment return `text` copied word for word from the transcript (lowercase, no punctuation) \
         and `transcript` with punctuation and capitalization.\n\
         Favour segments mentioning these keywords: {}.\n\n\
         Transcript:\n{}",
        request.chunk_minutes,
        request.min_segments,
        request.target_segments,
        request.clip_length.min,
        request.clip_length.max,
        keywords,
        request.transcript
    )
}

fn describe_prompt(transcript: &str) -> String {
    format!(
        "Describe this short clip: give it a title, punctuate the transcript, score it from 60 to 100, \
         grade its hook, flow, engagement and trend relevance, and suggest 4-5 hashtags.\n\n\
         Transcript:\n{}",
        transcript
    )
}

impl ClaudeOracle {
    pub fn new(api_key: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| WorkerError::config_error(format!("oracle client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: ANTHROPIC_URL.to_string(),
        })
    }

    /// Create from `ANTHROPIC_API_KEY` and optional `ANTHROPIC_MODEL`.
    pub fn from_env() -> WorkerResult<Self> {
        let mut oracle = Self::new(required_env("ANTHROPIC_API_KEY")?)?;
        if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
            oracle.model = model;
        }
        Ok(oracle)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send `prompt` forcing a call of `tool`, returning the tool input.
    async fn call_tool(&self, prompt: String, tool: Value, tool_name: &str) -> OracleResult<Value> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: 4096,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            tools: vec![tool],
            tool_choice: json!({"type": "tool", "name": tool_name}),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        parsed
            .content
            .into_iter()
            .find(|b| b.kind == "tool_use" && b.name.as_deref() == Some(tool_name))
            .and_then(|b| b.input)
            .ok_or_else(|| OracleError::InvalidResponse(format!("no {} tool call", tool_name)))
    }
}

#[async_trait]
impl SegmentOracle for ClaudeOracle {
    async fn propose(&self, request: &ExtractionRequest) -> OracleResult<Vec<CandidateSegment>> {
        let input = self
            .call_tool(extraction_prompt(request), segments_tool(), SEGMENTS_TOOL)
            .await?;
        let parsed: SegmentsInput =
            serde_json::from_value(input).map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        debug!(candidates = parsed.segments.len(), "Oracle proposed segments");
        Ok(parsed.segments)
    }

    async fn describe(&self, transcript: &str) -> OracleResult<ClipMetrics> {
        let input = self
            .call_tool(describe_prompt(transcript), describe_tool(), DESCRIBE_TOOL)
            .await?;
        let parsed: DescribeInput =
            serde_json::from_value(input).map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        Ok(ClipMetrics {
            title: parsed.title,
            transcript: parsed.transcript,
            score: parsed.score.clamp(60, 100),
            grades: SegmentGrades {
                hook: parsed.hook,
                flow: parsed.flow,
                engagement: parsed.engagement,
                trend: parsed.trend,
            },
            hashtags: parsed.hashtags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidate_json(text: &str) -> Value {
        json!({
            "title": "Big idea", "text": text, "transcript": "Big idea.", "score": 88,
            "hook": "A+", "flow": "A", "engagement": "A-", "trend": "B+",
            "hashtags": ["#a", "#b", "#c", "#d"]
        })
    }

    #[test]
    fn test_segment_targets() {
        assert_eq!(segment_targets(3.0), (1, 4));
        assert_eq!(segment_targets(10.0), (3, 6));
        assert_eq!(segment_targets(25.0), (5, 12));
        assert_eq!(segment_targets(31.0), (7, 15));
    }

    #[test]
    fn test_tools_force_required_fields() {
        let tool = segments_tool();
        assert_eq!(tool["name"], SEGMENTS_TOOL);
        let required = &tool["input_schema"]["properties"]["segments"]["items"]["required"];
        assert!(required.as_array().unwrap().iter().any(|v| v == "text"));

        let describe = describe_tool();
        assert!(describe["input_schema"]["properties"].get("text").is_none());
    }

    #[tokio::test]
    async fn test_propose_reads_tool_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Here you go"},
                    {"type": "tool_use", "name": SEGMENTS_TOOL, "input": {
                        "segments": [candidate_json("one two three")]
                    }}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oracle = ClaudeOracle::new("key").unwrap().with_base_url(server.uri());
        let request = ExtractionRequest::new("one two three", ClipLength::default(), None, 3.0);
        let segments = oracle.propose(&request).await.unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].hook, Grade::APlus);
        assert_eq!(segments[0].grades().engagement, Grade::AMinus);
    }

    #[tokio::test]
    async fn test_missing_tool_call_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "no tool"}]
            })))
            .mount(&server)
            .await;

        let oracle = ClaudeOracle::new("key").unwrap().with_base_url(server.uri());
        let err = oracle.describe("hello").await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let oracle = ClaudeOracle::new("key").unwrap().with_base_url(server.uri());
        let request = ExtractionRequest::new("x", ClipLength::default(), None, 1.0);
        match oracle.propose(&request).await.unwrap_err() {
            OracleError::Http { status, body } => {
                assert_eq!(status, 529);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
