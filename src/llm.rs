//! Ollama chat backend.
//!
//! Talks to a local Ollama server:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | single-shot completion | `POST /api/chat` with `stream: false` |
//! | streamed completion | `POST /api/chat` with `stream: true`, NDJSON body |
//! | model listing | `GET /api/tags` |
//!
//! Streamed bodies are split into lines across network chunk boundaries.
//! Each line is one JSON object; lines that fail to parse surface as
//! [`BackendError::Decode`] items, which the orchestrator skips. A failure
//! reading the body itself is a transport error and ends the stream. The
//! stream enforces an idle timeout between network chunks.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use kb_helpdesk_core::backend::{BackendError, ChatBackend, Fragment, FragmentStream};
use kb_helpdesk_core::models::{ChatMessage, GenerationConfig};

use crate::config::LlmConfig;

/// Offered when the model list cannot be fetched.
pub const FALLBACK_MODELS: &[&str] = &["gemma3:1b", "gemma:7b", "llama3:8b", "llama3:70b", "mistral:7b"];

const CONNECT_TIMEOUT_SECS: u64 = 10;
const LIST_MODELS_TIMEOUT_SECS: u64 = 10;

pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn chat_body(messages: &[ChatMessage], config: &GenerationConfig, stream: bool) -> serde_json::Value {
        json!({
            "model": config.model,
            "messages": messages,
            "stream": stream,
            "options": {
                "temperature": config.temperature,
                "top_p": config.top_p,
                "num_predict": config.max_tokens,
            },
        })
    }

    async fn post_chat(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&Self::chat_body(messages, config, stream));
        if !stream {
            request = request.timeout(self.timeout);
        }

        debug!(url = %url, model = %config.model, stream, messages = messages.len(), "ollama chat");
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

/// Connection, request and body-read failures. Only per-line JSON parsing
/// produces [`BackendError::Decode`].
fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Unreachable(e.to_string())
    }
}

/// Fragments carried by one NDJSON line; blank lines carry none.
fn parse_line(raw: &[u8]) -> Vec<Result<Fragment, BackendError>> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let parsed: ChatLine = match serde_json::from_str(line) {
        Ok(p) => p,
        Err(_) => return vec![Err(BackendError::Decode(line.to_string()))],
    };

    if let Some(err) = parsed.error {
        return vec![Err(BackendError::Model(err))];
    }

    let mut out = Vec::new();
    if let Some(content) = parsed.message.map(|m| m.content).filter(|c| !c.is_empty()) {
        out.push(Ok(Fragment::Token(content)));
    }
    if parsed.done {
        out.push(Ok(Fragment::Done));
    }
    out
}

struct LineReader<S> {
    body: S,
    buf: Vec<u8>,
    queue: VecDeque<Result<Fragment, BackendError>>,
    idle: Duration,
    eof: bool,
}

/// Turn a raw NDJSON byte stream into fragments.
///
/// Lines may span chunks; a trailing line without a newline is parsed at
/// end of stream. Going `idle` without a chunk ends the stream with
/// [`BackendError::Timeout`].
pub fn ndjson_fragments<S>(body: S, idle: Duration) -> FragmentStream
where
    S: Stream<Item = Result<Vec<u8>, BackendError>> + Send + Unpin + 'static,
{
    let reader = LineReader {
        body,
        buf: Vec::new(),
        queue: VecDeque::new(),
        idle,
        eof: false,
    };

    stream::unfold(reader, |mut r| async move {
        loop {
            if let Some(item) = r.queue.pop_front() {
                return Some((item, r));
            }
            if r.eof {
                return None;
            }
            match tokio::time::timeout(r.idle, r.body.next()).await {
                Err(_) => {
                    r.eof = true;
                    return Some((Err(BackendError::Timeout), r));
                }
                Ok(Some(Ok(chunk))) => {
                    r.buf.extend_from_slice(&chunk);
                    while let Some(pos) = r.buf.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = r.buf.drain(..=pos).collect();
                        r.queue.extend(parse_line(&line));
                    }
                }
                Ok(Some(Err(e))) => {
                    r.eof = true;
                    return Some((Err(e), r));
                }
                Ok(None) => {
                    r.eof = true;
                    let rest = std::mem::take(&mut r.buf);
                    r.queue.extend(parse_line(&rest));
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<String, BackendError> {
        let response = self.post_chat(messages, config, false).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        let parsed: ChatLine = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(BackendError::Model(err));
        }
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError> {
        let opened = tokio::time::timeout(self.timeout, self.post_chat(messages, config, true)).await;
        let response = match opened {
            Ok(r) => r?,
            Err(_) => return Err(BackendError::Timeout),
        };
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(transport_error))
            .boxed();
        Ok(ndjson_fragments(body, self.timeout))
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(LIST_MODELS_TIMEOUT_SECS))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        let tags: TagsResponse =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
