//! Streaming client for an OpenAI-compatible chat completion API.
//!
//! [`LlmClient::stream_chat`] never fails: connection problems, upstream
//! error statuses, and malformed frames all become a single
//! [`StreamEvent::Error`] after which the stream ends.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use secure_rag_core::models::ChatMessage;

use crate::config::LlmConfig;
use crate::error::RagError;

/// One item of a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text fragment, in arrival order.
    Content(String),
    /// Generation failed; no further events follow.
    Error(String),
}

impl StreamEvent {
    /// Text to place in an OpenAI `delta.content` field. Errors are rendered
    /// in-band so that plain OpenAI clients display them.
    pub fn render(&self, base_url: &str) -> String {
        match self {
            StreamEvent::Content(text) => text.clone(),
            StreamEvent::Error(details) => format!(
                "\n[System Error: Could not connect to LLM Engine at {}. Details: {}]",
                base_url, details
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Outcome of one `data:` payload.
#[derive(Debug, PartialEq)]
enum Frame {
    Content(String),
    Skip,
    Done,
    Failed(String),
}

fn parse_data(data: &str) -> Frame {
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Frame::Failed(format!("upstream error: {}", err));
            }
            match chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
            {
                Some(text) if !text.is_empty() => Frame::Content(text),
                _ => Frame::Skip,
            }
        }
        Err(e) => Frame::Failed(format!("malformed stream frame: {}", e)),
    }
}

/// Splits a byte stream into SSE lines without assuming chunk boundaries
/// align with UTF-8 characters or lines.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(decode_line(&line))
    }

    fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

enum State {
    Pending(reqwest::RequestBuilder),
    Streaming {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        lines: LineBuffer,
    },
    Finished,
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // Idle gap between body reads; a long generation may stream for
            // far longer than this.
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Stream a completion for `messages`. Dropping the returned stream
    /// drops the in-flight HTTP response.
    pub fn stream_chat(&self, messages: Vec<ChatMessage>) -> BoxStream<'static, StreamEvent> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };
        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        stream::unfold(State::Pending(request), next_event).boxed()
    }
}

fn fail(reason: String) -> Option<(StreamEvent, State)> {
    warn!(error = %RagError::UpstreamModelUnreachable(reason.clone()), "generation failed");
    Some((StreamEvent::Error(reason), State::Finished))
}

async fn next_event(mut state: State) -> Option<(StreamEvent, State)> {
    loop {
        state = match state {
            State::Finished => return None,
            State::Pending(request) => match request.send().await {
                Ok(response) if response.status().is_success() => State::Streaming {
                    body: response.bytes_stream().boxed(),
                    lines: LineBuffer::default(),
                },
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    return fail(format!("upstream returned {}: {}", status, text.trim()));
                }
                Err(e) => return fail(e.to_string()),
            },
            State::Streaming {
                mut body,
                mut lines,
            } => {
                while let Some(line) = lines.next_line() {
                    if let Some(event) = handle_line(&line) {
                        return finish_frame(event, body, lines);
                    }
                }
                match body.next().await {
                    Some(Ok(bytes)) => {
                        lines.push(&bytes);
                        State::Streaming { body, lines }
                    }
                    Some(Err(e)) => return fail(format!("stream interrupted: {}", e)),
                    None => {
                        if let Some(rest) = lines.take_rest() {
                            if let Some(event) = handle_line(&rest) {
                                return finish_frame(event, body, lines);
                            }
                        }
                        debug!("upstream stream closed");
                        return None;
                    }
                }
            }
        };
    }
}

fn handle_line(line: &str) -> Option<Frame> {
    let data = data_payload(line)?;
    if data.is_empty() {
        return None;
    }
    match parse_data(data) {
        Frame::Skip => None,
        frame => Some(frame),
    }
}

fn finish_frame(
    frame: Frame,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    lines: LineBuffer,
) -> Option<(StreamEvent, State)> {
    match frame {
        Frame::Content(text) => Some((StreamEvent::Content(text), State::Streaming { body, lines })),
        Frame::Failed(reason) => fail(reason),
        Frame::Done | Frame::Skip => None,
    }
}
