//! OpenAI-compatible streaming chat completion provider

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AiError, Result};
use crate::http_client::{build_http_client, response_to_error};
use crate::llm::client::{
    CompletionRequest, FinishReason, LlmClient, StreamChunk, StreamResult, TokenUsage,
};
use crate::llm::sse::SseDecoder;

const MAX_LOGGED_FRAME: usize = 200;

/// OpenAI client
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct OpenAIStreamRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize, Debug)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    usage: Option<OpenAIUsage>,
    error: Option<OpenAIStreamError>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamError {
    message: String,
}

/// Outcome of decoding one `data:` payload.
#[derive(Debug, PartialEq)]
enum Frame {
    Chunks(Vec<StreamChunk>),
    Done,
}

fn parse_frame(data: &str) -> Result<Frame> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }

    let parsed: OpenAIStreamResponse = serde_json::from_str(data).map_err(|e| {
        AiError::MalformedFrame(format!("{} ({})", truncate(data, MAX_LOGGED_FRAME), e))
    })?;

    if let Some(error) = parsed.error {
        return Err(AiError::Llm(error.message));
    }

    let mut chunks = Vec::new();
    for choice in parsed.choices {
        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            chunks.push(StreamChunk::text(content));
        }
        if let Some(reason) = choice.finish_reason {
            chunks.push(StreamChunk::final_chunk(
                FinishReason::from_provider(&reason),
                None,
            ));
        }
    }

    // Usage arrives in its own frame at the end of the stream
    if let Some(usage) = parsed.usage {
        chunks.push(StreamChunk {
            text: String::new(),
            finish_reason: None,
            usage: Some(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        });
    }

    Ok(Frame::Chunks(chunks))
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

impl LlmClient for OpenAIClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete_stream(&self, request: CompletionRequest) -> StreamResult {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let model = self.model.clone();

        Box::pin(async_stream::stream! {
            debug!(
                model = %model,
                messages = request.messages.len(),
                "Starting OpenAI completion stream"
            );
            let body = OpenAIStreamRequest {
                model: &model,
                messages: request
                    .messages
                    .iter()
                    .map(|m| OpenAIMessage {
                        role: m.role.as_str(),
                        content: &m.content,
                    })
                    .collect(),
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                stream: true,
                stream_options: StreamOptions { include_usage: true },
            };

            let response = match client
                .post(format!("{}/chat/completions", base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Accept", "text/event-stream")
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(model = %model, error = %e, "OpenAI request failed");
                    yield Err(AiError::Http(e));
                    return;
                }
            };

            if !response.status().is_success() {
                let err = response_to_error(response, "OpenAI").await;
                warn!(model = %model, status = ?err.status(), error = %err, "OpenAI completion rejected");
                yield Err(err);
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(model = %model, error = %e, "OpenAI stream read failed");
                        yield Err(AiError::Http(e));
                        return;
                    }
                };

                for data in decoder.push(&bytes) {
                    match parse_frame(&data) {
                        Ok(Frame::Done) => return,
                        Ok(Frame::Chunks(chunks)) => {
                            for chunk in chunks {
                                yield Ok(chunk);
                            }
                        }
                        Err(e) => {
                            let fatal = !e.is_malformed_frame();
                            if fatal {
                                warn!(model = %model, error = %e, "OpenAI stream reported an error");
                            }
                            yield Err(e);
                            if fatal {
                                return;
                            }
                        }
                    }
                }
            }

            // The last event may lack its trailing blank line if the
            // connection was cut; decode it on a best-effort basis.
            if let Some(data) = decoder.finish() {
                match parse_frame(&data) {
                    Ok(Frame::Chunks(chunks)) => {
                        for chunk in chunks {
                            yield Ok(chunk);
                        }
                    }
                    Ok(Frame::Done) => {}
                    Err(e) => yield Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let frame = parse_frame(r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#)
            .unwrap();
        assert_eq!(frame, Frame::Chunks(vec![StreamChunk::text("Hi")]));
    }

    #[test]
    fn test_parse_done_marker() {
        assert_eq!(parse_frame(" [DONE] ").unwrap(), Frame::Done);
    }

    #[test]
    fn test_parse_finish_and_usage() {
        let frame = parse_frame(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Chunks(vec![StreamChunk::final_chunk(FinishReason::MaxTokens, None)])
        );

        let frame = parse_frame(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
        )
        .unwrap();
        let Frame::Chunks(chunks) = frame else {
            panic!("expected chunks");
        };
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].usage.as_ref().map(|u| u.total_tokens), Some(7));
    }

    #[test]
    fn test_parse_malformed_frame() {
        let err = parse_frame("{not json").unwrap_err();
        assert!(err.is_malformed_frame());
    }

    #[test]
    fn test_parse_in_stream_error_is_fatal() {
        let err = parse_frame(r#"{"error":{"message":"overloaded"}}"#).unwrap_err();
        assert!(!err.is_malformed_frame());
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("h\u{e9}llo", 2), "h");
        assert_eq!(truncate("short", 10), "short");
    }
}
