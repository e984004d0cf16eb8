//! Deterministic mock LLM client for relay tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::time::{Duration, sleep};

use crate::error::AiError;

use super::{CompletionRequest, FinishReason, LlmClient, StreamChunk, StreamResult};

/// What a scripted step yields.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    /// A text fragment.
    Text(String),
    /// A frame that failed to parse (recoverable).
    Malformed(String),
    /// A non-success HTTP response from the provider.
    HttpError { status: u16, message: String },
    /// A fatal stream error.
    Error(String),
}

/// Scripted stream item with optional delay before it is yielded.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay_ms: u64,
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Text(content.into()),
        }
    }

    pub fn malformed(raw: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Malformed(raw.into()),
        }
    }

    pub fn http_error(status: u16, message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::HttpError {
                status,
                message: message.into(),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Error(message.into()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A mock LLM client that replays one scripted stream per call and records
/// every request it receives.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    scripts: Arc<Mutex<VecDeque<Vec<MockStep>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        let client = Self::new(model);
        client.push_script(steps);
        client
    }

    /// Queue the script for the next `complete_stream` call.
    pub fn push_script(&self, steps: Vec<MockStep>) {
        self.scripts
            .lock()
            .expect("mock script lock")
            .push_back(steps);
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("mock request lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("mock request lock").len()
    }
}

impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn complete_stream(&self, request: CompletionRequest) -> StreamResult {
        self.requests
            .lock()
            .expect("mock request lock")
            .push(request);
        let steps = self
            .scripts
            .lock()
            .expect("mock script lock")
            .pop_front()
            .unwrap_or_default();

        Box::pin(async_stream::stream! {
            for step in steps {
                if step.delay_ms > 0 {
                    sleep(Duration::from_millis(step.delay_ms)).await;
                }
                match step.kind {
                    MockStepKind::Text(text) => yield Ok(StreamChunk::text(text)),
                    MockStepKind::Malformed(raw) => yield Err(AiError::MalformedFrame(raw)),
                    MockStepKind::HttpError { status, message } => {
                        yield Err(AiError::LlmHttp {
                            provider: "mock".to_string(),
                            status,
                            message,
                        });
                        return;
                    }
                    MockStepKind::Error(message) => {
                        yield Err(AiError::Llm(message));
                        return;
                    }
                }
            }
            yield Ok(StreamChunk::final_chunk(FinishReason::Stop, None));
        })
    }
}
