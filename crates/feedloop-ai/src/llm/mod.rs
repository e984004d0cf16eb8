//! LLM module - streaming chat completion abstraction

mod client;
#[cfg(any(test, feature = "test-utils"))]
mod mock_client;
mod openai;
mod sse;

pub use client::{
    CompletionRequest, FinishReason, LlmClient, Message, Role, StreamChunk, StreamResult,
    TokenUsage,
};
#[cfg(any(test, feature = "test-utils"))]
pub use mock_client::{MockLlmClient, MockStep};
pub use openai::OpenAIClient;
pub use sse::SseDecoder;
