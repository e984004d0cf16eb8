//! Feedloop AI - provider clients used by the reply relay
//!
//! This crate provides:
//! - Streaming chat completion client (OpenAI-compatible APIs)
//! - Embedding providers for similarity search queries
//! - A scripted mock LLM client for tests (`test-utils` feature)

pub mod embedding;
pub mod error;
mod http_client;
pub mod llm;

// Re-export commonly used types
pub use embedding::{EmbeddingConfig, EmbeddingProvider, OpenAIEmbedding};
pub use error::{AiError, Result};
pub use llm::{
    CompletionRequest, FinishReason, LlmClient, Message, OpenAIClient, Role, StreamChunk,
    StreamResult, TokenUsage,
};

#[cfg(any(test, feature = "test-utils"))]
pub use llm::{MockLlmClient, MockStep};
