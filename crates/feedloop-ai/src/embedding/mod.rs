//! Embedding providers used to build similarity-search queries.

mod openai;
mod provider;

pub use openai::OpenAIEmbedding;
pub use provider::{EmbeddingConfig, EmbeddingProvider};
