use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::provider::{EmbeddingConfig, EmbeddingProvider};
use crate::error::{AiError, Result};
use crate::http_client::{build_http_client, response_to_error};

pub struct OpenAIEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    config: EmbeddingConfig,
}

impl OpenAIEmbedding {
    pub fn new(api_key: impl Into<String>, model: Option<String>) -> Result<Self> {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };

        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            config: EmbeddingConfig {
                model,
                dimension,
                timeout_secs: 30,
            },
        })
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: vec![self.normalize_text(text)],
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .inspect_err(|e| {
                warn!(model = %self.config.model, error = %e, "OpenAI embedding request failed");
            })?;

        if !response.status().is_success() {
            let err = response_to_error(response, "OpenAI").await;
            warn!(
                model = %self.config.model,
                status = ?err.status(),
                error = %err,
                "OpenAI embedding request failed"
            );
            return Err(err);
        }

        let data: EmbeddingResponse = response.json().await?;
        data.data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| AiError::Embedding("No embedding returned".to_string()))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
