//! Datastore access through the backend's Postgres REST gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::models::{DocumentChunk, FeedbackThread, Reply};
use crate::store::FeedbackStore;

const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`RestFeedbackStore`].
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Project URL, e.g. `https://xyz.example.co`
    pub url: String,
    /// Key sent as both `apikey` and bearer token
    pub api_key: String,
    pub threads_table: String,
    pub replies_table: String,
    /// Similarity search function exposed under `/rpc/`
    pub match_function: String,
    pub timeout_secs: u64,
}

impl RestStoreConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            threads_table: "feedback".to_string(),
            replies_table: "feedback_replies".to_string(),
            match_function: "match_documents".to_string(),
            timeout_secs: 10,
        }
    }
}

/// [`FeedbackStore`] backed by the REST gateway.
#[derive(Clone)]
pub struct RestFeedbackStore {
    client: Client,
    base_url: String,
    config: RestStoreConfig,
}

#[derive(Serialize)]
struct MatchDocumentsParams<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
    form_id: &'a str,
}

impl RestFeedbackStore {
    pub fn new(config: RestStoreConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(StorageError::Config("datastore url is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = format!("{}/rest/v1", config.url.trim_end_matches('/'));

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Accept", "application/json")
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut message = body;
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(StorageError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl FeedbackStore for RestFeedbackStore {
    async fn get_thread(&self, thread_id: &str) -> Result<Option<FeedbackThread>> {
        let request = self
            .client
            .get(format!("{}/{}", self.base_url, self.config.threads_table))
            .query(&[
                ("id", format!("eq.{}", thread_id)),
                ("select", "*".to_string()),
                ("limit", "1".to_string()),
            ]);

        let response = self.authorized(request).send().await?;
        let rows: Vec<FeedbackThread> = Self::read_json(response).await?;
        debug!(thread_id = %thread_id, found = !rows.is_empty(), "Loaded feedback thread");
        Ok(rows.into_iter().next())
    }

    async fn list_replies(&self, thread_id: &str) -> Result<Vec<Reply>> {
        let request = self
            .client
            .get(format!("{}/{}", self.base_url, self.config.replies_table))
            .query(&[
                ("feedback_id", format!("eq.{}", thread_id)),
                ("select", "*".to_string()),
                ("order", "created_at.asc".to_string()),
            ]);

        let response = self.authorized(request).send().await?;
        let replies: Vec<Reply> = Self::read_json(response).await?;
        debug!(thread_id = %thread_id, count = replies.len(), "Loaded replies");
        Ok(replies)
    }

    async fn search_documents(
        &self,
        embedding: &[f32],
        form_id: &str,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let request = self
            .client
            .post(format!("{}/rpc/{}", self.base_url, self.config.match_function))
            .json(&MatchDocumentsParams {
                query_embedding: embedding,
                match_count: limit,
                form_id,
            });

        let response = self.authorized(request).send().await?;
        let mut chunks: Vec<DocumentChunk> = Self::read_json(response).await?;
        chunks.truncate(limit);
        debug!(form_id = %form_id, count = chunks.len(), "Similarity search complete");
        Ok(chunks)
    }
}
