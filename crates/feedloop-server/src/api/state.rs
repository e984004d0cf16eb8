use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use feedloop_ai::{OpenAIClient, OpenAIEmbedding};
use feedloop_core::ReplyRelay;
use feedloop_storage::{RestFeedbackStore, RestStoreConfig};

use crate::config::ServerConfig;

/// Dependencies shared by all API handlers
pub struct AppContext {
    pub relay: ReplyRelay,
    /// Interval between SSE comment frames while the upstream is quiet
    pub keep_alive: Duration,
}

pub type AppState = Arc<AppContext>;

impl AppContext {
    pub fn new(relay: ReplyRelay, keep_alive: Duration) -> AppState {
        Arc::new(Self { relay, keep_alive })
    }

    /// Wire the production datastore and OpenAI-compatible clients.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<AppState> {
        let store = RestFeedbackStore::new(RestStoreConfig::new(
            config.datastore.url.clone(),
            config.datastore.api_key.clone(),
        ))
        .context("Failed to build datastore client")?;

        let embedder = OpenAIEmbedding::new(
            config.embedding.api_key.clone(),
            Some(config.embedding.model.clone()),
        )
        .context("Failed to build embedding client")?
        .with_base_url(config.embedding.base_url.clone());

        let llm = OpenAIClient::new(config.llm.api_key.clone())
            .context("Failed to build completion client")?
            .with_model(config.llm.model.clone())
            .with_base_url(config.llm.base_url.clone());

        let relay = ReplyRelay::new(
            Arc::new(store),
            Arc::new(embedder),
            Arc::new(llm),
            config.relay_config(),
        );

        Ok(Self::new(relay, config.keep_alive()))
    }
}
