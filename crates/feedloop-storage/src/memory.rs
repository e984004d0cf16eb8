use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, StorageError};
use crate::models::{DocumentChunk, FeedbackThread, Reply};
use crate::store::FeedbackStore;

/// Process-local [`FeedbackStore`], for tests and offline development.
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    threads: RwLock<HashMap<String, FeedbackThread>>,
    replies: RwLock<HashMap<String, Vec<Reply>>>,
    documents: RwLock<HashMap<String, Vec<DocumentChunk>>>,
    search_failure: RwLock<Option<String>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_thread(&self, thread: FeedbackThread) {
        self.threads.write().await.insert(thread.id.clone(), thread);
    }

    pub async fn insert_reply(&self, reply: Reply) {
        self.replies
            .write()
            .await
            .entry(reply.feedback_id.clone())
            .or_default()
            .push(reply);
    }

    pub async fn insert_document(&self, form_id: &str, chunk: DocumentChunk) {
        self.documents
            .write()
            .await
            .entry(form_id.to_string())
            .or_default()
            .push(chunk);
    }

    /// Make every subsequent similarity search fail with `message`.
    pub async fn fail_searches(&self, message: impl Into<String>) {
        *self.search_failure.write().await = Some(message.into());
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn get_thread(&self, thread_id: &str) -> Result<Option<FeedbackThread>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn list_replies(&self, thread_id: &str) -> Result<Vec<Reply>> {
        let mut replies = self
            .replies
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        replies.sort_by_key(|r| r.created_at);
        Ok(replies)
    }

    async fn search_documents(
        &self,
        _embedding: &[f32],
        form_id: &str,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        if let Some(message) = self.search_failure.read().await.clone() {
            return Err(StorageError::Unavailable(message));
        }

        let mut chunks = self
            .documents
            .read()
            .await
            .get(form_id)
            .cloned()
            .unwrap_or_default();
        chunks.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        chunks.truncate(limit);
        Ok(chunks)
    }
}
