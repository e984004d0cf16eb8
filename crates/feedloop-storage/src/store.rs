use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DocumentChunk, FeedbackThread, Reply};

/// Read-only view of the feedback datastore used by the relay.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Fetch a thread by id; `Ok(None)` if it does not exist.
    async fn get_thread(&self, thread_id: &str) -> Result<Option<FeedbackThread>>;

    /// Replies of a thread, oldest first.
    async fn list_replies(&self, thread_id: &str) -> Result<Vec<Reply>>;

    /// Nearest reference chunks to `embedding` within one form, best first.
    async fn search_documents(
        &self,
        embedding: &[f32],
        form_id: &str,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>>;
}
