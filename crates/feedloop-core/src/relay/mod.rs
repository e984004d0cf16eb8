//! Reply relay: prompt assembly, streaming and cancellation

mod framing;
mod greeting;
mod prompt;
mod session;

use std::sync::Arc;
use std::time::Duration;

use feedloop_ai::{CompletionRequest, EmbeddingProvider, LlmClient};
use feedloop_storage::{DocumentChunk, FeedbackStore, FeedbackThread};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};

pub use framing::{
    CARRIAGE_RETURN_SENTINEL, DONE_MARKER, ErrorPayload, NEWLINE_SENTINEL, RelayEvent,
    escape_fragment, unescape_fragment,
};
pub use greeting::greeting_name;
pub use prompt::{DEFAULT_INSTRUCTIONS, build_messages};
pub use session::{RelaySession, RelayStream, SessionState};

/// Inbound relay request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayRequest {
    pub thread_id: String,
    /// Replaces the default system instruction when non-blank
    #[serde(default)]
    pub instructions: Option<String>,
}

impl RelayRequest {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Tunables of the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Reference chunks included in the prompt
    pub top_k: usize,
    /// Longest wait for the next upstream frame
    pub idle_timeout: Duration,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            idle_timeout: Duration::from_secs(60),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Entry point of the relay; cheap to clone and shared across requests.
#[derive(Clone)]
pub struct ReplyRelay {
    store: Arc<dyn FeedbackStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmClient>,
    config: RelayConfig,
}

impl ReplyRelay {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmClient>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Load the thread, retrieve reference documents and build the prompt.
    ///
    /// Errors here happen before any event is sent, so callers can still
    /// answer with a plain error response.
    pub async fn prepare(&self, request: RelayRequest) -> Result<RelaySession> {
        let thread_id = request.thread_id.trim();
        if thread_id.is_empty() {
            return Err(RelayError::BadRequest("thread_id is required".to_string()));
        }

        let mut session = RelaySession::new(thread_id, self.llm.clone(), self.config.idle_timeout);
        session.advance(SessionState::PromptBuilding);

        match self
            .build_request(thread_id, request.instructions.as_deref())
            .await
        {
            Ok(completion) => {
                session.set_request(completion);
                Ok(session)
            }
            Err(err) => {
                warn!(
                    session_id = %session.id(),
                    thread_id = %thread_id,
                    error = %err,
                    "Relay prompt building failed"
                );
                session.finish(SessionState::Errored);
                Err(err)
            }
        }
    }

    async fn build_request(
        &self,
        thread_id: &str,
        instructions: Option<&str>,
    ) -> Result<CompletionRequest> {
        let thread = self
            .store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(thread_id.to_string()))?;

        let (replies, documents) = tokio::join!(
            self.store.list_replies(thread_id),
            self.retrieve_documents(&thread)
        );
        let replies = replies?;
        let documents = documents?;

        info!(
            thread_id = %thread_id,
            replies = replies.len(),
            documents = documents.len(),
            "Assembled relay prompt context"
        );

        let messages = build_messages(&thread, &replies, &documents, instructions);
        let mut completion = CompletionRequest::new(messages);
        if let Some(temperature) = self.config.temperature {
            completion = completion.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            completion = completion.with_max_tokens(max_tokens);
        }
        Ok(completion)
    }

    /// Top-k reference chunks for the thread. Embedding failures abort the
    /// request; similarity search failures only cost the grounding context.
    async fn retrieve_documents(&self, thread: &FeedbackThread) -> Result<Vec<DocumentChunk>> {
        if self.config.top_k == 0 || thread.message.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(&thread.message).await?;

        match self
            .store
            .search_documents(&embedding, &thread.form_id, self.config.top_k)
            .await
        {
            Ok(mut documents) => {
                documents.truncate(self.config.top_k);
                debug!(thread_id = %thread.id, count = documents.len(), "Retrieved reference documents");
                Ok(documents)
            }
            Err(e) => {
                warn!(
                    thread_id = %thread.id,
                    form_id = %thread.form_id,
                    error = %e,
                    "Similarity search failed, continuing without reference documents"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Prepare and immediately start streaming.
    pub async fn stream(&self, request: RelayRequest) -> Result<RelayStream> {
        Ok(self.prepare(request).await?.into_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use feedloop_ai::{AiError, MockLlmClient, MockStep, Role};
    use feedloop_storage::{InMemoryFeedbackStore, Reply, SenderKind};
    use futures::StreamExt;

    struct FixedEmbedder {
        fail_with_status: Option<u16>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> feedloop_ai::Result<Vec<f32>> {
            match self.fail_with_status {
                Some(status) => Err(AiError::LlmHttp {
                    provider: "test".to_string(),
                    status,
                    message: "embedding rejected".to_string(),
                }),
                None => Ok(vec![0.1, 0.2]),
            }
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    async fn seeded_store() -> Arc<InMemoryFeedbackStore> {
        let store = Arc::new(InMemoryFeedbackStore::new());
        store
            .insert_thread(
                FeedbackThread::new("fb_1", "form_1", "Sync fails on large files")
                    .with_user_email("diego.a@example.com"),
            )
            .await;
        store
    }

    fn relay_with(
        store: Arc<InMemoryFeedbackStore>,
        llm: MockLlmClient,
        embed_status: Option<u16>,
    ) -> ReplyRelay {
        ReplyRelay::new(
            store,
            Arc::new(FixedEmbedder {
                fail_with_status: embed_status,
            }),
            Arc::new(llm),
            RelayConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_thread_is_not_found() {
        let llm = MockLlmClient::new("mock");
        let relay = relay_with(seeded_store().await, llm.clone(), None);

        let err = relay.prepare(RelayRequest::new("missing")).await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(ref id) if id == "missing"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_thread_id_is_bad_request() {
        let relay = relay_with(seeded_store().await, MockLlmClient::new("mock"), None);
        let err = relay.prepare(RelayRequest::new("  ")).await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[tokio::test]
    async fn test_prompt_without_replies_or_documents() {
        let relay = relay_with(seeded_store().await, MockLlmClient::new("mock"), None);

        let session = relay.prepare(RelayRequest::new("fb_1")).await.unwrap();
        assert_eq!(session.state(), SessionState::PromptBuilding);

        let messages = &session.request().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, DEFAULT_INSTRUCTIONS);
        assert!(messages[1].content.contains("\"diego.a\""));
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].content, "Sync fails on large files");
    }

    #[tokio::test]
    async fn test_prompt_includes_replies_and_top_documents() {
        let store = seeded_store().await;
        store
            .insert_reply(Reply {
                id: "r1".to_string(),
                feedback_id: "fb_1".to_string(),
                sender: SenderKind::Staff,
                content: "Which plan are you on?".to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            })
            .await;
        for i in 0..7 {
            store
                .insert_document(
                    "form_1",
                    DocumentChunk {
                        content: format!("chunk {}", i),
                        similarity: i as f32 / 10.0,
                        title: Some(format!("Doc {}", i)),
                        url: None,
                    },
                )
                .await;
        }

        let relay = relay_with(store, MockLlmClient::new("mock"), None);
        let session = relay
            .prepare(RelayRequest::new("fb_1").with_instructions("Be formal."))
            .await
            .unwrap();

        let messages = &session.request().messages;
        assert_eq!(messages[0].content, "Be formal.");
        assert_eq!(messages[3].role, Role::Assistant);

        let block = &messages.last().unwrap().content;
        let titles: Vec<&str> = block.lines().filter(|l| l.starts_with('[')).collect();
        assert_eq!(titles, vec!["[1] Doc 6", "[2] Doc 5", "[3] Doc 4", "[4] Doc 3", "[5] Doc 2"]);
    }

    #[tokio::test]
    async fn test_search_failure_is_not_fatal() {
        let store = seeded_store().await;
        store.insert_document("form_1", DocumentChunk {
            content: "unused".to_string(),
            similarity: 0.9,
            title: Some("Unused".to_string()),
            url: None,
        })
        .await;
        store.fail_searches("rpc timeout").await;

        let relay = relay_with(store, MockLlmClient::new("mock"), None);
        let session = relay.prepare(RelayRequest::new("fb_1")).await.unwrap();

        assert_eq!(session.request().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_before_streaming() {
        let llm = MockLlmClient::new("mock");
        let relay = relay_with(seeded_store().await, llm.clone(), Some(401));

        let err = relay.prepare(RelayRequest::new("fb_1")).await.unwrap_err();
        assert_eq!(err.code(), "upstream_auth_error");
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_stream_uses_prepared_prompt() {
        let llm = MockLlmClient::from_steps(
            "mock",
            vec![MockStep::text("Hi diego.a,"), MockStep::text("\nThanks!")],
        );
        let relay = relay_with(seeded_store().await, llm.clone(), None);

        let events: Vec<_> = relay
            .stream(RelayRequest::new("fb_1"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                RelayEvent::Fragment("Hi diego.a,".to_string()),
                RelayEvent::Fragment("\nThanks!".to_string()),
                RelayEvent::Done,
            ]
        );
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 3);
    }
}
