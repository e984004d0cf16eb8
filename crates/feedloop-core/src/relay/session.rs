//! Relay session lifecycle and the upstream read loop

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use feedloop_ai::{CompletionRequest, LlmClient};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::framing::RelayEvent;
use crate::error::RelayError;

/// Outbound event stream of one session.
pub type RelayStream = Pin<Box<dyn Stream<Item = RelayEvent> + Send>>;

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    PromptBuilding,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Errored | SessionState::Cancelled
        )
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, PromptBuilding)
                | (PromptBuilding, Streaming)
                | (PromptBuilding, Errored)
                | (PromptBuilding, Cancelled)
                | (Streaming, Completed)
                | (Streaming, Errored)
                | (Streaming, Cancelled)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::PromptBuilding => "prompt_building",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Errored => "errored",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One relay request in flight.
///
/// Owns the prompt, the cancellation token and the accumulated output.
/// [`RelaySession::into_stream`] consumes the session, so each session makes
/// at most one upstream call.
pub struct RelaySession {
    id: Uuid,
    thread_id: String,
    state: SessionState,
    llm: Arc<dyn LlmClient>,
    request: CompletionRequest,
    cancel: CancellationToken,
    idle_timeout: Duration,
    started: Instant,
    transcript: String,
    fragments: usize,
    dropped_frames: usize,
}

impl fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySession")
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RelaySession {
    pub(crate) fn new(
        thread_id: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            state: SessionState::Idle,
            llm,
            request: CompletionRequest::new(Vec::new()),
            cancel: CancellationToken::new(),
            idle_timeout,
            started: Instant::now(),
            transcript: String::new(),
            fragments: 0,
            dropped_frames: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Prompt that will be sent upstream.
    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }

    /// Token that stops the session at its next read boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn set_request(&mut self, request: CompletionRequest) {
        self.request = request;
    }

    pub(crate) fn advance(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(
                session_id = %self.id,
                from = %self.state,
                to = %next,
                "Ignoring invalid relay session transition"
            );
            return;
        }
        debug!(session_id = %self.id, from = %self.state, to = %next, "Relay session transition");
        self.state = next;
    }

    pub(crate) fn finish(&mut self, terminal: SessionState) {
        self.advance(terminal);
        info!(
            session_id = %self.id,
            thread_id = %self.thread_id,
            state = %self.state,
            fragments = self.fragments,
            chars = self.transcript.chars().count(),
            dropped_frames = self.dropped_frames,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Relay session finished"
        );
        trace!(session_id = %self.id, transcript = %self.transcript, "Relay transcript");
    }

    /// Start the upstream call and turn it into outbound events.
    ///
    /// Emits fragments in upstream order followed by exactly one `Done` or
    /// `Error`, unless the session is cancelled first, in which case the
    /// stream simply ends.
    pub fn into_stream(mut self) -> RelayStream {
        self.advance(SessionState::Streaming);
        info!(
            session_id = %self.id,
            thread_id = %self.thread_id,
            provider = self.llm.provider(),
            model = self.llm.model(),
            messages = self.request.messages.len(),
            "Relay session streaming"
        );

        let cancel = self.cancel.clone();
        let idle_timeout = self.idle_timeout;
        let mut session = self;

        Box::pin(async_stream::stream! {
            if cancel.is_cancelled() {
                session.finish(SessionState::Cancelled);
                return;
            }
            let mut upstream = session.llm.complete_stream(session.request.clone());

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = tokio::time::timeout(idle_timeout, upstream.next()) => Some(next),
                };

                match next {
                    None => {
                        session.finish(SessionState::Cancelled);
                        return;
                    }
                    Some(Err(_elapsed)) => {
                        let err = RelayError::UpstreamTimeout(idle_timeout);
                        warn!(
                            session_id = %session.id,
                            thread_id = %session.thread_id,
                            error = %err,
                            "Upstream went idle"
                        );
                        session.finish(SessionState::Errored);
                        yield RelayEvent::error(&err);
                        return;
                    }
                    Some(Ok(None)) => {
                        session.finish(SessionState::Completed);
                        yield RelayEvent::Done;
                        return;
                    }
                    Some(Ok(Some(Ok(chunk)))) => {
                        if chunk.text.is_empty() {
                            continue;
                        }
                        session.fragments += 1;
                        session.transcript.push_str(&chunk.text);
                        yield RelayEvent::Fragment(chunk.text);
                    }
                    Some(Ok(Some(Err(e)))) if e.is_malformed_frame() => {
                        session.dropped_frames += 1;
                        warn!(
                            session_id = %session.id,
                            thread_id = %session.thread_id,
                            error = %e,
                            "Dropping malformed upstream frame"
                        );
                    }
                    Some(Ok(Some(Err(e)))) => {
                        let err = RelayError::from(e);
                        warn!(
                            session_id = %session.id,
                            thread_id = %session.thread_id,
                            error = %err,
                            "Upstream stream failed"
                        );
                        session.finish(SessionState::Errored);
                        yield RelayEvent::error(&err);
                        return;
                    }
                }
            }
        })
    }
}

impl Drop for RelaySession {
    // A stream dropped mid-flight (client went away) counts as cancelled.
    fn drop(&mut self) {
        if !self.state.is_terminal() && self.state != SessionState::Idle {
            self.finish(SessionState::Cancelled);
        }
    }
}
