//! Feedloop Core - the AI reply streaming relay
//!
//! Turns "draft a reply for feedback thread X" into a cancelable stream of
//! text fragments:
//!
//! ```text
//! RelayRequest ──▶ ReplyRelay::prepare ──▶ RelaySession ──▶ Stream<RelayEvent>
//!                   │ thread + replies        │ Idle → PromptBuilding → Streaming
//!                   │ embedding + top-k docs  │   → Completed | Errored | Cancelled
//!                   └ prompt assembly         └ one upstream call, never retried
//! ```

pub mod error;
pub mod relay;

pub use error::{RelayError, Result};
pub use relay::{
    CARRIAGE_RETURN_SENTINEL, DEFAULT_INSTRUCTIONS, DONE_MARKER, ErrorPayload, NEWLINE_SENTINEL,
    RelayConfig, RelayEvent, RelayRequest, RelaySession, RelayStream, ReplyRelay, SessionState,
    build_messages, escape_fragment, greeting_name, unescape_fragment,
};
