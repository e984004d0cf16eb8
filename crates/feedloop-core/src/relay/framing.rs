//! Outbound event framing for the relay's event stream
//!
//! Wire contract:
//!
//! ```text
//! data: <fragment with \n and \r replaced by sentinels>\n\n
//! event: done\ndata: [DONE]\n\n
//! event: error\ndata: {"code":"...","message":"..."}\n\n
//! ```

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Replaces `\n` inside a fragment.
pub const NEWLINE_SENTINEL: &str = "<|n|>";
/// Replaces `\r` inside a fragment.
pub const CARRIAGE_RETURN_SENTINEL: &str = "<|r|>";
/// Data of the terminal success event.
pub const DONE_MARKER: &str = "[DONE]";

/// Encode a fragment so it fits on a single `data:` line.
pub fn escape_fragment(fragment: &str) -> String {
    fragment
        .replace('\r', CARRIAGE_RETURN_SENTINEL)
        .replace('\n', NEWLINE_SENTINEL)
}

/// Inverse of [`escape_fragment`], as applied by clients.
pub fn unescape_fragment(data: &str) -> String {
    data.replace(NEWLINE_SENTINEL, "\n")
        .replace(CARRIAGE_RETURN_SENTINEL, "\r")
}

/// JSON body of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&RelayError> for ErrorPayload {
    fn from(err: &RelayError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One outbound event of a relay session.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Raw upstream text, escaped only when framed
    Fragment(String),
    Done,
    Error(ErrorPayload),
}

impl RelayEvent {
    pub fn error(err: &RelayError) -> Self {
        RelayEvent::Error(ErrorPayload::from(err))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Fragment(_))
    }

    /// Value of the `event:` field; data events use the default type.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            RelayEvent::Fragment(_) => None,
            RelayEvent::Done => Some("done"),
            RelayEvent::Error(_) => Some("error"),
        }
    }

    /// Single-line value of the `data:` field.
    pub fn data(&self) -> String {
        match self {
            RelayEvent::Fragment(text) => escape_fragment(text),
            RelayEvent::Done => DONE_MARKER.to_string(),
            RelayEvent::Error(payload) => serde_json::to_string(payload).unwrap_or_else(|_| {
                format!(r#"{{"code":"{}","message":"unserializable error"}}"#, payload.code)
            }),
        }
    }

    /// Complete serialized event, including the terminating blank line.
    pub fn to_wire(&self) -> String {
        match self.event_name() {
            Some(name) => format!("event: {}\ndata: {}\n\n", name, self.data()),
            None => format!("data: {}\n\n", self.data()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_round_trip() {
        for fragment in [
            "\nWe fixed it.\n",
            "line one\r\nline two",
            "\n\n\n",
            "no newline",
            "",
            "caf\u{e9}\n\u{1f389}",
        ] {
            let escaped = escape_fragment(fragment);
            assert!(!escaped.contains('\n'));
            assert!(!escaped.contains('\r'));
            assert_eq!(unescape_fragment(&escaped), fragment);
        }
    }

    #[test]
    fn test_data_event_wire_format() {
        let event = RelayEvent::Fragment("\nWe fixed it.\n".to_string());
        assert_eq!(event.to_wire(), "data: <|n|>We fixed it.<|n|>\n\n");
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_done_event_wire_format() {
        assert_eq!(RelayEvent::Done.to_wire(), "event: done\ndata: [DONE]\n\n");
        assert!(RelayEvent::Done.is_terminal());
    }

    #[test]
    fn test_error_event_wire_format() {
        let event = RelayEvent::error(&RelayError::Upstream("HTTP 500:\nboom".to_string()));
        let wire = event.to_wire();

        let data = wire
            .strip_prefix("event: error\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        assert!(!data.contains('\n'));

        let payload: ErrorPayload = serde_json::from_str(data).unwrap();
        assert_eq!(payload.code, "upstream_error");
        assert_eq!(payload.message, "Upstream error: HTTP 500:\nboom");
    }
}
