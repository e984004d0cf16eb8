use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feedback submission as stored by the widget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackThread {
    pub id: String,
    /// Originating message text
    pub message: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    /// Form (workspace) the feedback was submitted through
    pub form_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl FeedbackThread {
    pub fn new(id: impl Into<String>, form_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            user_name: None,
            user_email: None,
            form_id: form_id.into(),
            created_at: None,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }
}

/// Who wrote a reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// The person who submitted the feedback
    #[serde(alias = "customer")]
    User,
    /// A team member answering from the dashboard
    #[serde(alias = "admin")]
    Staff,
    /// Replies produced by automation (AI drafts, autoresponders)
    #[serde(alias = "ai", alias = "bot")]
    Automated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub id: String,
    pub feedback_id: String,
    pub sender: SenderKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A passage of reference documentation returned by similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub content: String,
    #[serde(default)]
    pub similarity: f32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thread_row_with_missing_optionals() {
        let thread: FeedbackThread = serde_json::from_value(json!({
            "id": "fb_1",
            "message": "Export is broken",
            "form_id": "form_9"
        }))
        .unwrap();

        assert_eq!(thread, FeedbackThread::new("fb_1", "form_9", "Export is broken"));
    }

    #[test]
    fn test_sender_aliases() {
        let kinds: Vec<SenderKind> =
            serde_json::from_value(json!(["user", "customer", "staff", "admin", "automated", "ai"]))
                .unwrap();
        assert_eq!(
            kinds,
            vec![
                SenderKind::User,
                SenderKind::User,
                SenderKind::Staff,
                SenderKind::Staff,
                SenderKind::Automated,
                SenderKind::Automated,
            ]
        );
    }

    #[test]
    fn test_document_chunk_defaults() {
        let chunk: DocumentChunk = serde_json::from_value(json!({"content": "Reset via settings"})).unwrap();
        assert_eq!(chunk.similarity, 0.0);
        assert!(chunk.title.is_none());
    }
}
