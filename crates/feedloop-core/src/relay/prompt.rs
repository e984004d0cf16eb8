//! Prompt assembly for reply drafting

use feedloop_ai::Message;
use feedloop_storage::{DocumentChunk, FeedbackThread, Reply, SenderKind};

use super::greeting::greeting_name;

/// System instruction used when the caller does not supply its own.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a support agent replying to customer feedback \
on behalf of the product team. Write the reply as plain text in exactly three parts: a \
greeting line, the body, and a sign-off. Separate the parts with single line breaks and never \
leave blank lines. Keep it short and friendly, and only state facts that the conversation or \
the reference documents support.";

const REFERENCE_HEADER: &str = "Reference documents (most relevant first):";

/// Build the ordered message list sent to the completion provider:
/// instructions, greeting hint, the original feedback, every reply in
/// order, then the reference block when documents were found.
pub fn build_messages(
    thread: &FeedbackThread,
    replies: &[Reply],
    documents: &[DocumentChunk],
    instructions: Option<&str>,
) -> Vec<Message> {
    let instructions = instructions
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(DEFAULT_INSTRUCTIONS);

    let name = greeting_name(thread.user_name.as_deref(), thread.user_email.as_deref());

    let mut messages = Vec::with_capacity(replies.len() + 4);
    messages.push(Message::system(instructions));
    messages.push(Message::system(greeting_hint(&name)));
    messages.push(Message::user(thread.message.clone()));

    for reply in replies {
        let message = match reply.sender {
            SenderKind::User => Message::user(reply.content.clone()),
            SenderKind::Staff | SenderKind::Automated => Message::assistant(reply.content.clone()),
        };
        messages.push(message);
    }

    if let Some(block) = reference_block(documents) {
        messages.push(Message::system(block));
    }

    messages
}

fn greeting_hint(name: &str) -> String {
    if name.is_empty() {
        "The customer's name is unknown; open with a neutral greeting such as \"Hi there,\"."
            .to_string()
    } else {
        format!("Greet the customer by the name \"{}\".", name)
    }
}

fn reference_block(documents: &[DocumentChunk]) -> Option<String> {
    if documents.is_empty() {
        return None;
    }

    let entries: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let title = doc
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("Untitled");
            let source = match doc.url.as_deref() {
                Some(url) if !url.is_empty() => format!(" ({})", url),
                _ => String::new(),
            };
            format!("[{}] {}{}\n{}", i + 1, title, source, doc.content.trim())
        })
        .collect();

    Some(format!("{}\n\n{}", REFERENCE_HEADER, entries.join("\n\n")))
}
