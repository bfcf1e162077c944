//! Messages exchanged between workers and the text they are delivered as.

use serde::{Deserialize, Serialize};

/// A message queued for a worker.
///
/// The sender annotation added by [`Message::annotated`] is presentation
/// only; the stored record keeps sender and body apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: String,
    /// Identity of the sending worker.
    pub sender: String,
    /// Message text, possibly empty.
    pub body: String,
    /// When the message was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Message {
    /// Create a new message.
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.into(),
            body: body.into(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Render the message with its sender prepended.
    pub fn annotated(&self) -> String {
        format!("[From {}]: {}", self.sender, self.body)
    }
}

/// Format a drained batch as the single text handed to `Worker::deliver`.
///
/// Returns an empty string for an empty batch.
pub fn format_delivery(messages: &[Message]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let bullets: Vec<String> = messages
        .iter()
        .map(|msg| format!("• {}", msg.annotated()))
        .collect();
    format!(
        "You have received {} message(s):\n{}",
        messages.len(),
        bullets.join("\n")
    )
}
