//! The `receive_messages` tool: explicit polling of a worker's own mailbox.
//!
//! Lets a worker collect its mail itself instead of waiting to be woken by
//! the dispatcher.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::mailbox::MailboxRegistry;

/// Interval between mailbox checks while waiting.
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default wait for `receive_messages`, in seconds.
pub const DEFAULT_RECEIVE_TIMEOUT_SECS: u64 = 5;

fn default_timeout() -> u64 {
    DEFAULT_RECEIVE_TIMEOUT_SECS
}

/// Tool-call arguments for `receive_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessagesRequest {
    /// Seconds to wait for at least one message.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ReceiveMessagesRequest {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RECEIVE_TIMEOUT_SECS,
        }
    }
}

/// Tool-call result for `receive_messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessagesResponse {
    pub success: bool,
    /// Annotated messages, oldest first.
    pub messages: Vec<String>,
    pub count: usize,
    pub recipient: String,
}

impl ReceiveMessagesResponse {
    /// Text shown to the worker for this result.
    pub fn observation(&self) -> String {
        if self.messages.is_empty() {
            return "No messages received".to_string();
        }
        let bullets: Vec<String> = self.messages.iter().map(|m| format!("• {}", m)).collect();
        format!("Received {} message(s):\n{}", self.count, bullets.join("\n"))
    }
}

/// Reads the mailbox of one worker identity.
#[derive(Clone)]
pub struct MessageReceiver {
    identity: String,
    mailboxes: Arc<MailboxRegistry>,
}

impl MessageReceiver {
    pub fn new(identity: impl Into<String>, mailboxes: Arc<MailboxRegistry>) -> Self {
        Self {
            identity: identity.into(),
            mailboxes,
        }
    }

    /// Wait up to `request.timeout` seconds for mail, returning as soon as
    /// anything has been collected.
    pub async fn receive(&self, request: &ReceiveMessagesRequest) -> ReceiveMessagesResponse {
        self.receive_within(Duration::from_secs(request.timeout)).await
    }

    /// Like [`receive`](Self::receive) with an arbitrary wait.
    pub async fn receive_within(&self, timeout: Duration) -> ReceiveMessagesResponse {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();

        loop {
            match self.mailboxes.drain_all(&self.identity) {
                Ok(batch) => collected.extend(batch.iter().map(|m| m.annotated())),
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "Receive failed");
                    return ReceiveMessagesResponse {
                        success: false,
                        messages: Vec::new(),
                        count: 0,
                        recipient: self.identity.clone(),
                    };
                }
            }
            if !collected.is_empty() || Instant::now() >= deadline {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(RECEIVE_POLL_INTERVAL.min(remaining)).await;
        }

        debug!(identity = %self.identity, count = collected.len(), "Received messages");
        ReceiveMessagesResponse {
            success: true,
            count: collected.len(),
            messages: collected,
            recipient: self.identity.clone(),
        }
    }

    /// Execute a raw tool call whose arguments are JSON.
    pub async fn execute(&self, args: &serde_json::Value) -> ReceiveMessagesResponse {
        let request = serde_json::from_value::<ReceiveMessagesRequest>(args.clone())
            .unwrap_or_default();
        self.receive(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use serde_json::json;

    #[tokio::test]
    async fn test_receive_returns_pending_immediately() {
        let mailboxes = Arc::new(MailboxRegistry::new());
        mailboxes.enqueue("Bob", Message::new("Alice", "one")).unwrap();
        mailboxes.enqueue("Bob", Message::new("Alice", "two")).unwrap();
        let receiver = MessageReceiver::new("Bob", mailboxes.clone());

        let started = std::time::Instant::now();
        let response = receiver.receive_within(Duration::from_secs(5)).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(response.success);
        assert_eq!(response.count, 2);
        assert_eq!(
            response.messages,
            vec!["[From Alice]: one", "[From Alice]: two"]
        );
        assert!(!mailboxes.has_pending("Bob"));
    }

    #[tokio::test]
    async fn test_receive_times_out_empty() {
        let receiver = MessageReceiver::new("Bob", Arc::new(MailboxRegistry::new()));
        let response = receiver.receive_within(Duration::from_millis(150)).await;

        assert!(response.success);
        assert_eq!(response.count, 0);
        assert_eq!(response.observation(), "No messages received");
    }

    #[tokio::test]
    async fn test_receive_waits_for_late_mail() {
        let mailboxes = Arc::new(MailboxRegistry::new());
        let receiver = MessageReceiver::new("Bob", mailboxes.clone());

        let late = mailboxes.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            late.enqueue("Bob", Message::new("Alice", "late")).unwrap();
        });

        let response = receiver.receive_within(Duration::from_secs(2)).await;
        assert_eq!(response.messages, vec!["[From Alice]: late"]);
    }

    #[test]
    fn test_observation_text() {
        let response = ReceiveMessagesResponse {
            success: true,
            messages: vec!["[From Alice]: hi".to_string()],
            count: 1,
            recipient: "Bob".to_string(),
        };
        assert_eq!(response.observation(), "Received 1 message(s):\n• [From Alice]: hi");
    }

    #[tokio::test]
    async fn test_execute_defaults_timeout() {
        let mailboxes = Arc::new(MailboxRegistry::new());
        mailboxes.enqueue("Bob", Message::new("Alice", "hi")).unwrap();
        let receiver = MessageReceiver::new("Bob", mailboxes);
        let response = receiver.execute(&json!({})).await;
        assert_eq!(response.count, 1);
    }
}
