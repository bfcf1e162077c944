//! The `send_message` tool: how a worker addresses another worker.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{MessagingError, Result};
use crate::mailbox::MailboxRegistry;
use crate::message::Message;

/// Tool-call arguments for `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub message: String,
}

impl SendMessageRequest {
    pub fn new(recipient_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            message: message.into(),
        }
    }
}

/// Tool-call result for `send_message`. Callers must check `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
    pub recipient: String,
    pub sender: String,
}

/// Per-sender count of successful sends.
#[derive(Debug, Default)]
pub struct OutboundLog {
    counts: Mutex<HashMap<String, u64>>,
}

impl OutboundLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sender: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(sender.to_string()).or_insert(0) += 1;
    }

    pub fn sent_by(&self, sender: &str) -> u64 {
        self.counts
            .lock()
            .map(|c| c.get(sender).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// Sends messages on behalf of one worker identity.
#[derive(Clone)]
pub struct MessageSender {
    identity: String,
    mailboxes: Arc<MailboxRegistry>,
    dispatcher: Dispatcher,
    outbound: Arc<OutboundLog>,
}

impl MessageSender {
    pub fn new(
        identity: impl Into<String>,
        mailboxes: Arc<MailboxRegistry>,
        dispatcher: Dispatcher,
        outbound: Arc<OutboundLog>,
    ) -> Self {
        Self {
            identity: identity.into(),
            mailboxes,
            dispatcher,
            outbound,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Enqueue a message for the recipient and nudge the dispatcher.
    ///
    /// Returns as soon as the message is queued; the recipient runs on its
    /// own dispatch task. Failures are reported in the response, never
    /// raised.
    pub fn send(&self, request: &SendMessageRequest) -> SendMessageResponse {
        match self.try_send(request) {
            Ok(()) => {
                self.outbound.record(&self.identity);
                SendMessageResponse {
                    success: true,
                    message: format!(
                        "Message sent to {}: {}",
                        request.recipient_id, request.message
                    ),
                    recipient: request.recipient_id.clone(),
                    sender: self.identity.clone(),
                }
            }
            Err(e) => {
                warn!(
                    sender = %self.identity,
                    recipient = %request.recipient_id,
                    error = %e,
                    "Send failed"
                );
                self.failure(&request.recipient_id, &e)
            }
        }
    }

    /// Execute a raw tool call whose arguments are JSON.
    pub fn execute(&self, args: &serde_json::Value) -> SendMessageResponse {
        match serde_json::from_value::<SendMessageRequest>(args.clone()) {
            Ok(request) => self.send(&request),
            Err(e) => {
                let recipient = args
                    .get("recipient_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.failure(&recipient, &MessagingError::from(e))
            }
        }
    }

    fn try_send(&self, request: &SendMessageRequest) -> Result<()> {
        if request.recipient_id.is_empty() {
            return Err(MessagingError::EmptyIdentity);
        }
        let message = Message::new(self.identity.clone(), request.message.clone());
        self.mailboxes.enqueue(&request.recipient_id, message)?;
        let outcome = self.dispatcher.notify(&request.recipient_id)?;
        debug!(
            sender = %self.identity,
            recipient = %request.recipient_id,
            ?outcome,
            "Message sent"
        );
        Ok(())
    }

    fn failure(&self, recipient: &str, error: &MessagingError) -> SendMessageResponse {
        SendMessageResponse {
            success: false,
            message: format!("Failed to send message to {}: {}", recipient, error),
            recipient: recipient.to_string(),
            sender: self.identity.clone(),
        }
    }
}
