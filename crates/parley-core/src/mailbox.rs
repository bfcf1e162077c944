//! Per-identity FIFO mailboxes.
//!
//! Every identity gets exactly one [`Mailbox`] for the lifetime of the
//! registry. Mailboxes are created on first reference and never removed;
//! an empty mailbox is still a mailbox.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{MessagingError, Result};
use crate::message::Message;

/// Unbounded FIFO queue of pending messages for one identity.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the tail.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| MessagingError::LockPoisoned("mailbox"))?;
        queue.push_back(message);
        Ok(())
    }

    /// Remove and return everything queued, oldest first.
    ///
    /// Concurrent drains partition the queue: each message is returned by
    /// exactly one call.
    pub fn drain_all(&self) -> Result<Vec<Message>> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| MessagingError::LockPoisoned("mailbox"))?;
        Ok(queue.drain(..).collect())
    }

    /// Copy of the pending messages without consuming them.
    pub fn snapshot(&self) -> Result<Vec<Message>> {
        let queue = self
            .queue
            .lock()
            .map_err(|_| MessagingError::LockPoisoned("mailbox"))?;
        Ok(queue.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        // Pending mail stays visible even if a holder panicked.
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity to mailbox mapping shared by senders, receivers and the dispatcher.
#[derive(Debug, Default)]
pub struct MailboxRegistry {
    mailboxes: Mutex<HashMap<String, Arc<Mailbox>>>,
}

impl MailboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mailbox for `identity`, creating it on first reference.
    pub fn get_or_create(&self, identity: &str) -> Result<Arc<Mailbox>> {
        if identity.is_empty() {
            return Err(MessagingError::EmptyIdentity);
        }
        let mut mailboxes = self
            .mailboxes
            .lock()
            .map_err(|_| MessagingError::LockPoisoned("mailbox registry"))?;
        let mailbox = mailboxes
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity, "Created mailbox");
                Arc::new(Mailbox::new())
            })
            .clone();
        Ok(mailbox)
    }

    /// Append `message` to the mailbox of `identity`.
    pub fn enqueue(&self, identity: &str, message: Message) -> Result<()> {
        let mailbox = self.get_or_create(identity)?;
        debug!(recipient = identity, sender = %message.sender, "Enqueued message");
        mailbox.enqueue(message)
    }

    /// Drain every pending message for `identity`, oldest first.
    pub fn drain_all(&self, identity: &str) -> Result<Vec<Message>> {
        let drained = self.get_or_create(identity)?.drain_all()?;
        if !drained.is_empty() {
            debug!(identity, count = drained.len(), "Drained mailbox");
        }
        Ok(drained)
    }

    /// Whether `identity` has pending mail. Unknown identities have none.
    pub fn has_pending(&self, identity: &str) -> bool {
        self.mailboxes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identity)
            .is_some_and(|mb| !mb.is_empty())
    }

    /// All identities that have ever been referenced, sorted.
    pub fn identities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .mailboxes
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Non-destructive view of every mailbox, sorted by identity.
    pub fn pending(&self) -> Result<Vec<(String, Vec<Message>)>> {
        let mut entries: Vec<(String, Arc<Mailbox>)> = {
            let mailboxes = self
                .mailboxes
                .lock()
                .map_err(|_| MessagingError::LockPoisoned("mailbox registry"))?;
            mailboxes
                .iter()
                .map(|(id, mb)| (id.clone(), mb.clone()))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(id, mb)| Ok((id, mb.snapshot()?)))
            .collect()
    }
}
