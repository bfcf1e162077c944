//! Shared messaging services, built once and handed to every participant.

use std::sync::Arc;

use crate::dispatcher::{Dispatcher, DEFAULT_MAX_CONCURRENT_DISPATCHES};
use crate::mailbox::MailboxRegistry;
use crate::receiver::MessageReceiver;
use crate::report::ShutdownReport;
use crate::sender::{MessageSender, OutboundLog};
use crate::worker::WorkerRegistry;

/// The mailbox registry, worker registry and dispatcher of one process.
#[derive(Clone)]
pub struct Hub {
    mailboxes: Arc<MailboxRegistry>,
    workers: Arc<WorkerRegistry>,
    dispatcher: Dispatcher,
    outbound: Arc<OutboundLog>,
}

impl Hub {
    pub fn new(max_concurrent_dispatches: usize) -> Self {
        let mailboxes = Arc::new(MailboxRegistry::new());
        let workers = Arc::new(WorkerRegistry::new());
        let dispatcher = Dispatcher::new(
            workers.clone(),
            mailboxes.clone(),
            max_concurrent_dispatches,
        );
        Self {
            mailboxes,
            workers,
            dispatcher,
            outbound: Arc::new(OutboundLog::new()),
        }
    }

    /// A `send_message` tool acting as `identity`.
    pub fn sender(&self, identity: &str) -> MessageSender {
        MessageSender::new(
            identity,
            self.mailboxes.clone(),
            self.dispatcher.clone(),
            self.outbound.clone(),
        )
    }

    /// A `receive_messages` tool reading the mailbox of `identity`.
    pub fn receiver(&self, identity: &str) -> MessageReceiver {
        MessageReceiver::new(identity, self.mailboxes.clone())
    }

    pub fn mailboxes(&self) -> &Arc<MailboxRegistry> {
        &self.mailboxes
    }

    pub fn workers(&self) -> &Arc<WorkerRegistry> {
        &self.workers
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn outbound(&self) -> &Arc<OutboundLog> {
        &self.outbound
    }

    /// Unconsumed mail per known identity.
    pub fn shutdown_report(&self) -> ShutdownReport {
        ShutdownReport::collect(&self.mailboxes)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_DISPATCHES)
    }
}
