//! Lifecycle of one worker in a conversation.
//!
//! A driver registers its worker, runs the initial turn, then either idles
//! for a bounded time (nudging a silent initiator once) or runs a fixed
//! number of check-and-respond steps. It unregisters when done; mail still
//! queued at that point stays in the mailbox for the shutdown report.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatcher::run_turn;
use crate::error::{MessagingError, Result};
use crate::hub::Hub;
use crate::message::format_delivery;
use crate::worker::{Admission, AdmissionGuard, Worker};

/// Timing and role of a driver.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Upper bound on the idle phase.
    pub max_duration: Duration,
    /// Sleep between idle checks.
    pub poll_interval: Duration,
    /// Idle time after which a silent initiator is nudged.
    pub nudge_grace: Duration,
    /// Whether this worker is expected to open the conversation.
    pub initiator: bool,
    /// Identity of the other party, used in reminder texts.
    pub peer: Option<String>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            nudge_grace: Duration::from_secs(10),
            initiator: false,
            peer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unregistered,
    Idle,
    Running,
    Finished,
}

pub struct ConversationDriver {
    identity: String,
    worker: Arc<dyn Worker>,
    hub: Hub,
    settings: DriverSettings,
    state: DriverState,
    nudged: bool,
}

impl ConversationDriver {
    pub fn new(
        identity: impl Into<String>,
        worker: Arc<dyn Worker>,
        hub: Hub,
        settings: DriverSettings,
    ) -> Self {
        Self {
            identity: identity.into(),
            worker,
            hub,
            settings,
            state: DriverState::Unregistered,
            nudged: false,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Current lifecycle state. A registered worker reads as `Running`
    /// while any turn holds it, including turns started by the dispatcher.
    pub fn state(&self) -> DriverState {
        if self.state == DriverState::Idle && self.hub.workers().is_busy(&self.identity) {
            return DriverState::Running;
        }
        self.state
    }

    pub fn has_nudged(&self) -> bool {
        self.nudged
    }

    /// Register the worker and run its initial turn.
    ///
    /// Only registration problems are returned; a failing initial turn is
    /// logged and the conversation carries on.
    pub async fn start(&mut self, initial_text: &str) -> Result<()> {
        self.hub.mailboxes().get_or_create(&self.identity)?;
        let guard = self
            .hub
            .workers()
            .register_admitted(&self.identity, self.worker.clone())?;

        info!(identity = %self.identity, "Starting conversation");
        self.run_admitted(guard, vec![initial_text.to_string()]).await;
        Ok(())
    }

    /// Stay registered for up to `max_duration`, nudging once if this
    /// worker is the initiator and has not sent anything within the grace
    /// period.
    ///
    /// Exits when the duration elapses even if a dispatched turn is still
    /// running; that turn is not interrupted.
    pub async fn idle(&mut self) {
        let started = Instant::now();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.settings.max_duration {
                break;
            }
            let remaining = self.settings.max_duration - elapsed;
            tokio::time::sleep(self.settings.poll_interval.min(remaining)).await;

            if self.should_nudge(started.elapsed()) {
                self.nudge().await;
            }
        }
        debug!(identity = %self.identity, "Idle period elapsed");
    }

    /// Run `steps` rounds of: collect own mail, prompt to continue, run.
    pub async fn run_steps(&mut self, steps: usize, pause: Duration) -> Result<()> {
        for step in 1..=steps {
            info!(identity = %self.identity, step, "Checking for messages and responding");
            let guard = self.admit().await?;

            let mut inputs = Vec::new();
            match self.hub.mailboxes().drain_all(&self.identity) {
                Ok(messages) if !messages.is_empty() => inputs.push(format_delivery(&messages)),
                Ok(_) => {}
                Err(e) => warn!(identity = %self.identity, error = %e, "Could not collect mail"),
            }
            inputs.push(self.continue_text());
            self.run_admitted(guard, inputs).await;

            tokio::time::sleep(pause).await;
        }
        Ok(())
    }

    /// Unregister the worker. Remaining mail is left queued.
    pub fn finish(&mut self) -> Result<()> {
        if self.state == DriverState::Finished {
            return Ok(());
        }
        self.hub.workers().unregister(&self.identity)?;
        self.state = DriverState::Finished;

        let pending = self
            .hub
            .mailboxes()
            .get_or_create(&self.identity)
            .map(|mb| mb.len())
            .unwrap_or(0);
        if pending > 0 {
            info!(
                identity = %self.identity,
                count = pending,
                "Conversation finished with mail still queued"
            );
        } else {
            info!(identity = %self.identity, "Conversation finished");
        }
        Ok(())
    }

    /// `start`, `idle`, then `finish`.
    pub async fn run_idle(&mut self, initial_text: &str) -> Result<()> {
        self.start(initial_text).await?;
        self.idle().await;
        self.finish()
    }

    /// `start`, `run_steps`, then `finish`.
    pub async fn run_stepped(
        &mut self,
        initial_text: &str,
        steps: usize,
        pause: Duration,
    ) -> Result<()> {
        self.start(initial_text).await?;
        let stepped = self.run_steps(steps, pause).await;
        let finished = self.finish();
        stepped.and(finished)
    }

    fn should_nudge(&self, idle_for: Duration) -> bool {
        self.settings.initiator
            && !self.nudged
            && idle_for >= self.settings.nudge_grace
            && self.hub.outbound().sent_by(&self.identity) == 0
    }

    async fn nudge(&mut self) {
        match self.hub.workers().try_admit(&self.identity) {
            Ok(Admission::Admitted(guard)) => {
                self.nudged = true;
                info!(identity = %self.identity, "Nudging silent initiator");
                let nudge = self.nudge_text();
                self.run_admitted(guard, vec![nudge]).await;
            }
            // Dispatcher holds the worker; try again next tick.
            Ok(Admission::Busy) => {}
            Ok(Admission::Unregistered) => {
                warn!(identity = %self.identity, "Cannot nudge an unregistered worker");
                self.nudged = true;
            }
            Err(e) => warn!(identity = %self.identity, error = %e, "Nudge admission failed"),
        }
    }

    async fn admit(&self) -> Result<AdmissionGuard> {
        loop {
            match self.hub.workers().try_admit(&self.identity)? {
                Admission::Admitted(guard) => return Ok(guard),
                Admission::Busy => tokio::time::sleep(self.settings.poll_interval).await,
                Admission::Unregistered => {
                    return Err(MessagingError::NotRegistered(self.identity.clone()))
                }
            }
        }
    }

    async fn run_admitted(&mut self, guard: AdmissionGuard, inputs: Vec<String>) {
        self.state = DriverState::Running;
        let result = run_turn(&self.identity, self.worker.clone(), inputs).await;
        let missed = guard.release();
        self.state = DriverState::Idle;

        if let Err(e) = result {
            warn!(identity = %self.identity, error = %e, "Turn failed");
        }

        // Mail that arrived mid-turn was deduplicated by the dispatcher.
        if missed && self.hub.mailboxes().has_pending(&self.identity) {
            if let Err(e) = self.hub.dispatcher().notify(&self.identity) {
                warn!(identity = %self.identity, error = %e, "Re-notify failed");
            }
        }
    }

    fn peer_label(&self) -> &str {
        self.settings.peer.as_deref().unwrap_or("the other party")
    }

    fn nudge_text(&self) -> String {
        match &self.settings.peer {
            Some(peer) => format!(
                "You have not sent a message to {peer} yet. Please message {peer} now using the send_message tool with recipient_id set to '{peer}'."
            ),
            None => "You have not sent any messages yet. Please message the other party now using the send_message tool.".to_string(),
        }
    }

    fn continue_text(&self) -> String {
        let peer = self.peer_label();
        format!(
            "Please continue your conversation with {peer}. If you want to send a message, use the send_message tool with recipient_id set to '{peer}'."
        )
    }
}
