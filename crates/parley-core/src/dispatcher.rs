//! Event-driven dispatch: wakes an idle worker when mail arrives for it.
//!
//! `notify` is a single-admission gate, not a queue. It test-and-sets the
//! recipient's busy flag and, on success, spawns one dispatch task that
//! drains the mailbox, delivers the batch and runs the worker. Mail that
//! shows up mid-turn is picked up by the same task before it releases
//! admission, or by a re-notify right after release.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::{MessagingError, Result};
use crate::mailbox::MailboxRegistry;
use crate::message::format_delivery;
use crate::worker::{Admission, AdmissionGuard, Worker, WorkerRegistry};

/// Default bound on dispatch tasks running at once across all identities.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 8;

/// What a single `notify` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// A dispatch task was spawned for the recipient.
    Admitted,
    /// The recipient is mid-turn; the mail waits for the next cycle.
    Busy,
    /// Nobody drives the recipient; the mail stays queued.
    Unregistered,
}

/// Running counters for dispatch activity.
#[derive(Debug, Default)]
pub struct DispatchStats {
    admitted: AtomicU64,
    deduplicated: AtomicU64,
    unregistered: AtomicU64,
    runs: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub admitted: u64,
    pub deduplicated: u64,
    pub unregistered: u64,
    pub runs: u64,
    pub failures: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decides whether to wake a notified worker now or leave its mail queued.
#[derive(Clone)]
pub struct Dispatcher {
    workers: Arc<WorkerRegistry>,
    mailboxes: Arc<MailboxRegistry>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        workers: Arc<WorkerRegistry>,
        mailboxes: Arc<MailboxRegistry>,
        max_concurrent_dispatches: usize,
    ) -> Self {
        Self {
            workers,
            mailboxes,
            permits: Arc::new(Semaphore::new(max_concurrent_dispatches.max(1))),
            tracker: TaskTracker::new(),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Signal that mail may be waiting for `identity`. Never blocks.
    pub fn notify(&self, identity: &str) -> Result<NotifyOutcome> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(MessagingError::NoRuntime);
        }

        match self.workers.try_admit_for_mail(identity)? {
            Admission::Unregistered => {
                DispatchStats::bump(&self.stats.unregistered);
                debug!(identity, "No worker registered, leaving mail queued");
                Ok(NotifyOutcome::Unregistered)
            }
            Admission::Busy => {
                DispatchStats::bump(&self.stats.deduplicated);
                debug!(identity, "Worker busy, notify deduplicated");
                Ok(NotifyOutcome::Busy)
            }
            Admission::Admitted(guard) => {
                DispatchStats::bump(&self.stats.admitted);
                let this = self.clone();
                self.tracker.spawn(this.dispatch(guard));
                Ok(NotifyOutcome::Admitted)
            }
        }
    }

    /// Wait until every spawned dispatch task, including ones spawned while
    /// waiting, has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    async fn dispatch(self, guard: AdmissionGuard) {
        let identity = guard.identity().to_string();
        let missed;
        {
            // The semaphore is never closed.
            let Ok(_permit) = self.permits.clone().acquire_owned().await else {
                return;
            };
            let worker = guard.worker();

            loop {
                let messages = match self.mailboxes.drain_all(&identity) {
                    Ok(messages) => messages,
                    Err(e) => {
                        DispatchStats::bump(&self.stats.failures);
                        warn!(identity = %identity, error = %e, "Dispatch failed to drain mailbox");
                        break;
                    }
                };
                if messages.is_empty() {
                    break;
                }

                debug!(identity = %identity, count = messages.len(), "Delivering mail");
                let delivery = vec![format_delivery(&messages)];
                DispatchStats::bump(&self.stats.runs);

                if let Err(e) = run_turn(&identity, worker.clone(), delivery).await {
                    DispatchStats::bump(&self.stats.failures);
                    warn!(identity = %identity, error = %e, "Dispatch failed");
                    break;
                }
            }

            missed = guard.release();
        }

        // Mail that landed between the last drain and the release saw a busy
        // worker and was not dispatched.
        if missed && self.mailboxes.has_pending(&identity) {
            debug!(identity = %identity, "Mail pending after release, re-notifying");
            if let Err(e) = self.notify(&identity) {
                warn!(identity = %identity, error = %e, "Re-notify failed");
            }
        }
    }
}

/// Deliver `inputs` and run one worker turn on a separate task, turning
/// errors and panics from either step into [`MessagingError`].
pub(crate) async fn run_turn(
    identity: &str,
    worker: Arc<dyn Worker>,
    inputs: Vec<String>,
) -> Result<()> {
    let turn = tokio::spawn(async move {
        for text in &inputs {
            worker.deliver(text);
        }
        worker.run_to_completion().await
    });
    match turn.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(MessagingError::WorkerFailed {
            identity: identity.to_string(),
            reason: format!("{:#}", e),
        }),
        Err(join_err) if join_err.is_panic() => Err(MessagingError::WorkerPanicked {
            identity: identity.to_string(),
        }),
        Err(join_err) => Err(MessagingError::WorkerFailed {
            identity: identity.to_string(),
            reason: join_err.to_string(),
        }),
    }
}
