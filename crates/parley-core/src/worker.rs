//! Worker boundary and the registry of currently driven workers.
//!
//! The busy flag on each [`WorkerHandle`] is the single admission gate that
//! keeps two turns from running on the same worker at once. It is only ever
//! read or written under the registry lock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::{MessagingError, Result};

/// A conversational worker driven by the dispatcher and its driver.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Queue `text` as the next conversational input. Must not block.
    fn deliver(&self, text: &str);

    /// Run turns until the worker considers itself idle.
    ///
    /// May send messages to other workers while running.
    async fn run_to_completion(&self) -> anyhow::Result<()>;
}

/// Registry entry for one driven worker.
pub struct WorkerHandle {
    worker: Arc<dyn Worker>,
    busy: bool,
    /// A mail notify was turned away while busy.
    missed_notify: bool,
    /// Distinguishes this registration from earlier ones under the same identity.
    generation: u64,
}

impl WorkerHandle {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            worker,
            busy: false,
            missed_notify: false,
            generation: 0,
        }
    }

    pub fn worker(&self) -> Arc<dyn Worker> {
        self.worker.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

/// Result of trying to admit a worker for a turn.
pub enum Admission {
    /// The busy flag was clear and is now set; the caller owns the turn.
    Admitted(AdmissionGuard),
    /// Another turn is in progress.
    Busy,
    /// No worker is registered under the identity.
    Unregistered,
}

/// Identity to handle mapping for workers currently driven by a conversation.
#[derive(Default)]
pub struct WorkerRegistry {
    handles: Mutex<HashMap<String, WorkerHandle>>,
    next_generation: AtomicU64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `worker` idle under `identity`.
    pub fn register(&self, identity: &str, worker: Arc<dyn Worker>) -> Result<()> {
        self.insert(identity, WorkerHandle::new(worker)).map(|_| ())
    }

    /// Register `worker` and admit it in one step.
    ///
    /// Used by drivers for the initial turn so that no dispatch can slip in
    /// between registration and the start of that turn.
    pub fn register_admitted(
        self: &Arc<Self>,
        identity: &str,
        worker: Arc<dyn Worker>,
    ) -> Result<AdmissionGuard> {
        let mut handle = WorkerHandle::new(worker.clone());
        handle.busy = true;
        let generation = self.insert(identity, handle)?;
        Ok(AdmissionGuard::new(self.clone(), identity, worker, generation))
    }

    fn insert(&self, identity: &str, mut handle: WorkerHandle) -> Result<u64> {
        if identity.is_empty() {
            return Err(MessagingError::EmptyIdentity);
        }
        let mut handles = self.lock()?;
        if handles.contains_key(identity) {
            return Err(MessagingError::AlreadyRegistered(identity.to_string()));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        handle.generation = generation;
        handles.insert(identity.to_string(), handle);
        info!(identity, generation, "Registered worker");
        Ok(generation)
    }

    /// Remove the handle for `identity`. Pending mail stays in its mailbox.
    pub fn unregister(&self, identity: &str) -> Result<()> {
        let mut handles = self.lock()?;
        match handles.remove(identity) {
            Some(_) => {
                info!(identity, "Unregistered worker");
                Ok(())
            }
            None => Err(MessagingError::NotRegistered(identity.to_string())),
        }
    }

    /// Test-and-set the busy flag for `identity`.
    pub fn try_admit(self: &Arc<Self>, identity: &str) -> Result<Admission> {
        self.admit(identity, false)
    }

    /// Like [`try_admit`](Self::try_admit), but a refusal is remembered so
    /// that the current turn's owner learns about it on release.
    pub fn try_admit_for_mail(self: &Arc<Self>, identity: &str) -> Result<Admission> {
        self.admit(identity, true)
    }

    fn admit(self: &Arc<Self>, identity: &str, mark_missed: bool) -> Result<Admission> {
        let mut handles = self.lock()?;
        let Some(handle) = handles.get_mut(identity) else {
            return Ok(Admission::Unregistered);
        };
        if handle.busy {
            if mark_missed {
                handle.missed_notify = true;
            }
            return Ok(Admission::Busy);
        }
        handle.busy = true;
        debug!(identity, "Admitted worker");
        Ok(Admission::Admitted(AdmissionGuard::new(
            self.clone(),
            identity,
            handle.worker.clone(),
            handle.generation,
        )))
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.lock().map(|h| h.contains_key(identity)).unwrap_or(false)
    }

    pub fn is_busy(&self, identity: &str) -> bool {
        self.lock()
            .ok()
            .and_then(|h| h.get(identity).map(WorkerHandle::is_busy))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, WorkerHandle>>> {
        self.handles
            .lock()
            .map_err(|_| MessagingError::LockPoisoned("worker registry"))
    }

    /// Clear the busy flag; returns whether a mail notify was missed.
    fn release(&self, identity: &str, generation: u64) -> bool {
        // A poisoned lock must not leave the flag stuck.
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        // Only the registration this guard admitted; a later one under the
        // same identity, even with the same worker, keeps its own flag.
        if let Some(handle) = handles
            .get_mut(identity)
            .filter(|h| h.generation == generation)
        {
            handle.busy = false;
            debug!(identity, "Released worker");
            return std::mem::take(&mut handle.missed_notify);
        }
        false
    }
}

/// Ownership of one admitted turn. Dropping it clears the busy flag.
pub struct AdmissionGuard {
    registry: Arc<WorkerRegistry>,
    identity: String,
    worker: Arc<dyn Worker>,
    generation: u64,
    released: bool,
}

impl AdmissionGuard {
    fn new(
        registry: Arc<WorkerRegistry>,
        identity: &str,
        worker: Arc<dyn Worker>,
        generation: u64,
    ) -> Self {
        Self {
            registry,
            identity: identity.to_string(),
            worker,
            generation,
            released: false,
        }
    }

    /// Clear the busy flag now. Returns `true` if a mail notify was turned
    /// away during the turn.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.registry.release(&self.identity, self.generation)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn worker(&self) -> Arc<dyn Worker> {
        self.worker.clone()
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release(&self.identity, self.generation);
        }
    }
}
