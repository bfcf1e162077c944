//! Test workers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parley_core::{MessageSender, SendMessageRequest, Worker};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records everything delivered and how many runs overlapped.
#[derive(Default)]
pub struct RecordingWorker {
    pub delivered: Mutex<Vec<String>>,
    pub run_delay: Duration,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub runs: AtomicUsize,
    pub fail_next: AtomicBool,
    pub panic_next: AtomicBool,
    pub panic_on_deliver: AtomicBool,
}

impl RecordingWorker {
    pub fn with_delay(run_delay: Duration) -> Self {
        Self {
            run_delay,
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for RecordingWorker {
    fn deliver(&self, text: &str) {
        if self.panic_on_deliver.swap(false, Ordering::SeqCst) {
            panic!("garbled input");
        }
        self.delivered.lock().unwrap().push(text.to_string());
    }

    async fn run_to_completion(&self) -> anyhow::Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("worker exploded");
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("model unavailable");
        }
        Ok(())
    }
}

/// Replies to every delivered batch until it runs out of replies.
pub struct PingPongWorker {
    sender: MessageSender,
    peer: String,
    opener: bool,
    replies_left: AtomicUsize,
    inbox: Mutex<Vec<String>>,
    started: AtomicBool,
    pub received: AtomicUsize,
}

impl PingPongWorker {
    pub fn new(sender: MessageSender, peer: &str, opener: bool, replies: usize) -> Self {
        Self {
            sender,
            peer: peer.to_string(),
            opener,
            replies_left: AtomicUsize::new(replies),
            inbox: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            received: AtomicUsize::new(0),
        }
    }

    fn reply(&self, text: &str) {
        let left = self.replies_left.load(Ordering::SeqCst);
        if left == 0 {
            return;
        }
        self.replies_left.store(left - 1, Ordering::SeqCst);
        let response = self
            .sender
            .send(&SendMessageRequest::new(self.peer.clone(), text));
        assert!(response.success, "{}", response.message);
    }
}

#[async_trait]
impl Worker for PingPongWorker {
    fn deliver(&self, text: &str) {
        self.inbox.lock().unwrap().push(text.to_string());
    }

    async fn run_to_completion(&self) -> anyhow::Result<()> {
        let pending: Vec<String> = std::mem::take(&mut *self.inbox.lock().unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;

        if !self.started.swap(true, Ordering::SeqCst) {
            if self.opener {
                self.reply("hello");
            }
            return Ok(());
        }
        for text in pending {
            if let Some(count) = received_count(&text) {
                self.received.fetch_add(count, Ordering::SeqCst);
                self.reply("got it");
            }
        }
        Ok(())
    }
}

/// Number of messages announced in a delivery text, if it is one.
pub fn received_count(text: &str) -> Option<usize> {
    let rest = text.strip_prefix("You have received ")?;
    let (count, _) = rest.split_once(' ')?;
    count.parse().ok()
}
