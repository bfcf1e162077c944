//! A deterministic worker that stands in for a model-backed agent.
//!
//! It answers every batch of mail with the next line of its script, issuing
//! the same `send_message` tool call a model would.

use async_trait::async_trait;
use parley_core::{MessageSender, SendMessageResponse, Worker};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const MAIL_PREFIX: &str = "You have received ";
const NUDGE_PREFIX: &str = "You have not sent";

pub struct ScriptedWorker {
    sender: MessageSender,
    peer: String,
    opener: bool,
    think_time: Duration,
    script: Mutex<VecDeque<String>>,
    inbox: Mutex<Vec<String>>,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new(
        sender: MessageSender,
        peer: impl Into<String>,
        opener: bool,
        script: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            sender,
            peer: peer.into(),
            opener,
            think_time: Duration::ZERO,
            script: Mutex::new(script.into_iter().collect()),
            inbox: Mutex::new(Vec::new()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Simulated latency of each turn.
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    /// Lines this worker sent, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn next_line(&self) -> Option<String> {
        self.script.lock().ok()?.pop_front()
    }

    fn say(&self, line: String) -> SendMessageResponse {
        let response = self.sender.execute(&json!({
            "recipient_id": self.peer,
            "message": line,
        }));
        if response.success {
            println!("💬 {} → {}: {}", self.sender.identity(), self.peer, line);
            if let Ok(mut transcript) = self.transcript.lock() {
                transcript.push(line);
            }
        }
        response
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn deliver(&self, text: &str) {
        if let Ok(mut inbox) = self.inbox.lock() {
            inbox.push(text.to_string());
        }
    }

    async fn run_to_completion(&self) -> anyhow::Result<()> {
        let pending = match self.inbox.lock() {
            Ok(mut inbox) => std::mem::take(&mut *inbox),
            Err(_) => anyhow::bail!("inbox lock poisoned"),
        };
        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }

        let first_turn = self.transcript.lock().map(|t| t.is_empty()).unwrap_or(false);
        let got_mail = pending.iter().any(|t| t.starts_with(MAIL_PREFIX));
        let nudged = pending.iter().any(|t| t.starts_with(NUDGE_PREFIX));
        let should_speak = got_mail || (self.opener && first_turn) || nudged;

        if !should_speak {
            debug!(identity = %self.sender.identity(), "Nothing to answer");
            return Ok(());
        }
        match self.next_line() {
            Some(line) => {
                let response = self.say(line);
                if !response.success {
                    anyhow::bail!(response.message);
                }
            }
            None => info!(identity = %self.sender.identity(), "Script exhausted"),
        }
        Ok(())
    }
}
