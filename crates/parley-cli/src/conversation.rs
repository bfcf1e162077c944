//! Two-party conversation runner for the `converse` command.

use anyhow::{Context, Result};
use clap::ValueEnum;
use parley_config::{Config, ConversationConfig};
use parley_core::{ConversationDriver, DispatchSnapshot, DriverSettings, Hub, ShutdownReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::scripted::ScriptedWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Workers are woken by incoming mail.
    Event,
    /// Workers check their mailbox on a fixed schedule.
    Stepped,
}

/// Names and scripts of the two parties.
#[derive(Debug, Clone)]
pub struct Cast {
    pub initiator: String,
    pub responder: String,
    pub initiator_lines: Vec<String>,
    pub responder_lines: Vec<String>,
    pub think_time: Duration,
}

impl Default for Cast {
    fn default() -> Self {
        let lines = |items: &[&str]| -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        };
        Self {
            initiator: "Alice".to_string(),
            responder: "Bob".to_string(),
            initiator_lines: lines(&[
                "Hi Bob, I'm Alice. What kind of Python project should we plan together?",
                "A command-line todo app sounds good. Should we store tasks in JSON?",
                "Great, I'll sketch the data model and send it over.",
            ]),
            responder_lines: lines(&[
                "Hello Alice! How about a small command-line todo app?",
                "JSON works for me. I'll handle the argument parsing.",
                "Perfect, looking forward to it.",
            ]),
            think_time: Duration::from_millis(200),
        }
    }
}

/// What a finished conversation left behind.
#[derive(Debug)]
pub struct ConversationSummary {
    pub initiator_transcript: Vec<String>,
    pub responder_transcript: Vec<String>,
    pub stats: DispatchSnapshot,
    pub report: ShutdownReport,
}

pub fn driver_settings(conv: &ConversationConfig, initiator: bool, peer: &str) -> DriverSettings {
    DriverSettings {
        max_duration: Duration::from_millis(conv.max_duration_ms),
        poll_interval: Duration::from_millis(conv.poll_interval_ms),
        nudge_grace: Duration::from_millis(conv.nudge_grace_ms),
        initiator,
        peer: Some(peer.to_string()),
    }
}

fn intro(identity: &str, peer: &str, opener: bool) -> String {
    let task = if opener {
        format!("Start a conversation with {peer} about planning a simple Python project.")
    } else {
        format!("Wait for {peer} to contact you first, then respond.")
    };
    format!(
        "Hello! You are Agent {identity}. Use the send_message tool with recipient_id set to '{peer}' to talk to {peer}. {task}"
    )
}

pub async fn run_conversation(
    config: &Config,
    mode: Mode,
    cast: Cast,
) -> Result<ConversationSummary> {
    let hub = Hub::new(config.dispatch.max_concurrent_dispatches);
    let conv = &config.conversation;

    let initiator = Arc::new(
        ScriptedWorker::new(
            hub.sender(&cast.initiator),
            cast.responder.clone(),
            true,
            cast.initiator_lines,
        )
        .with_think_time(cast.think_time),
    );
    let responder = Arc::new(
        ScriptedWorker::new(
            hub.sender(&cast.responder),
            cast.initiator.clone(),
            false,
            cast.responder_lines,
        )
        .with_think_time(cast.think_time),
    );

    let mut initiator_driver = ConversationDriver::new(
        cast.initiator.clone(),
        initiator.clone(),
        hub.clone(),
        driver_settings(conv, true, &cast.responder),
    );
    let mut responder_driver = ConversationDriver::new(
        cast.responder.clone(),
        responder.clone(),
        hub.clone(),
        driver_settings(conv, false, &cast.initiator),
    );
    let initiator_intro = intro(&cast.initiator, &cast.responder, true);
    let responder_intro = intro(&cast.responder, &cast.initiator, false);

    info!(
        ?mode,
        initiator = %cast.initiator,
        responder = %cast.responder,
        "Starting conversation"
    );
    match mode {
        Mode::Event => {
            // The responder must be registered before the opening message
            // is sent; queued mail is not replayed on registration.
            responder_driver
                .start(&responder_intro)
                .await
                .context("Failed to start responder")?;
            initiator_driver
                .start(&initiator_intro)
                .await
                .context("Failed to start initiator")?;
            tokio::join!(initiator_driver.idle(), responder_driver.idle());
            hub.dispatcher().wait_idle().await;
            initiator_driver.finish()?;
            responder_driver.finish()?;
        }
        Mode::Stepped => {
            let steps = conv.stepped_turns;
            let pause = Duration::from_millis(conv.step_pause_ms);
            let head_start = Duration::from_millis(conv.initiator_head_start_ms);

            let initiator_run = initiator_driver.run_stepped(&initiator_intro, steps, pause);
            let responder_run = async {
                tokio::time::sleep(head_start).await;
                responder_driver.run_stepped(&responder_intro, steps, pause).await
            };
            let (a, b) = tokio::join!(initiator_run, responder_run);
            a.context("Initiator conversation failed")?;
            b.context("Responder conversation failed")?;
        }
    }

    Ok(ConversationSummary {
        initiator_transcript: initiator.transcript(),
        responder_transcript: responder.transcript(),
        stats: hub.dispatcher().stats(),
        report: hub.shutdown_report(),
    })
}
