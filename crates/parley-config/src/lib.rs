//! Configuration for the parley messaging runtime.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `PARLEY__SECTION__KEY` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default bound on concurrently running dispatch tasks.
pub const DEFAULT_MAX_CONCURRENT_DISPATCHES: usize = 8;

/// Prefix of environment overrides, e.g. `PARLEY__LOGGING__FILTER`.
pub const ENV_PREFIX: &str = "PARLEY";

const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Dispatch tasks allowed to run at once across all identities.
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,
}

fn default_max_concurrent_dispatches() -> usize { DEFAULT_MAX_CONCURRENT_DISPATCHES }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: DEFAULT_MAX_CONCURRENT_DISPATCHES,
        }
    }
}

/// Timing of a two-party conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// How long each participant stays registered after its first turn (milliseconds).
    #[serde(default = "default_max_duration")]
    pub max_duration_ms: u64,

    /// Sleep between idle checks (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Silence after which the initiator is reminded to speak (milliseconds).
    #[serde(default = "default_nudge_grace")]
    pub nudge_grace_ms: u64,

    /// Check-and-respond rounds in stepped mode.
    #[serde(default = "default_stepped_turns")]
    pub stepped_turns: usize,

    /// Pause between stepped rounds (milliseconds).
    #[serde(default = "default_step_pause")]
    pub step_pause_ms: u64,

    /// Delay before the responder starts in stepped mode (milliseconds).
    #[serde(default = "default_head_start")]
    pub initiator_head_start_ms: u64,
}

fn default_max_duration() -> u64 { 60_000 }
fn default_poll_interval() -> u64 { 500 }
fn default_nudge_grace() -> u64 { 10_000 }
fn default_stepped_turns() -> usize { 4 }
fn default_step_pause() -> u64 { 2_000 }
fn default_head_start() -> u64 { 3_000 }

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: default_max_duration(),
            poll_interval_ms: default_poll_interval(),
            nudge_grace_ms: default_nudge_grace(),
            stepped_turns: default_stepped_turns(),
            step_pause_ms: default_step_pause(),
            initiator_head_start_ms: default_head_start(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

/// A configuration that parsed but cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("dispatch.max_concurrent_dispatches must be at least 1")]
    NoDispatchPermits,

    #[error("conversation.poll_interval_ms must be at least 1")]
    ZeroPollInterval,

    #[error("conversation.poll_interval_ms ({poll}) exceeds conversation.max_duration_ms ({max})")]
    PollLongerThanConversation { poll: u64, max: u64 },
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// `None`. An explicit path must exist; the default one is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                let expanded = PathBuf::from(shellexpand::tilde(p).as_ref());
                if !expanded.exists() {
                    anyhow::bail!("Configuration file not found: {}", expanded.display());
                }
                Some((expanded, true))
            }
            None => Self::default_path().map(|p| (p, false)),
        };

        let mut builder = config::Config::builder();
        if let Some((file_path, required)) = &file {
            builder = builder.add_source(
                config::File::from(file_path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(*required),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let loaded: Config = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// `<config dir>/parley/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("parley").join("config.toml"))
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.dispatch.max_concurrent_dispatches == 0 {
            return Err(ValidationError::NoDispatchPermits);
        }
        let conv = &self.conversation;
        if conv.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroPollInterval);
        }
        if conv.poll_interval_ms > conv.max_duration_ms {
            return Err(ValidationError::PollLongerThanConversation {
                poll: conv.poll_interval_ms,
                max: conv.max_duration_ms,
            });
        }
        Ok(())
    }

    /// The effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
