//! Command-line entry point for parley.

pub mod conversation;
pub mod scripted;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley_config::Config;
use tracing_subscriber::EnvFilter;

use conversation::{run_conversation, Cast, ConversationSummary, Mode};

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Run conversations between workers over in-process mailboxes")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scripted two-party conversation
    Converse {
        /// How workers pick up their mail
        #[arg(long, value_enum, default_value = "event")]
        mode: Mode,

        /// Name of the party that opens the conversation
        #[arg(long, default_value = "Alice")]
        initiator: String,

        /// Name of the party that answers
        #[arg(long, default_value = "Bob")]
        responder: String,

        /// Simulated thinking time per turn in milliseconds
        #[arg(long, default_value = "200")]
        think_ms: u64,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
    /// Print the messaging tool definitions as JSON
    Tools {
        /// Include the polling receive_messages tool
        #[arg(long)]
        with_receive: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config, cli.verbose)?;

    match cli.command {
        Command::Converse {
            mode,
            initiator,
            responder,
            think_ms,
        } => {
            if initiator == responder {
                anyhow::bail!("Initiator and responder must have different names");
            }
            let cast = Cast {
                initiator,
                responder,
                think_time: std::time::Duration::from_millis(think_ms),
                ..Cast::default()
            };
            println!(
                "🚀 Starting {:?} conversation: {} and {}",
                mode, cast.initiator, cast.responder
            );
            let summary = run_conversation(&config, mode, cast).await?;
            print_summary(&summary)?;
        }
        Command::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
        Command::Tools { with_receive } => {
            let tools = parley_core::messaging_tools(with_receive);
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
    }
    Ok(())
}

fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&config.logging.filter)
                .with_context(|| format!("Invalid log filter '{}'", config.logging.filter))?,
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_summary(summary: &ConversationSummary) -> Result<()> {
    println!();
    println!("🏁 Conversation finished");
    println!(
        "   {} lines sent by the initiator, {} by the responder",
        summary.initiator_transcript.len(),
        summary.responder_transcript.len()
    );
    println!("📊 Dispatch: {}", serde_json::to_string(&summary.stats)?);
    println!();
    println!("📋 Remaining mail:");
    print!("{}", summary.report);
    Ok(())
}
