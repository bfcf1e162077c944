//! Parley Core - mailboxes and event-driven dispatch for conversational workers
//!
//! Independently running workers exchange text messages through per-identity
//! mailboxes. Sending a message wakes the recipient if it is idle; a busy
//! flag on each registered worker guarantees at most one active turn per
//! worker at a time.
//!
//! # Architecture
//!
//! - [`MailboxRegistry`]: identity to FIFO [`Mailbox`], created lazily
//! - [`WorkerRegistry`]: identity to [`WorkerHandle`] with its busy flag
//! - [`Dispatcher`]: admits idle workers and runs them on dispatch tasks
//! - [`MessageSender`] / [`MessageReceiver`]: the tools a worker calls
//! - [`ConversationDriver`]: registration, initial turn, idle/nudge or
//!   stepped loop, unregistration
//! - [`Hub`]: the shared services above, built once per process
//!
//! # Example
//!
//! ```no_run
//! use parley_core::{ConversationDriver, DriverSettings, Hub, Worker};
//! use std::sync::Arc;
//!
//! # async fn example(alice: Arc<dyn Worker>) -> parley_core::Result<()> {
//! let hub = Hub::default();
//! let settings = DriverSettings::default();
//! let mut driver = ConversationDriver::new("Alice", alice, hub.clone(), settings);
//! driver.run_idle("Introduce yourself to Bob.").await?;
//! print!("{}", hub.shutdown_report());
//! # Ok(())
//! # }
//! ```

pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod hub;
pub mod mailbox;
pub mod message;
pub mod receiver;
pub mod report;
pub mod sender;
pub mod tools;
pub mod worker;

pub use dispatcher::{DispatchSnapshot, Dispatcher, NotifyOutcome};
pub use driver::{ConversationDriver, DriverSettings, DriverState};
pub use error::{MessagingError, Result};
pub use hub::Hub;
pub use mailbox::{Mailbox, MailboxRegistry};
pub use message::{format_delivery, Message};
pub use receiver::{MessageReceiver, ReceiveMessagesRequest, ReceiveMessagesResponse};
pub use report::{MailboxStatus, ShutdownReport};
pub use sender::{MessageSender, OutboundLog, SendMessageRequest, SendMessageResponse};
pub use tools::{messaging_tools, ToolDefinition};
pub use worker::{Admission, AdmissionGuard, Worker, WorkerHandle, WorkerRegistry};
