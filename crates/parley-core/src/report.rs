//! Diagnostic listing of mail nobody consumed.

use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::mailbox::MailboxRegistry;

/// Pending mail for one identity at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxStatus {
    pub identity: String,
    /// Annotated messages, oldest first.
    pub unread: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub mailboxes: Vec<MailboxStatus>,
}

impl ShutdownReport {
    /// Snapshot every mailbox without consuming anything.
    pub fn collect(mailboxes: &MailboxRegistry) -> Self {
        let pending = match mailboxes.pending() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not collect pending mail");
                return Self::default();
            }
        };
        Self {
            mailboxes: pending
                .into_iter()
                .map(|(identity, messages)| MailboxStatus {
                    identity,
                    unread: messages.iter().map(|m| m.annotated()).collect(),
                })
                .collect(),
        }
    }

    pub fn total_unread(&self) -> usize {
        self.mailboxes.iter().map(|m| m.unread.len()).sum()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for status in &self.mailboxes {
            if status.unread.is_empty() {
                writeln!(f, "📭 {} has no unread messages", status.identity)?;
            } else {
                writeln!(
                    f,
                    "📬 {} has {} unread messages:",
                    status.identity,
                    status.unread.len()
                )?;
                for msg in &status.unread {
                    writeln!(f, "   • {}", msg)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn test_report_lists_unread_without_draining() {
        let mailboxes = MailboxRegistry::new();
        mailboxes.enqueue("Bob", Message::new("Alice", "hi")).unwrap();
        mailboxes.get_or_create("Alice").unwrap();

        let report = ShutdownReport::collect(&mailboxes);
        assert_eq!(report.total_unread(), 1);
        assert_eq!(
            report.to_string(),
            "📭 Alice has no unread messages\n📬 Bob has 1 unread messages:\n   • [From Alice]: hi\n"
        );
        assert!(mailboxes.has_pending("Bob"));
    }

    #[test]
    fn test_empty_report() {
        let report = ShutdownReport::collect(&MailboxRegistry::new());
        assert_eq!(report.total_unread(), 0);
        assert_eq!(report.to_string(), "");
    }
}
