//! Provider abstraction consumed by the ingestion pipeline

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::gmail::api::{GmailMessage, MessageRef};

/// A mailbox the pipeline can pull messages from.
///
/// [`crate::GmailClient`] is the production implementation; tests substitute
/// scripted fakes so pipeline behavior can be exercised without a network.
pub trait MailSource {
    /// Messages added after the given history cursor, oldest first,
    /// deduplicated by provider message id.
    fn history_since(&self, start_history_id: &str) -> Result<Vec<MessageRef>>;

    /// Unread messages received after `since`, capped at `limit`.
    fn unread_messages(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MessageRef>>;

    /// Fetch one full message by provider id.
    fn fetch_message(&self, id: &str) -> Result<GmailMessage>;
}
