//! Push-notification driven ingestion
//!
//! Gmail publishes a `{emailAddress, historyId}` notification whenever the
//! watched mailbox changes. The notification carries no message content;
//! it tells us where the mailbox history is now, and we list everything
//! added since the cursor we stored last time.

use anyhow::Result;

use super::engine::{IngestStats, Ingestor};
use crate::checkpoint::Checkpoint;
use crate::gmail::HistoryExpiredError;
use crate::models::MailIntegration;
use crate::outbound::Mailer;
use crate::source::MailSource;
use crate::storage::HelpdeskStore;

/// Parsed Gmail push notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Mailbox the notification is about
    pub mailbox: String,
    /// Mailbox history position at the time of the notification
    pub history_id: String,
}

/// Status tag reported back to the push endpoint caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    /// No active integration for the mailbox
    Ignored,
    /// Nothing new to ingest; the checkpoint may still have moved
    NoChanges,
    /// At least one new message was handled
    Processed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::Ignored => "ignored",
            WebhookStatus::NoChanges => "no_changes",
            WebhookStatus::Processed => "processed",
        }
    }
}

/// Outcome of processing one push notification
#[derive(Debug)]
pub struct WebhookOutcome {
    pub status: WebhookStatus,
    pub stats: IngestStats,
}

impl WebhookOutcome {
    fn ignored() -> Self {
        WebhookOutcome {
            status: WebhookStatus::Ignored,
            stats: IngestStats::default(),
        }
    }

    fn no_changes(stats: IngestStats) -> Self {
        WebhookOutcome {
            status: WebhookStatus::NoChanges,
            stats,
        }
    }
}

/// Process one Gmail push notification.
///
/// `connect` builds the [`MailSource`] for the integration; production
/// passes a Gmail connector, tests pass fakes. The stored history cursor
/// advances to the notification's position exactly once, after every new
/// message has been attempted, so a crash mid-batch replays the whole
/// batch and the idempotent writes absorb the repeats.
pub fn process_notification<F>(
    store: &dyn HelpdeskStore,
    mailer: &dyn Mailer,
    notification: &Notification,
    connect: F,
) -> Result<WebhookOutcome>
where
    F: FnOnce(&MailIntegration) -> Result<Box<dyn MailSource>>,
{
    let Some(integration) = store.integration_by_mailbox(&notification.mailbox)? else {
        log::info!(
            "Ignoring notification for unknown mailbox {}",
            notification.mailbox
        );
        return Ok(WebhookOutcome::ignored());
    };

    if !integration.is_active || !integration.auto_sync_enabled {
        log::info!(
            "Ignoring notification for paused integration {}",
            integration.mailbox
        );
        return Ok(WebhookOutcome::ignored());
    }

    let checkpoint = Checkpoint::for_integration(store, &integration);

    // First notification for this mailbox: adopt its cursor and wait for
    // the next push. The periodic sweep covers anything that came before.
    let Some(start_history_id) = integration.last_history_id.clone() else {
        checkpoint.advance_history(&notification.history_id)?;
        log::info!(
            "Seeded history cursor for {} at {}",
            integration.mailbox,
            notification.history_id
        );
        return Ok(WebhookOutcome::no_changes(IngestStats::default()));
    };

    let source = connect(&integration)?;

    let added = match source.history_since(&start_history_id) {
        Ok(added) => added,
        Err(e) if e.is::<HistoryExpiredError>() => {
            // Cursor fell out of the provider's retention window. Jump to
            // the notified position; the sweep backfills the gap.
            log::warn!(
                "History cursor {} expired for {}; advancing to {}",
                start_history_id,
                integration.mailbox,
                notification.history_id
            );
            checkpoint.advance_history(&notification.history_id)?;
            return Ok(WebhookOutcome::no_changes(IngestStats::default()));
        }
        Err(e) => return Err(e),
    };

    let ingestor = Ingestor::new(store, mailer, &integration)?;
    let mut stats = IngestStats::default();

    for message_ref in &added {
        match source
            .fetch_message(&message_ref.id)
            .and_then(|message| ingestor.ingest_message(&message))
        {
            Ok(outcome) => stats.record(&outcome),
            Err(e) => {
                log::warn!("Failed to ingest message {}: {:#}", message_ref.id, e);
                stats.record_error();
            }
        }
    }

    // One checkpoint write per run, after the whole batch was attempted
    checkpoint.advance_history(&notification.history_id)?;

    let status = if added.is_empty() {
        WebhookStatus::NoChanges
    } else {
        WebhookStatus::Processed
    };

    Ok(WebhookOutcome { status, stats })
}
