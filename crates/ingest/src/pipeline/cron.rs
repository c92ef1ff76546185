//! Scheduled sweep ingestion
//!
//! The sweep is the safety net behind push notifications: every run scans
//! each syncing integration's unread mail over a bounded window, so
//! anything a dropped notification missed is picked up within one period.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::engine::{IngestStats, Ingestor};
use crate::checkpoint::{self, Checkpoint};
use crate::models::MailIntegration;
use crate::outbound::Mailer;
use crate::source::MailSource;
use crate::storage::HelpdeskStore;

/// Cap on messages pulled per integration per sweep
pub const MAX_MESSAGES_PER_SWEEP: usize = 100;

/// Per-integration result of one sweep
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationOutcome {
    pub company_id: i64,
    pub success: bool,
    pub messages_processed: usize,
    pub tickets_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a whole sweep across every syncing integration
#[derive(Debug, Serialize)]
pub struct SweepOutcome {
    pub processed: usize,
    pub results: Vec<IntegrationOutcome>,
}

/// Sweep every active integration with auto-sync and auto-creation enabled.
///
/// One integration's failure never blocks the others; it is reported in
/// that integration's outcome and the sweep moves on.
pub fn run_sweep<F>(
    store: &dyn HelpdeskStore,
    mailer: &dyn Mailer,
    now: DateTime<Utc>,
    connect: F,
) -> Result<SweepOutcome>
where
    F: Fn(&MailIntegration) -> Result<Box<dyn MailSource>>,
{
    let integrations = store.integrations_for_sweep()?;
    log::info!("Sweeping {} mail integrations", integrations.len());

    let mut results = Vec::with_capacity(integrations.len());
    for integration in &integrations {
        match sweep_integration(store, mailer, integration, now, &connect) {
            Ok(stats) => {
                results.push(IntegrationOutcome {
                    company_id: integration.company_id,
                    success: true,
                    messages_processed: stats.messages_seen,
                    tickets_created: stats.tickets_created,
                    error: None,
                });
            }
            Err(e) => {
                log::error!(
                    "Sweep failed for {} (company {}): {:#}",
                    integration.mailbox,
                    integration.company_id,
                    e
                );
                results.push(IntegrationOutcome {
                    company_id: integration.company_id,
                    success: false,
                    messages_processed: 0,
                    tickets_created: 0,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }

    Ok(SweepOutcome {
        processed: results.len(),
        results,
    })
}

/// Sweep one integration's unread window.
fn sweep_integration<F>(
    store: &dyn HelpdeskStore,
    mailer: &dyn Mailer,
    integration: &MailIntegration,
    now: DateTime<Utc>,
    connect: &F,
) -> Result<IngestStats>
where
    F: Fn(&MailIntegration) -> Result<Box<dyn MailSource>>,
{
    let source = connect(integration)?;
    let since = checkpoint::window_start(integration, now);
    let unread = source.unread_messages(since, MAX_MESSAGES_PER_SWEEP)?;

    log::info!(
        "{}: {} unread messages since {}",
        integration.mailbox,
        unread.len(),
        since
    );

    let ingestor = Ingestor::new(store, mailer, integration)?;
    let mut stats = IngestStats::default();

    for message_ref in &unread {
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

    // The window advances once per pass, even when some messages failed;
    // the idempotent writes absorb any retry overlap
    Checkpoint::for_integration(store, integration).advance_sync_time(now)?;

    Ok(stats)
}
