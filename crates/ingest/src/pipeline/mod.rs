//! Ticket ingestion pipeline
//!
//! Two triggers feed one engine. Push notifications carry a history cursor
//! for incremental catch-up; the periodic sweep scans a window of unread
//! mail as the safety net. Both reduce every fetched message to the same
//! append-or-create operation in [`engine`].

mod cron;
mod engine;
mod webhook;

pub use cron::{IntegrationOutcome, MAX_MESSAGES_PER_SWEEP, SweepOutcome, run_sweep};
pub use engine::{IngestOutcome, IngestStats, SkipReason};
pub use webhook::{Notification, WebhookOutcome, WebhookStatus, process_notification};
