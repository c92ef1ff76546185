//! Sync checkpoint management
//!
//! Each integration carries two checkpoints: `last_history_id` for the
//! incremental webhook path and `last_sync_at` for the windowed cron path.
//! A checkpoint advances exactly once per run, after every message in the
//! batch has been attempted; replayed messages are absorbed by the
//! per-tenant ingestion markers.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::models::MailIntegration;
use crate::storage::HelpdeskStore;

/// Sweep window for integrations that have never completed a pass
const DEFAULT_WINDOW_HOURS: i64 = 1;

/// Start of the cron sweep window: the last completed sweep time, or one
/// hour before `now` on a first run.
pub fn window_start(integration: &MailIntegration, now: DateTime<Utc>) -> DateTime<Utc> {
    integration
        .last_sync_at
        .unwrap_or_else(|| now - Duration::hours(DEFAULT_WINDOW_HOURS))
}

/// Checkpoint operations scoped to one integration
pub struct Checkpoint<'a> {
    store: &'a dyn HelpdeskStore,
    integration_id: i64,
}

impl<'a> Checkpoint<'a> {
    pub fn for_integration(store: &'a dyn HelpdeskStore, integration: &MailIntegration) -> Self {
        Self {
            store,
            integration_id: integration.id,
        }
    }

    /// Advance the history cursor
    pub fn advance_history(&self, history_id: &str) -> Result<()> {
        self.store
            .advance_history_id(self.integration_id, history_id)
    }

    /// Advance the sweep window end
    pub fn advance_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.store.advance_last_sync(self.integration_id, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_uses_last_sync() {
        let now = Utc::now();
        let last = now - Duration::minutes(10);
        let integration = MailIntegration::new(1, "support@acme.test").with_last_sync(last);
        assert_eq!(window_start(&integration, now), last);
    }

    #[test]
    fn test_window_start_defaults_to_one_hour() {
        let now = Utc::now();
        let integration = MailIntegration::new(1, "support@acme.test");
        assert_eq!(window_start(&integration, now), now - Duration::hours(1));
    }
}
