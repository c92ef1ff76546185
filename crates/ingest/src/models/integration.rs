//! Mail integration model binding a tenant to a Gmail mailbox

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TicketPriority;

/// A per-tenant connection to a Gmail mailbox.
///
/// Holds the OAuth material needed to call the provider on behalf of the
/// mailbox, plus the two sync checkpoints: `last_history_id` for the
/// incremental (webhook) path and `last_sync_at` for the windowed (cron)
/// path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailIntegration {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Owning tenant
    pub company_id: i64,
    /// Email address of the connected inbox (unique)
    pub mailbox: String,
    /// Short-lived OAuth access token, if one has been minted
    pub access_token: Option<String>,
    /// Long-lived OAuth refresh token
    pub refresh_token: Option<String>,
    /// When the access token stops being usable
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Provider history cursor; everything up to here has been ingested
    pub last_history_id: Option<String>,
    /// End of the last completed cron sweep window
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Whether the periodic sweep should pick this integration up
    pub auto_sync_enabled: bool,
    /// Whether inbound mail may open new tickets
    pub auto_create_tickets: bool,
    /// Priority stamped onto tickets this integration opens
    pub default_priority: TicketPriority,
    /// Soft-delete / pause flag
    pub is_active: bool,
}

impl MailIntegration {
    /// Create a new integration (id will be assigned by database)
    pub fn new(company_id: i64, mailbox: impl Into<String>) -> Self {
        Self {
            id: 0, // Will be set by database
            company_id,
            mailbox: mailbox.into(),
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            last_history_id: None,
            last_sync_at: None,
            auto_sync_enabled: true,
            auto_create_tickets: true,
            default_priority: TicketPriority::default(),
            is_active: true,
        }
    }

    /// Set the OAuth token pair
    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the access token expiry
    pub fn with_token_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.token_expires_at = Some(expires_at);
        self
    }

    /// Set the history checkpoint
    pub fn with_history_id(mut self, history_id: impl Into<String>) -> Self {
        self.last_history_id = Some(history_id.into());
        self
    }

    /// Set the cron sweep checkpoint
    pub fn with_last_sync(mut self, at: DateTime<Utc>) -> Self {
        self.last_sync_at = Some(at);
        self
    }

    /// Set the priority for auto-created tickets
    pub fn with_default_priority(mut self, priority: TicketPriority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Disable automatic ticket creation for unmatched threads
    pub fn with_auto_create(mut self, enabled: bool) -> Self {
        self.auto_create_tickets = enabled;
        self
    }

    /// Enable or disable the periodic sweep
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync_enabled = enabled;
        self
    }

    /// Pause or resume the integration
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}
