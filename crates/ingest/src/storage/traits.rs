//! Storage trait definitions

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{
    Client, EmailThread, MailIntegration, Membership, NewComment, NewEmailThread, NewTicket,
    Ticket, TicketComment,
};

/// Result of atomically inserting a ticket together with its thread
/// registration.
///
/// Two concurrent ingestions of the same provider thread race on the
/// thread's uniqueness; the loser gets `Conflict` with the surviving row and
/// nothing inserted, so it can downgrade the create to an append.
#[derive(Debug)]
pub enum TicketInsert {
    Created { ticket: Ticket, thread: EmailThread },
    Conflict { thread: EmailThread },
}

/// Trait for helpdesk storage backends
pub trait HelpdeskStore: Send + Sync {
    // === Mail integrations ===

    /// Store a new integration, returning it with its assigned id
    fn add_integration(&self, integration: &MailIntegration) -> Result<MailIntegration>;

    /// Get an integration by id
    fn integration(&self, id: i64) -> Result<Option<MailIntegration>>;

    /// Get the integration connected to a mailbox address
    fn integration_by_mailbox(&self, mailbox: &str) -> Result<Option<MailIntegration>>;

    /// Active integrations with auto-sync and auto-create both enabled,
    /// in id order
    fn integrations_for_sweep(&self) -> Result<Vec<MailIntegration>>;

    /// Advance the history checkpoint
    fn advance_history_id(&self, integration_id: i64, history_id: &str) -> Result<()>;

    /// Advance the cron sweep checkpoint
    fn advance_last_sync(&self, integration_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Persist a freshly minted access token
    fn update_tokens(
        &self,
        integration_id: i64,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    // === Clients and memberships ===

    /// Store a new client, returning it with its assigned id
    fn add_client(&self, client: &Client) -> Result<Client>;

    /// Active clients of a tenant, in id order
    fn active_clients(&self, company_id: i64) -> Result<Vec<Client>>;

    /// Store a new membership, returning it with its assigned id
    fn add_membership(&self, membership: &Membership) -> Result<Membership>;

    /// User id of the tenant's first active admin (lowest membership id)
    fn first_active_admin(&self, company_id: i64) -> Result<Option<i64>>;

    // === Threads ===

    /// Find the thread registered for a provider conversation
    fn thread_by_provider_id(
        &self,
        company_id: i64,
        provider_thread_id: &str,
    ) -> Result<Option<EmailThread>>;

    /// Record the latest ingested message on a thread
    fn touch_thread(&self, thread_id: i64, last_message_id: &str, at: DateTime<Utc>) -> Result<()>;

    // === Tickets and comments ===

    /// Insert a ticket and register its thread as one atomic step
    fn create_ticket_with_thread(
        &self,
        ticket: NewTicket,
        thread: NewEmailThread,
    ) -> Result<TicketInsert>;

    /// Get a ticket by id
    fn ticket(&self, id: i64) -> Result<Option<Ticket>>;

    /// All tickets of a tenant, in id order
    fn tickets_for_company(&self, company_id: i64) -> Result<Vec<Ticket>>;

    /// Insert a comment. Returns `None` when the provider message id was
    /// already ingested for this tenant.
    fn create_comment(&self, comment: NewComment) -> Result<Option<TicketComment>>;

    /// Whether a provider message was already absorbed for this tenant,
    /// either as a ticket's founding message or as a comment
    fn message_ingested(&self, company_id: i64, provider_message_id: &str) -> Result<bool>;

    /// Comments on a ticket, in id order
    fn comments_for_ticket(&self, ticket_id: i64) -> Result<Vec<TicketComment>>;

    /// Remove all data (for testing)
    fn clear(&self) -> Result<()>;
}
