//! Email thread model linking a provider conversation to a ticket

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A provider-side conversation bound to exactly one ticket.
///
/// The `(company_id, provider_thread_id)` pair is unique: one Gmail thread
/// maps to at most one ticket per tenant, and every later message on the
/// thread lands on that ticket as a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailThread {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Owning tenant
    pub company_id: i64,
    /// Ticket this conversation belongs to
    pub ticket_id: i64,
    /// Provider's thread identifier
    pub provider_thread_id: String,
    /// Subject of the first message
    pub subject: String,
    /// Addresses on the conversation
    pub participants: Vec<String>,
    /// Provider id of the most recently ingested message
    pub last_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to register a thread alongside its ticket.
///
/// The ticket id is supplied by the store, which inserts the ticket and the
/// thread in one atomic step.
#[derive(Debug, Clone)]
pub struct NewEmailThread {
    pub company_id: i64,
    pub provider_thread_id: String,
    pub subject: String,
    pub participants: Vec<String>,
    pub last_message_id: Option<String>,
}
