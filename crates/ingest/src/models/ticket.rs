//! Ticket and comment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticket priority level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Normal => "normal",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }

    /// Parse a stored priority string, falling back to `Normal`
    pub fn parse(value: &str) -> Self {
        match value {
            "low" => TicketPriority::Low,
            "high" => TicketPriority::High,
            "urgent" => TicketPriority::Urgent,
            _ => TicketPriority::Normal,
        }
    }
}

/// Ticket lifecycle state. Ingestion only ever creates `Open` tickets;
/// transitions belong to the agent-facing layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Open,
    Pending,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Pending => "pending",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    /// Parse a stored status string, falling back to `Open`
    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => TicketStatus::Pending,
            "resolved" => TicketStatus::Resolved,
            "closed" => TicketStatus::Closed,
            _ => TicketStatus::Open,
        }
    }
}

/// A support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Owning tenant
    pub company_id: i64,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    /// Address the originating email came from
    pub customer_email: String,
    /// Display name parsed from the From header, if any
    pub customer_name: Option<String>,
    /// Client organization the sender's domain matched, if any
    pub client_id: Option<i64>,
    /// Staff member the ticket was assigned to at creation, if any
    pub assignee_user_id: Option<i64>,
    /// Set by the agent-facing layer when a human first replies
    pub first_response_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a ticket
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub company_id: i64,
    pub subject: String,
    pub description: String,
    pub priority: TicketPriority,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub client_id: Option<i64>,
    pub assignee_user_id: Option<i64>,
}

/// A comment on a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketComment {
    /// Unique integer identifier (database primary key)
    pub id: i64,
    /// Owning tenant
    pub company_id: i64,
    pub ticket_id: i64,
    pub content: String,
    /// Internal notes are hidden from the customer portal
    pub is_internal: bool,
    /// True when written by the pipeline rather than a person
    pub is_system: bool,
    /// Provider message id this comment was ingested from, if any.
    /// Replays are screened out by the per-tenant ingestion markers.
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a comment
#[derive(Debug, Clone)]
pub struct NewComment {
    pub company_id: i64,
    pub ticket_id: i64,
    pub content: String,
    pub is_internal: bool,
    pub is_system: bool,
    pub provider_message_id: Option<String>,
}
