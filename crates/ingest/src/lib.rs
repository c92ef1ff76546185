//! Ingest crate - Gmail-to-ticket pipeline for the helpdesk
//!
//! This crate provides server-independent ingestion functionality including:
//! - Domain models (MailIntegration, Ticket, EmailThread, Client)
//! - Gmail API client and OAuth token refresh
//! - MIME body decoding to plain text
//! - Sender-domain resolution to helpdesk clients
//! - Storage trait abstractions with idempotent writes
//! - Webhook and scheduled-sweep pipeline drivers
//! - Outbound acknowledgment mail
//!
//! This crate has zero HTTP-server dependencies; the `deskd` binary wires
//! it to routes and deployment configuration.

pub mod checkpoint;
pub mod config;
pub mod decode;
pub mod gmail;
pub mod models;
pub mod outbound;
pub mod pipeline;
pub mod resolve;
pub mod source;
pub mod storage;

pub use config::GoogleCredentials;
pub use gmail::{AccessToken, AuthError, GmailClient, GmailConnection, HistoryExpiredError};
pub use models::{
    Client, EmailThread, MailIntegration, MemberRole, Membership, NewComment, NewEmailThread,
    NewTicket, Ticket, TicketComment, TicketPriority, TicketStatus,
};
pub use outbound::{Mailer, NoopMailer, OutboundMail, SmtpMailer};
pub use pipeline::{
    IngestOutcome, IngestStats, IntegrationOutcome, MAX_MESSAGES_PER_SWEEP, Notification,
    SkipReason, SweepOutcome, WebhookOutcome, WebhookStatus, process_notification, run_sweep,
};
pub use resolve::{DomainIndex, Sender, parse_sender, sender_domain};
pub use source::MailSource;
pub use storage::{HelpdeskStore, InMemoryHelpdeskStore, SqliteHelpdeskStore, TicketInsert};
