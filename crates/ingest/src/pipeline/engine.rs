//! Shared message ingestion
//!
//! Both triggers reduce to the same operation: given one provider message,
//! append it to the ticket of an already-tracked thread, or open a new
//! ticket for it.

use anyhow::Result;
use chrono::Utc;

use crate::decode;
use crate::gmail::api::GmailMessage;
use crate::models::{EmailThread, MailIntegration, NewComment, NewEmailThread, NewTicket};
use crate::outbound::{self, Mailer};
use crate::resolve::{self, DomainIndex};
use crate::storage::{HelpdeskStore, TicketInsert};

/// What happened to one ingested message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Message appended to an existing ticket
    CommentAdded { ticket_id: i64 },
    /// Message opened a new ticket
    TicketCreated { ticket_id: i64 },
    /// Message was deliberately not ingested
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Decoded body was empty
    EmptyBody,
    /// Missing or unparsable From header, or no client claims the domain
    UnmatchedSender,
    /// The provider message was already ingested
    AlreadyIngested,
    /// Integration has automatic ticket creation disabled
    CreationDisabled,
}

/// Counters for one pipeline run
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub messages_seen: usize,
    pub tickets_created: usize,
    pub comments_added: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl IngestStats {
    pub(crate) fn record(&mut self, outcome: &IngestOutcome) {
        self.messages_seen += 1;
        match outcome {
            IngestOutcome::CommentAdded { .. } => self.comments_added += 1,
            IngestOutcome::TicketCreated { .. } => self.tickets_created += 1,
            IngestOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub(crate) fn record_error(&mut self) {
        self.messages_seen += 1;
        self.errors += 1;
    }
}

/// The ingestion engine for one tenant pass
pub(crate) struct Ingestor<'a> {
    store: &'a dyn HelpdeskStore,
    mailer: &'a dyn Mailer,
    integration: &'a MailIntegration,
    domains: DomainIndex,
}

impl<'a> Ingestor<'a> {
    /// Build the engine for one integration, loading the tenant's domain
    /// index once for the whole pass.
    pub fn new(
        store: &'a dyn HelpdeskStore,
        mailer: &'a dyn Mailer,
        integration: &'a MailIntegration,
    ) -> Result<Self> {
        let clients = store.active_clients(integration.company_id)?;
        Ok(Self {
            store,
            mailer,
            integration,
            domains: DomainIndex::build(&clients),
        })
    }

    /// Ingest one message: append when its thread is tracked, otherwise
    /// open a ticket.
    pub fn ingest_message(&self, message: &GmailMessage) -> Result<IngestOutcome> {
        match self
            .store
            .thread_by_provider_id(self.integration.company_id, &message.thread_id)?
        {
            Some(thread) => self.append_to_ticket(&thread, message),
            None => self.open_ticket(message),
        }
    }

    fn append_to_ticket(
        &self,
        thread: &EmailThread,
        message: &GmailMessage,
    ) -> Result<IngestOutcome> {
        let company_id = self.integration.company_id;

        if self.store.message_ingested(company_id, &message.id)? {
            return Ok(IngestOutcome::Skipped(SkipReason::AlreadyIngested));
        }

        let body = decode::extract_plain_text(message);
        let body = body.trim();
        if body.is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::EmptyBody));
        }

        let comment = NewComment {
            company_id,
            ticket_id: thread.ticket_id,
            content: reply_content(message, body),
            is_internal: false,
            is_system: true,
            provider_message_id: Some(message.id.clone()),
        };

        if self.store.create_comment(comment)?.is_none() {
            // A concurrent run claimed this message's ingestion marker first
            return Ok(IngestOutcome::Skipped(SkipReason::AlreadyIngested));
        }

        self.store.touch_thread(thread.id, &message.id, Utc::now())?;

        log::info!(
            "Appended message {} to ticket {} as comment",
            message.id,
            thread.ticket_id
        );

        Ok(IngestOutcome::CommentAdded {
            ticket_id: thread.ticket_id,
        })
    }

    fn open_ticket(&self, message: &GmailMessage) -> Result<IngestOutcome> {
        if !self.integration.auto_create_tickets {
            return Ok(IngestOutcome::Skipped(SkipReason::CreationDisabled));
        }

        let body = decode::extract_plain_text(message);
        let body = body.trim();
        if body.is_empty() {
            return Ok(IngestOutcome::Skipped(SkipReason::EmptyBody));
        }

        let Some(payload) = &message.payload else {
            return Ok(IngestOutcome::Skipped(SkipReason::UnmatchedSender));
        };
        let Some(sender) = decode::header_value(payload, "From")
            .and_then(|from| resolve::parse_sender(&from))
        else {
            return Ok(IngestOutcome::Skipped(SkipReason::UnmatchedSender));
        };
        let Some(client) = resolve::sender_domain(&sender.email)
            .and_then(|domain| self.domains.lookup(&domain))
        else {
            log::debug!(
                "No client claims the domain of {}; skipping message {}",
                sender.email,
                message.id
            );
            return Ok(IngestOutcome::Skipped(SkipReason::UnmatchedSender));
        };

        let subject = decode::header_value(payload, "Subject")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "(no subject)".to_string());

        let assignee = self.store.first_active_admin(self.integration.company_id)?;

        let ticket = NewTicket {
            company_id: self.integration.company_id,
            subject: subject.clone(),
            description: body.to_string(),
            priority: self.integration.default_priority,
            customer_email: sender.email.clone(),
            customer_name: sender.name.clone(),
            client_id: Some(client.id),
            assignee_user_id: assignee,
        };

        let thread = NewEmailThread {
            company_id: self.integration.company_id,
            provider_thread_id: message.thread_id.clone(),
            subject,
            participants: vec![sender.email.clone(), self.integration.mailbox.clone()],
            last_message_id: Some(message.id.clone()),
        };

        match self.store.create_ticket_with_thread(ticket, thread)? {
            TicketInsert::Created { ticket, .. } => {
                log::info!(
                    "Opened ticket {} for client {} from message {}",
                    ticket.id,
                    client.id,
                    message.id
                );

                let ack = outbound::ticket_acknowledgment(&ticket, &self.integration.mailbox);
                if let Err(e) = self.mailer.send(&ack) {
                    log::warn!(
                        "Failed to send acknowledgment for ticket {}: {:#}",
                        ticket.id,
                        e
                    );
                }

                Ok(IngestOutcome::TicketCreated {
                    ticket_id: ticket.id,
                })
            }
            TicketInsert::Conflict { thread } => {
                // Lost the registration race; treat the message as a reply
                self.append_to_ticket(&thread, message)
            }
        }
    }
}

/// Comment content for a reply, prefixed with provenance
fn reply_content(message: &GmailMessage, body: &str) -> String {
    let payload = message.payload.as_ref();
    let from = payload
        .and_then(|p| decode::header_value(p, "From"))
        .unwrap_or_else(|| "unknown".to_string());
    let date = payload
        .and_then(|p| decode::header_value(p, "Date"))
        .unwrap_or_else(|| "unknown".to_string());
    format!("From: {}\nDate: {}\n\n{}", from, date, body)
}
