//! Integration tests for the ingestion pipeline
//!
//! These tests drive the webhook and cron entry points end to end against
//! scripted mail sources and check what lands in storage.

use anyhow::Result;
use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use ingest::gmail::api::{
    GmailMessage, Header, MessageBody, MessagePart, MessagePayload, MessageRef,
};
use ingest::models::{
    Client, MailIntegration, MemberRole, Membership, NewEmailThread, NewTicket, Ticket,
    TicketPriority,
};
use ingest::pipeline::{
    MAX_MESSAGES_PER_SWEEP, Notification, SweepOutcome, WebhookOutcome, WebhookStatus,
    process_notification, run_sweep,
};
use ingest::source::MailSource;
use ingest::storage::{HelpdeskStore, InMemoryHelpdeskStore, SqliteHelpdeskStore, TicketInsert};
use ingest::{HistoryExpiredError, Mailer, OutboundMail};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scripted mail source standing in for a live Gmail connection
#[derive(Clone, Default)]
struct FakeSource {
    listed: Vec<MessageRef>,
    messages: HashMap<String, GmailMessage>,
    broken: HashSet<String>,
    history_expired: bool,
    listing_fails: bool,
    unread_queries: Arc<Mutex<Vec<DateTime<Utc>>>>,
}

impl FakeSource {
    fn new() -> Self {
        Self::default()
    }

    /// Queue a full message, visible to both history listing and unread queries
    fn add(mut self, message: GmailMessage) -> Self {
        self.listed.push(MessageRef {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
        });
        self.messages.insert(message.id.clone(), message);
        self
    }

    /// Queue a message reference whose full fetch fails
    fn add_broken(mut self, id: &str, thread_id: &str) -> Self {
        self.listed.push(MessageRef {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
        });
        self.broken.insert(id.to_string());
        self
    }

    fn with_expired_history(mut self) -> Self {
        self.history_expired = true;
        self
    }

    fn with_failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// The `since` bound of every unread query made so far
    fn unread_queries(&self) -> Vec<DateTime<Utc>> {
        self.unread_queries.lock().unwrap().clone()
    }
}

impl MailSource for FakeSource {
    fn history_since(&self, _start_history_id: &str) -> Result<Vec<MessageRef>> {
        if self.history_expired {
            return Err(HistoryExpiredError.into());
        }
        if self.listing_fails {
            anyhow::bail!("mailbox temporarily unavailable");
        }
        Ok(self.listed.clone())
    }

    fn unread_messages(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MessageRef>> {
        if self.listing_fails {
            anyhow::bail!("mailbox temporarily unavailable");
        }
        self.unread_queries.lock().unwrap().push(since);
        let mut listed = self.listed.clone();
        listed.truncate(limit);
        Ok(listed)
    }

    fn fetch_message(&self, id: &str) -> Result<GmailMessage> {
        if self.broken.contains(id) {
            anyhow::bail!("transient failure fetching {id}");
        }
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted message {id}"))
    }
}

/// Mailer that records what would have been sent
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutboundMail>>,
}

impl RecordingMailer {
    fn new() -> Self {
        Self::default()
    }

    fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// Mailer whose sends always fail
struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(&self, _mail: &OutboundMail) -> Result<()> {
        anyhow::bail!("relay refused connection")
    }
}

fn make_header(name: &str, value: &str) -> Header {
    Header {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Helper to build a plain-text message shaped the way the Gmail API returns it
fn make_message(id: &str, thread_id: &str, from: &str, subject: &str, body: &str) -> GmailMessage {
    GmailMessage {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        label_ids: Some(vec!["INBOX".to_string(), "UNREAD".to_string()]),
        snippet: String::new(),
        internal_date: "1755770400000".to_string(),
        payload: Some(MessagePayload {
            headers: Some(vec![
                make_header("From", from),
                make_header("Subject", subject),
                make_header("Date", "Thu, 21 Aug 2025 10:00:00 +0000"),
            ]),
            body: Some(MessageBody {
                size: Some(body.len() as u32),
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(body)),
            }),
            parts: None,
            mime_type: Some("text/plain".to_string()),
        }),
    }
}

fn make_part(mime_type: &str, content: &str) -> MessagePart {
    MessagePart {
        part_id: None,
        mime_type: Some(mime_type.to_string()),
        filename: None,
        headers: None,
        body: Some(MessageBody {
            size: Some(content.len() as u32),
            data: Some(BASE64_URL_SAFE_NO_PAD.encode(content)),
        }),
        parts: None,
    }
}

/// Helper to connect an inbox for a tenant, history checkpoint already in place
fn seed_integration(store: &dyn HelpdeskStore, company_id: i64, mailbox: &str) -> MailIntegration {
    store
        .add_integration(
            &MailIntegration::new(company_id, mailbox)
                .with_tokens("access-token", "refresh-token")
                .with_history_id("490"),
        )
        .unwrap()
}

/// Helper to give a tenant one client organization and one active admin
fn seed_directory(store: &dyn HelpdeskStore, company_id: i64, domain: &str) -> Client {
    let client = store
        .add_client(&Client::new(company_id, "Acme Corp").with_domains(vec![domain.to_string()]))
        .unwrap();
    store
        .add_membership(&Membership::new(company_id, 7, MemberRole::Admin))
        .unwrap();
    client
}

/// Helper to register an existing ticket with a tracked conversation
fn seed_ticket(store: &dyn HelpdeskStore, company_id: i64, provider_thread_id: &str) -> Ticket {
    let insert = store
        .create_ticket_with_thread(
            NewTicket {
                company_id,
                subject: "Printer trouble".to_string(),
                description: "It started with the printer.".to_string(),
                priority: TicketPriority::Normal,
                customer_email: "alice@acme.test".to_string(),
                customer_name: Some("Alice".to_string()),
                client_id: None,
                assignee_user_id: None,
            },
            NewEmailThread {
                company_id,
                provider_thread_id: provider_thread_id.to_string(),
                subject: "Printer trouble".to_string(),
                participants: vec!["alice@acme.test".to_string()],
                last_message_id: Some("m0".to_string()),
            },
        )
        .unwrap();
    match insert {
        TicketInsert::Created { ticket, .. } => ticket,
        TicketInsert::Conflict { .. } => panic!("thread already tracked"),
    }
}

/// Run one push notification against a scripted source
fn push(
    store: &dyn HelpdeskStore,
    mailer: &dyn Mailer,
    mailbox: &str,
    history_id: &str,
    source: &FakeSource,
) -> WebhookOutcome {
    let notification = Notification {
        mailbox: mailbox.to_string(),
        history_id: history_id.to_string(),
    };
    let source = source.clone();
    process_notification(store, mailer, &notification, move |_| {
        Ok(Box::new(source) as Box<dyn MailSource>)
    })
    .unwrap()
}

/// Run one sweep where every integration sees the same scripted source
fn sweep(
    store: &dyn HelpdeskStore,
    mailer: &dyn Mailer,
    now: DateTime<Utc>,
    source: &FakeSource,
) -> SweepOutcome {
    run_sweep(store, mailer, now, |_| {
        Ok(Box::new(source.clone()) as Box<dyn MailSource>)
    })
    .unwrap()
}

#[test]
fn test_webhook_opens_ticket_for_new_thread() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    let integration = store
        .add_integration(
            &MailIntegration::new(1, "support@helpdesk.test")
                .with_tokens("access-token", "refresh-token")
                .with_history_id("490")
                .with_default_priority(TicketPriority::High),
        )
        .unwrap();
    let client = seed_directory(&store, 1, "acme.test");

    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "Alice Example <alice@acme.test>",
        "Printer is on fire",
        "It is printing and on fire at the same time.",
    ));
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.status, WebhookStatus::Processed);
    assert_eq!(outcome.stats.messages_seen, 1);
    assert_eq!(outcome.stats.tickets_created, 1);

    let tickets = store.tickets_for_company(1).unwrap();
    assert_eq!(tickets.len(), 1);
    let ticket = &tickets[0];
    assert_eq!(ticket.subject, "Printer is on fire");
    assert_eq!(
        ticket.description,
        "It is printing and on fire at the same time."
    );
    assert_eq!(ticket.priority, TicketPriority::High);
    assert_eq!(ticket.customer_email, "alice@acme.test");
    assert_eq!(ticket.customer_name.as_deref(), Some("Alice Example"));
    assert_eq!(ticket.client_id, Some(client.id));
    assert_eq!(ticket.assignee_user_id, Some(7));

    // The conversation is tracked so later replies land on this ticket
    let thread = store.thread_by_provider_id(1, "T1").unwrap().unwrap();
    assert_eq!(thread.ticket_id, ticket.id);
    assert_eq!(thread.last_message_id.as_deref(), Some("m1"));

    // The customer got an acknowledgment and the checkpoint moved
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@acme.test");
    assert!(sent[0].subject.contains(&format!("#{}", ticket.id)));
    let integration = store.integration(integration.id).unwrap().unwrap();
    assert_eq!(integration.last_history_id.as_deref(), Some("500"));
}

#[test]
fn test_webhook_appends_reply_to_tracked_thread() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");
    let ticket = seed_ticket(&store, 1, "T1");

    let source = FakeSource::new().add(make_message(
        "m2",
        "T1",
        "Alice Example <alice@acme.test>",
        "Re: Printer trouble",
        "Still broken after the restart.",
    ));
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.status, WebhookStatus::Processed);
    assert_eq!(outcome.stats.comments_added, 1);
    assert_eq!(outcome.stats.tickets_created, 0);
    assert_eq!(store.tickets_for_company(1).unwrap().len(), 1);

    let comments = store.comments_for_ticket(ticket.id).unwrap();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].is_system);
    assert!(!comments[0].is_internal);
    assert_eq!(comments[0].provider_message_id.as_deref(), Some("m2"));
    assert!(
        comments[0]
            .content
            .contains("From: Alice Example <alice@acme.test>")
    );
    assert!(comments[0].content.contains("Still broken after the restart."));

    // No acknowledgment for replies, and both cursors moved
    assert!(mailer.sent().is_empty());
    let thread = store.thread_by_provider_id(1, "T1").unwrap().unwrap();
    assert_eq!(thread.last_message_id.as_deref(), Some("m2"));
    let integration = store
        .integration_by_mailbox("support@helpdesk.test")
        .unwrap()
        .unwrap();
    assert_eq!(integration.last_history_id.as_deref(), Some("500"));
}

#[test]
fn test_webhook_replay_creates_nothing_twice() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let source = FakeSource::new()
        .add(make_message(
            "m1",
            "T1",
            "Alice <alice@acme.test>",
            "Printer is on fire",
            "Flames everywhere.",
        ))
        .add(make_message(
            "m2",
            "T1",
            "Alice <alice@acme.test>",
            "Re: Printer is on fire",
            "Also smoke.",
        ));

    let first = push(&store, &mailer, "support@helpdesk.test", "500", &source);
    assert_eq!(first.stats.tickets_created, 1);
    assert_eq!(first.stats.comments_added, 1);

    // Pub/Sub redelivers and the provider returns the same history window.
    // Both the founding message and the reply must be recognized as absorbed.
    let second = push(&store, &mailer, "support@helpdesk.test", "500", &source);
    assert_eq!(second.status, WebhookStatus::Processed);
    assert_eq!(second.stats.skipped, 2);
    assert_eq!(second.stats.tickets_created, 0);
    assert_eq!(second.stats.comments_added, 0);

    let tickets = store.tickets_for_company(1).unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(store.comments_for_ticket(tickets[0].id).unwrap().len(), 1);
    assert_eq!(mailer.sent().len(), 1);
}

#[test]
fn test_webhook_ignores_unknown_mailbox() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "alice@acme.test",
        "Hello",
        "Hi there.",
    ));
    let outcome = push(&store, &mailer, "other@helpdesk.test", "500", &source);

    assert_eq!(outcome.status, WebhookStatus::Ignored);
    assert_eq!(outcome.stats.messages_seen, 0);
    assert!(store.tickets_for_company(1).unwrap().is_empty());
}

#[test]
fn test_webhook_ignores_disabled_integrations() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    store
        .add_integration(
            &MailIntegration::new(1, "paused@helpdesk.test")
                .with_tokens("access-token", "refresh-token")
                .with_history_id("490")
                .with_auto_sync(false),
        )
        .unwrap();
    store
        .add_integration(
            &MailIntegration::new(2, "disconnected@helpdesk.test")
                .with_tokens("access-token", "refresh-token")
                .with_history_id("490")
                .with_active(false),
        )
        .unwrap();

    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "alice@acme.test",
        "Hello",
        "Hi there.",
    ));
    let paused = push(&store, &mailer, "paused@helpdesk.test", "500", &source);
    let disconnected = push(&store, &mailer, "disconnected@helpdesk.test", "500", &source);

    assert_eq!(paused.status, WebhookStatus::Ignored);
    assert_eq!(disconnected.status, WebhookStatus::Ignored);
    assert!(store.tickets_for_company(1).unwrap().is_empty());
    assert!(store.tickets_for_company(2).unwrap().is_empty());
}

#[test]
fn test_webhook_seeds_cursor_on_first_notification() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    let integration = store
        .add_integration(
            &MailIntegration::new(1, "support@helpdesk.test")
                .with_tokens("access-token", "refresh-token"),
        )
        .unwrap();
    seed_directory(&store, 1, "acme.test");

    // Listing must not run on the seeding pass, so a queued message stays untouched
    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "alice@acme.test",
        "Hello",
        "First contact.",
    ));
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.status, WebhookStatus::NoChanges);
    assert_eq!(outcome.stats.messages_seen, 0);
    assert!(store.tickets_for_company(1).unwrap().is_empty());
    let integration = store.integration(integration.id).unwrap().unwrap();
    assert_eq!(integration.last_history_id.as_deref(), Some("500"));

    // The next notification picks up from the seeded cursor normally
    let outcome = push(&store, &mailer, "support@helpdesk.test", "510", &source);
    assert_eq!(outcome.status, WebhookStatus::Processed);
    assert_eq!(store.tickets_for_company(1).unwrap().len(), 1);
}

#[test]
fn test_webhook_expired_cursor_resets_without_ingesting() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    let integration = seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let source = FakeSource::new().with_expired_history();
    let outcome = push(&store, &mailer, "support@helpdesk.test", "99000", &source);

    assert_eq!(outcome.status, WebhookStatus::NoChanges);
    assert_eq!(outcome.stats.messages_seen, 0);
    assert!(store.tickets_for_company(1).unwrap().is_empty());

    // The cursor jumps to the notified position instead of erroring forever
    let integration = store.integration(integration.id).unwrap().unwrap();
    assert_eq!(integration.last_history_id.as_deref(), Some("99000"));
}

#[test]
fn test_webhook_fetch_failure_spares_the_rest_of_the_batch() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    let integration = seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");
    let ticket = seed_ticket(&store, 1, "T1");

    let source = FakeSource::new().add_broken("m1", "T9").add(make_message(
        "m2",
        "T1",
        "Alice <alice@acme.test>",
        "Re: Printer trouble",
        "Any update?",
    ));
    let outcome = push(&store, &mailer, "support@helpdesk.test", "600", &source);

    assert_eq!(outcome.stats.errors, 1);
    assert_eq!(outcome.stats.comments_added, 1);
    assert_eq!(store.comments_for_ticket(ticket.id).unwrap().len(), 1);

    // The checkpoint still lands on the notification's history id
    let integration = store.integration(integration.id).unwrap().unwrap();
    assert_eq!(integration.last_history_id.as_deref(), Some("600"));
}

#[test]
fn test_unclaimed_sender_domains_are_skipped() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    // Matching is exact: a subdomain is not the client's domain
    let source = FakeSource::new()
        .add(make_message(
            "m1",
            "T1",
            "Mallory <mallory@stranger.test>",
            "Great offer",
            "Buy things.",
        ))
        .add(make_message(
            "m2",
            "T2",
            "Bob <bob@mail.acme.test>",
            "Printer",
            "From a subdomain.",
        ));
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.stats.skipped, 2);
    assert_eq!(outcome.stats.tickets_created, 0);
    assert!(store.tickets_for_company(1).unwrap().is_empty());
    assert!(mailer.sent().is_empty());
}

#[test]
fn test_messages_without_text_are_skipped() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let mut headers_only = make_message(
        "m2",
        "T2",
        "Alice <alice@acme.test>",
        "Attachment only",
        "ignored",
    );
    headers_only.payload.as_mut().unwrap().body = None;

    let source = FakeSource::new()
        .add(make_message(
            "m1",
            "T1",
            "Alice <alice@acme.test>",
            "Blank",
            "   \n",
        ))
        .add(headers_only);
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.stats.skipped, 2);
    assert!(store.tickets_for_company(1).unwrap().is_empty());
    assert!(store.thread_by_provider_id(1, "T1").unwrap().is_none());
}

#[test]
fn test_creation_disabled_still_tracks_replies() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    store
        .add_integration(
            &MailIntegration::new(1, "support@helpdesk.test")
                .with_tokens("access-token", "refresh-token")
                .with_history_id("490")
                .with_auto_create(false),
        )
        .unwrap();
    seed_directory(&store, 1, "acme.test");
    let ticket = seed_ticket(&store, 1, "T1");

    let source = FakeSource::new()
        .add(make_message(
            "m1",
            "T2",
            "Alice <alice@acme.test>",
            "New problem",
            "Brand new thread.",
        ))
        .add(make_message(
            "m2",
            "T1",
            "Alice <alice@acme.test>",
            "Re: Printer trouble",
            "Following up.",
        ));
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.stats.skipped, 1);
    assert_eq!(outcome.stats.comments_added, 1);
    assert_eq!(store.tickets_for_company(1).unwrap().len(), 1);
    assert_eq!(store.comments_for_ticket(ticket.id).unwrap().len(), 1);
}

#[test]
fn test_multipart_ticket_uses_plain_text_part() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    // multipart/alternative with the html part listed first
    let mut message = make_message("m1", "T1", "Alice <alice@acme.test>", "Report", "unused");
    let payload = message.payload.as_mut().unwrap();
    payload.mime_type = Some("multipart/alternative".to_string());
    payload.body = None;
    payload.parts = Some(vec![
        make_part("text/html", "<p>The <b>report</b> is attached.</p>"),
        make_part("text/plain", "The report is attached."),
    ]);

    let source = FakeSource::new().add(message);
    let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.stats.tickets_created, 1);
    let tickets = store.tickets_for_company(1).unwrap();
    assert_eq!(tickets[0].description, "The report is attached.");
}

#[test]
fn test_failed_acknowledgment_does_not_block_the_ticket() {
    let store = InMemoryHelpdeskStore::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "Alice <alice@acme.test>",
        "Printer",
        "Broken.",
    ));
    let outcome = push(&store, &FailingMailer, "support@helpdesk.test", "500", &source);

    assert_eq!(outcome.stats.tickets_created, 1);
    assert_eq!(outcome.stats.errors, 0);
    assert_eq!(store.tickets_for_company(1).unwrap().len(), 1);
}

#[test]
fn test_cron_sweep_ingests_and_advances_the_window() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    let integration = seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let now = Utc::now();
    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "Alice <alice@acme.test>",
        "Printer",
        "Broken again.",
    ));
    let outcome = sweep(&store, &mailer, now, &source);

    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.results.len(), 1);
    let result = &outcome.results[0];
    assert!(result.success);
    assert_eq!(result.company_id, 1);
    assert_eq!(result.messages_processed, 1);
    assert_eq!(result.tickets_created, 1);
    assert!(result.error.is_none());

    // Never-synced integrations look back one hour
    assert_eq!(source.unread_queries(), vec![now - Duration::hours(1)]);
    let integration = store.integration(integration.id).unwrap().unwrap();
    assert_eq!(integration.last_sync_at, Some(now));

    // The next sweep starts where this one ended
    let later = now + Duration::minutes(5);
    sweep(&store, &mailer, later, &source);
    assert_eq!(source.unread_queries()[1], now);
}

#[test]
fn test_cron_rescanning_an_overlapping_window_adds_nothing() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    // The message stays unread, so both sweeps list it
    let source = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "Alice <alice@acme.test>",
        "Printer",
        "Broken again.",
    ));
    let now = Utc::now();
    sweep(&store, &mailer, now, &source);
    let second = sweep(&store, &mailer, now + Duration::minutes(10), &source);

    assert_eq!(second.results[0].messages_processed, 1);
    assert_eq!(second.results[0].tickets_created, 0);
    let tickets = store.tickets_for_company(1).unwrap();
    assert_eq!(tickets.len(), 1);
    assert!(store.comments_for_ticket(tickets[0].id).unwrap().is_empty());
}

#[test]
fn test_cron_one_broken_mailbox_does_not_stop_the_sweep() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    let broken = seed_integration(&store, 1, "broken@helpdesk.test");
    let healthy = seed_integration(&store, 2, "healthy@helpdesk.test");
    seed_directory(&store, 2, "acme.test");

    let mut sources = HashMap::new();
    sources.insert(
        "broken@helpdesk.test".to_string(),
        FakeSource::new().with_failing_listing(),
    );
    sources.insert(
        "healthy@helpdesk.test".to_string(),
        FakeSource::new().add(make_message(
            "m1",
            "T1",
            "Alice <alice@acme.test>",
            "Printer",
            "Broken.",
        )),
    );

    let now = Utc::now();
    let outcome = run_sweep(&store, &mailer, now, |integration: &MailIntegration| {
        match sources.get(&integration.mailbox) {
            Some(source) => Ok(Box::new(source.clone()) as Box<dyn MailSource>),
            None => anyhow::bail!("no source for {}", integration.mailbox),
        }
    })
    .unwrap();

    assert_eq!(outcome.processed, 2);
    let failed = outcome.results.iter().find(|r| r.company_id == 1).unwrap();
    assert!(!failed.success);
    assert!(failed.error.is_some());
    let ok = outcome.results.iter().find(|r| r.company_id == 2).unwrap();
    assert!(ok.success);
    assert_eq!(ok.tickets_created, 1);

    // Only the successful integration's window advances
    let broken = store.integration(broken.id).unwrap().unwrap();
    assert_eq!(broken.last_sync_at, None);
    let healthy = store.integration(healthy.id).unwrap().unwrap();
    assert_eq!(healthy.last_sync_at, Some(now));
}

#[test]
fn test_cron_caps_messages_per_integration() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "support@helpdesk.test");
    seed_directory(&store, 1, "acme.test");

    let mut source = FakeSource::new();
    for n in 0..(MAX_MESSAGES_PER_SWEEP + 5) {
        source = source.add(make_message(
            &format!("m{n}"),
            &format!("T{n}"),
            "Alice <alice@acme.test>",
            &format!("Issue {n}"),
            "Please help.",
        ));
    }
    let outcome = sweep(&store, &mailer, Utc::now(), &source);

    assert_eq!(
        outcome.results[0].messages_processed,
        MAX_MESSAGES_PER_SWEEP
    );
    assert_eq!(
        store.tickets_for_company(1).unwrap().len(),
        MAX_MESSAGES_PER_SWEEP
    );
}

#[test]
fn test_tenants_with_the_same_provider_thread_stay_separate() {
    let store = InMemoryHelpdeskStore::new();
    let mailer = RecordingMailer::new();
    seed_integration(&store, 1, "one@helpdesk.test");
    seed_integration(&store, 2, "two@helpdesk.test");
    seed_directory(&store, 1, "acme.test");
    seed_directory(&store, 2, "umbrella.test");

    let first = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "alice@acme.test",
        "Hello",
        "From tenant one.",
    ));
    let second = FakeSource::new().add(make_message(
        "m1",
        "T1",
        "bob@umbrella.test",
        "Hello",
        "From tenant two.",
    ));
    push(&store, &mailer, "one@helpdesk.test", "500", &first);
    push(&store, &mailer, "two@helpdesk.test", "500", &second);

    // Same provider ids, two tenants, two independent tickets
    let one = store.tickets_for_company(1).unwrap();
    let two = store.tickets_for_company(2).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(two.len(), 1);
    assert_eq!(one[0].description, "From tenant one.");
    assert_eq!(two[0].description, "From tenant two.");
    assert_ne!(
        store.thread_by_provider_id(1, "T1").unwrap().unwrap().ticket_id,
        store.thread_by_provider_id(2, "T1").unwrap().unwrap().ticket_id
    );
}

#[test]
fn test_sqlite_pipeline_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("helpdesk.db");
    let mailer = RecordingMailer::new();

    let source = FakeSource::new()
        .add(make_message(
            "m1",
            "T1",
            "Alice Example <alice@acme.test>",
            "Printer is on fire",
            "Flames.",
        ))
        .add(make_message(
            "m2",
            "T1",
            "Alice Example <alice@acme.test>",
            "Re: Printer is on fire",
            "And smoke.",
        ));

    let (integration_id, ticket_id) = {
        let store = SqliteHelpdeskStore::new(&db_path).unwrap();
        let integration = seed_integration(&store, 1, "support@helpdesk.test");
        seed_directory(&store, 1, "acme.test");

        let outcome = push(&store, &mailer, "support@helpdesk.test", "500", &source);
        assert_eq!(outcome.stats.tickets_created, 1);
        assert_eq!(outcome.stats.comments_added, 1);

        // Redelivery against the same database is absorbed
        let replay = push(&store, &mailer, "support@helpdesk.test", "500", &source);
        assert_eq!(replay.stats.skipped, 2);

        let tickets = store.tickets_for_company(1).unwrap();
        assert_eq!(tickets.len(), 1);
        (integration.id, tickets[0].id)
    };

    // Reopen the database and confirm everything persisted
    let store = SqliteHelpdeskStore::new(&db_path).unwrap();
    let integration = store.integration(integration_id).unwrap().unwrap();
    assert_eq!(integration.last_history_id.as_deref(), Some("500"));
    let ticket = store.ticket(ticket_id).unwrap().unwrap();
    assert_eq!(ticket.subject, "Printer is on fire");
    assert_eq!(store.comments_for_ticket(ticket_id).unwrap().len(), 1);
    let thread = store.thread_by_provider_id(1, "T1").unwrap().unwrap();
    assert_eq!(thread.last_message_id.as_deref(), Some("m2"));
    assert!(store.message_ingested(1, "m1").unwrap());
    assert!(store.message_ingested(1, "m2").unwrap());
}
