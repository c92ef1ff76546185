//! SQLite-based helpdesk storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{HelpdeskStore, TicketInsert};
use crate::models::{
    Client, EmailThread, MailIntegration, MemberRole, Membership, NewComment, NewEmailThread,
    NewTicket, Ticket, TicketComment, TicketPriority, TicketStatus,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Per-tenant Gmail mailbox connections
            CREATE TABLE mail_integrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                mailbox TEXT NOT NULL UNIQUE,
                access_token TEXT,
                refresh_token TEXT,
                token_expires_at TEXT,
                last_history_id TEXT,
                last_sync_at TEXT,
                auto_sync_enabled INTEGER NOT NULL DEFAULT 1,
                auto_create_tickets INTEGER NOT NULL DEFAULT 1,
                default_priority TEXT NOT NULL DEFAULT 'normal',
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_integrations_company ON mail_integrations(company_id);

            -- Client organizations; domains is a JSON array of strings
            CREATE TABLE clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                domains TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_clients_company ON clients(company_id);

            -- Staff memberships per tenant
            CREATE TABLE memberships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_memberships_company ON memberships(company_id);

            -- Support tickets
            CREATE TABLE tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                subject TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                priority TEXT NOT NULL DEFAULT 'normal',
                customer_email TEXT NOT NULL,
                customer_name TEXT,
                client_id INTEGER,
                assignee_user_id INTEGER,
                first_response_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_tickets_company ON tickets(company_id);

            -- Ticket comments; provider_message_id records which inbound
            -- message a comment came from
            CREATE TABLE ticket_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                ticket_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                is_internal INTEGER NOT NULL DEFAULT 0,
                is_system INTEGER NOT NULL DEFAULT 0,
                provider_message_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_comments_ticket ON ticket_comments(ticket_id);

            -- Every provider message the pipeline has absorbed, whether it
            -- founded a ticket or landed as a comment. Replays of either
            -- kind collide here and are ignored.
            CREATE TABLE ingested_messages (
                company_id INTEGER NOT NULL,
                provider_message_id TEXT NOT NULL,
                PRIMARY KEY (company_id, provider_message_id)
            ) WITHOUT ROWID;

            -- Provider conversations; one ticket each per tenant
            CREATE TABLE email_threads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id INTEGER NOT NULL,
                ticket_id INTEGER NOT NULL,
                provider_thread_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                participants TEXT NOT NULL DEFAULT '[]',
                last_message_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES tickets(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX idx_threads_provider
                ON email_threads(company_id, provider_thread_id);
            "#,
        ),
    ])
}

/// SQLite-based helpdesk storage
///
/// All pipeline writes go through single statements or one transaction, so
/// concurrent webhook and cron runs stay consistent.
pub struct SqliteHelpdeskStore {
    conn: Mutex<Connection>,
}

impl SqliteHelpdeskStore {
    /// Open (or create) a helpdesk database at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL keeps readers unblocked during webhook/cron writes;
        // NORMAL sync is safe in WAL mode. foreign_keys is required
        // for ON DELETE CASCADE.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        // Run migrations
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

const INTEGRATION_COLUMNS: &str = "id, company_id, mailbox, access_token, refresh_token, \
     token_expires_at, last_history_id, last_sync_at, auto_sync_enabled, \
     auto_create_tickets, default_priority, is_active";

fn integration_from_row(row: &rusqlite::Row) -> rusqlite::Result<MailIntegration> {
    Ok(MailIntegration {
        id: row.get(0)?,
        company_id: row.get(1)?,
        mailbox: row.get(2)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4)?,
        token_expires_at: parse_opt_timestamp(row.get(5)?),
        last_history_id: row.get(6)?,
        last_sync_at: parse_opt_timestamp(row.get(7)?),
        auto_sync_enabled: row.get(8)?,
        auto_create_tickets: row.get(9)?,
        default_priority: TicketPriority::parse(&row.get::<_, String>(10)?),
        is_active: row.get(11)?,
    })
}

const TICKET_COLUMNS: &str = "id, company_id, subject, description, status, priority, \
     customer_email, customer_name, client_id, assignee_user_id, first_response_at, created_at";

fn ticket_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        company_id: row.get(1)?,
        subject: row.get(2)?,
        description: row.get(3)?,
        status: TicketStatus::parse(&row.get::<_, String>(4)?),
        priority: TicketPriority::parse(&row.get::<_, String>(5)?),
        customer_email: row.get(6)?,
        customer_name: row.get(7)?,
        client_id: row.get(8)?,
        assignee_user_id: row.get(9)?,
        first_response_at: parse_opt_timestamp(row.get(10)?),
        created_at: parse_timestamp(row.get(11)?),
    })
}

const THREAD_COLUMNS: &str = "id, company_id, ticket_id, provider_thread_id, subject, \
     participants, last_message_id, created_at, updated_at";

fn thread_from_row(row: &rusqlite::Row) -> rusqlite::Result<EmailThread> {
    Ok(EmailThread {
        id: row.get(0)?,
        company_id: row.get(1)?,
        ticket_id: row.get(2)?,
        provider_thread_id: row.get(3)?,
        subject: row.get(4)?,
        participants: parse_participants(row.get(5)?),
        last_message_id: row.get(6)?,
        created_at: parse_timestamp(row.get(7)?),
        updated_at: parse_timestamp(row.get(8)?),
    })
}

const COMMENT_COLUMNS: &str =
    "id, company_id, ticket_id, content, is_internal, is_system, provider_message_id, created_at";

fn comment_from_row(row: &rusqlite::Row) -> rusqlite::Result<TicketComment> {
    Ok(TicketComment {
        id: row.get(0)?,
        company_id: row.get(1)?,
        ticket_id: row.get(2)?,
        content: row.get(3)?,
        is_internal: row.get(4)?,
        is_system: row.get(5)?,
        provider_message_id: row.get(6)?,
        created_at: parse_timestamp(row.get(7)?),
    })
}

fn client_from_row(row: &rusqlite::Row) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        domains: parse_participants(row.get(3)?),
        is_active: row.get(4)?,
    })
}

fn parse_timestamp(value: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(parse_timestamp)
}

fn parse_participants(value: String) -> Vec<String> {
    serde_json::from_str(&value).unwrap_or_default()
}

impl HelpdeskStore for SqliteHelpdeskStore {
    fn add_integration(&self, integration: &MailIntegration) -> Result<MailIntegration> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mail_integrations
                 (company_id, mailbox, access_token, refresh_token, token_expires_at,
                  last_history_id, last_sync_at, auto_sync_enabled, auto_create_tickets,
                  default_priority, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                integration.company_id,
                integration.mailbox,
                integration.access_token,
                integration.refresh_token,
                integration.token_expires_at.map(|t| t.to_rfc3339()),
                integration.last_history_id,
                integration.last_sync_at.map(|t| t.to_rfc3339()),
                integration.auto_sync_enabled,
                integration.auto_create_tickets,
                integration.default_priority.as_str(),
                integration.is_active,
            ],
        )?;

        let mut stored = integration.clone();
        stored.id = conn.last_insert_rowid();
        Ok(stored)
    }

    fn integration(&self, id: i64) -> Result<Option<MailIntegration>> {
        let conn = self.conn.lock().unwrap();
        let integration = conn
            .query_row(
                &format!("SELECT {INTEGRATION_COLUMNS} FROM mail_integrations WHERE id = ?"),
                [id],
                integration_from_row,
            )
            .optional()?;
        Ok(integration)
    }

    fn integration_by_mailbox(&self, mailbox: &str) -> Result<Option<MailIntegration>> {
        let conn = self.conn.lock().unwrap();
        let integration = conn
            .query_row(
                &format!("SELECT {INTEGRATION_COLUMNS} FROM mail_integrations WHERE mailbox = ?"),
                [mailbox],
                integration_from_row,
            )
            .optional()?;
        Ok(integration)
    }

    fn integrations_for_sweep(&self) -> Result<Vec<MailIntegration>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INTEGRATION_COLUMNS} FROM mail_integrations
             WHERE is_active = 1 AND auto_sync_enabled = 1 AND auto_create_tickets = 1
             ORDER BY id"
        ))?;
        let integrations = stmt
            .query_map([], integration_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(integrations)
    }

    fn advance_history_id(&self, integration_id: i64, history_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE mail_integrations SET last_history_id = ? WHERE id = ?",
            params![history_id, integration_id],
        )?;
        if rows == 0 {
            anyhow::bail!("Integration {} not found", integration_id);
        }
        Ok(())
    }

    fn advance_last_sync(&self, integration_id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE mail_integrations SET last_sync_at = ? WHERE id = ?",
            params![at.to_rfc3339(), integration_id],
        )?;
        if rows == 0 {
            anyhow::bail!("Integration {} not found", integration_id);
        }
        Ok(())
    }

    fn update_tokens(
        &self,
        integration_id: i64,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE mail_integrations SET access_token = ?, token_expires_at = ? WHERE id = ?",
            params![
                access_token,
                expires_at.map(|t| t.to_rfc3339()),
                integration_id
            ],
        )?;
        if rows == 0 {
            anyhow::bail!("Integration {} not found", integration_id);
        }
        Ok(())
    }

    fn add_client(&self, client: &Client) -> Result<Client> {
        let conn = self.conn.lock().unwrap();
        let domains_json = serde_json::to_string(&client.domains)?;
        conn.execute(
            "INSERT INTO clients (company_id, name, domains, is_active) VALUES (?, ?, ?, ?)",
            params![client.company_id, client.name, domains_json, client.is_active],
        )?;

        let mut stored = client.clone();
        stored.id = conn.last_insert_rowid();
        Ok(stored)
    }

    fn active_clients(&self, company_id: i64) -> Result<Vec<Client>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, company_id, name, domains, is_active FROM clients
             WHERE company_id = ? AND is_active = 1
             ORDER BY id",
        )?;
        let clients = stmt
            .query_map([company_id], client_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    fn add_membership(&self, membership: &Membership) -> Result<Membership> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memberships (company_id, user_id, role, is_active) VALUES (?, ?, ?, ?)",
            params![
                membership.company_id,
                membership.user_id,
                membership.role.as_str(),
                membership.is_active,
            ],
        )?;

        let mut stored = membership.clone();
        stored.id = conn.last_insert_rowid();
        Ok(stored)
    }

    fn first_active_admin(&self, company_id: i64) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let user_id = conn
            .query_row(
                "SELECT user_id FROM memberships
                 WHERE company_id = ? AND role = ? AND is_active = 1
                 ORDER BY id LIMIT 1",
                params![company_id, MemberRole::Admin.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    fn thread_by_provider_id(
        &self,
        company_id: i64,
        provider_thread_id: &str,
    ) -> Result<Option<EmailThread>> {
        let conn = self.conn.lock().unwrap();
        let thread = conn
            .query_row(
                &format!(
                    "SELECT {THREAD_COLUMNS} FROM email_threads
                     WHERE company_id = ? AND provider_thread_id = ?"
                ),
                params![company_id, provider_thread_id],
                thread_from_row,
            )
            .optional()?;
        Ok(thread)
    }

    fn touch_thread(&self, thread_id: i64, last_message_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE email_threads SET last_message_id = ?, updated_at = ? WHERE id = ?",
            params![last_message_id, at.to_rfc3339(), thread_id],
        )?;
        if rows == 0 {
            anyhow::bail!("Thread {} not found", thread_id);
        }
        Ok(())
    }

    fn create_ticket_with_thread(
        &self,
        ticket: NewTicket,
        thread: NewEmailThread,
    ) -> Result<TicketInsert> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO tickets
                 (company_id, subject, description, status, priority, customer_email,
                  customer_name, client_id, assignee_user_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                ticket.company_id,
                ticket.subject,
                ticket.description,
                TicketStatus::Open.as_str(),
                ticket.priority.as_str(),
                ticket.customer_email,
                ticket.customer_name,
                ticket.client_id,
                ticket.assignee_user_id,
                now.to_rfc3339(),
            ],
        )?;
        let ticket_id = tx.last_insert_rowid();

        let participants_json = serde_json::to_string(&thread.participants)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO email_threads
                 (company_id, ticket_id, provider_thread_id, subject, participants,
                  last_message_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                thread.company_id,
                ticket_id,
                thread.provider_thread_id,
                thread.subject,
                participants_json,
                thread.last_message_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            // Another writer registered this provider thread first. Load the
            // surviving row and roll the speculative ticket back.
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {THREAD_COLUMNS} FROM email_threads
                         WHERE company_id = ? AND provider_thread_id = ?"
                    ),
                    params![thread.company_id, thread.provider_thread_id],
                    thread_from_row,
                )
                .context("Thread insert conflicted but existing row not found")?;
            tx.rollback()?;
            return Ok(TicketInsert::Conflict { thread: existing });
        }

        let thread_id = tx.last_insert_rowid();

        // The founding message is absorbed into the ticket's description,
        // not a comment row, so it needs its own ingestion marker
        if let Some(message_id) = &thread.last_message_id {
            tx.execute(
                "INSERT OR IGNORE INTO ingested_messages (company_id, provider_message_id)
                 VALUES (?, ?)",
                params![thread.company_id, message_id],
            )?;
        }

        tx.commit()?;

        Ok(TicketInsert::Created {
            ticket: Ticket {
                id: ticket_id,
                company_id: ticket.company_id,
                subject: ticket.subject,
                description: ticket.description,
                status: TicketStatus::Open,
                priority: ticket.priority,
                customer_email: ticket.customer_email,
                customer_name: ticket.customer_name,
                client_id: ticket.client_id,
                assignee_user_id: ticket.assignee_user_id,
                first_response_at: None,
                created_at: now,
            },
            thread: EmailThread {
                id: thread_id,
                company_id: thread.company_id,
                ticket_id,
                provider_thread_id: thread.provider_thread_id,
                subject: thread.subject,
                participants: thread.participants,
                last_message_id: thread.last_message_id,
                created_at: now,
                updated_at: now,
            },
        })
    }

    fn ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let conn = self.conn.lock().unwrap();
        let ticket = conn
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?"),
                [id],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    fn tickets_for_company(&self, company_id: i64) -> Result<Vec<Ticket>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE company_id = ? ORDER BY id"
        ))?;
        let tickets = stmt
            .query_map([company_id], ticket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    fn create_comment(&self, comment: NewComment) -> Result<Option<TicketComment>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        // Claiming the ingestion marker and writing the comment are one
        // atomic step; a replayed message loses the claim and inserts
        // nothing.
        if let Some(message_id) = &comment.provider_message_id {
            let claimed = tx.execute(
                "INSERT OR IGNORE INTO ingested_messages (company_id, provider_message_id)
                 VALUES (?, ?)",
                params![comment.company_id, message_id],
            )?;
            if claimed == 0 {
                return Ok(None);
            }
        }

        tx.execute(
            "INSERT INTO ticket_comments
                 (company_id, ticket_id, content, is_internal, is_system,
                  provider_message_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                comment.company_id,
                comment.ticket_id,
                comment.content,
                comment.is_internal,
                comment.is_system,
                comment.provider_message_id,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some(TicketComment {
            id,
            company_id: comment.company_id,
            ticket_id: comment.ticket_id,
            content: comment.content,
            is_internal: comment.is_internal,
            is_system: comment.is_system,
            provider_message_id: comment.provider_message_id,
            created_at: now,
        }))
    }

    fn message_ingested(&self, company_id: i64, provider_message_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM ingested_messages
                 WHERE company_id = ? AND provider_message_id = ?",
                params![company_id, provider_message_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn comments_for_ticket(&self, ticket_id: i64) -> Result<Vec<TicketComment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM ticket_comments WHERE ticket_id = ? ORDER BY id"
        ))?;
        let comments = stmt
            .query_map([ticket_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            DELETE FROM ingested_messages;
            DELETE FROM ticket_comments;
            DELETE FROM email_threads;
            DELETE FROM tickets;
            DELETE FROM memberships;
            DELETE FROM clients;
            DELETE FROM mail_integrations;
            "#,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_store() -> (SqliteHelpdeskStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteHelpdeskStore::new(dir.path().join("helpdesk.db")).unwrap();
        (store, dir)
    }

    fn sample_ticket(company_id: i64) -> NewTicket {
        NewTicket {
            company_id,
            subject: "Printer trouble".to_string(),
            description: "It is on fire".to_string(),
            priority: TicketPriority::High,
            customer_email: "alice@customer.test".to_string(),
            customer_name: Some("Alice".to_string()),
            client_id: Some(3),
            assignee_user_id: Some(9),
        }
    }

    fn sample_thread(company_id: i64, provider_thread_id: &str) -> NewEmailThread {
        NewEmailThread {
            company_id,
            provider_thread_id: provider_thread_id.to_string(),
            subject: "Printer trouble".to_string(),
            participants: vec![
                "alice@customer.test".to_string(),
                "support@acme.test".to_string(),
            ],
            last_message_id: Some("m1".to_string()),
        }
    }

    #[test]
    fn test_integration_round_trip() {
        let (store, _dir) = create_store();

        let integration = MailIntegration::new(1, "support@acme.test")
            .with_tokens("access", "refresh")
            .with_history_id("100")
            .with_default_priority(TicketPriority::Urgent);
        let stored = store.add_integration(&integration).unwrap();
        assert!(stored.id > 0);

        let loaded = store.integration(stored.id).unwrap().unwrap();
        assert_eq!(loaded.mailbox, "support@acme.test");
        assert_eq!(loaded.access_token.as_deref(), Some("access"));
        assert_eq!(loaded.last_history_id.as_deref(), Some("100"));
        assert_eq!(loaded.default_priority, TicketPriority::Urgent);
        assert!(loaded.is_active);

        let by_mailbox = store
            .integration_by_mailbox("support@acme.test")
            .unwrap()
            .unwrap();
        assert_eq!(by_mailbox.id, stored.id);
        assert!(store.integration_by_mailbox("other@x.test").unwrap().is_none());
    }

    #[test]
    fn test_checkpoint_advances() {
        let (store, _dir) = create_store();
        let stored = store
            .add_integration(&MailIntegration::new(1, "support@acme.test"))
            .unwrap();

        store.advance_history_id(stored.id, "4242").unwrap();
        let now = Utc::now();
        store.advance_last_sync(stored.id, now).unwrap();

        let loaded = store.integration(stored.id).unwrap().unwrap();
        assert_eq!(loaded.last_history_id.as_deref(), Some("4242"));
        assert_eq!(
            loaded.last_sync_at.map(|t| t.timestamp()),
            Some(now.timestamp())
        );

        assert!(store.advance_history_id(9999, "1").is_err());
    }

    #[test]
    fn test_sweep_selection_filters() {
        let (store, _dir) = create_store();
        store
            .add_integration(&MailIntegration::new(1, "a@x.test"))
            .unwrap();
        store
            .add_integration(&MailIntegration::new(1, "b@x.test").with_auto_sync(false))
            .unwrap();
        store
            .add_integration(&MailIntegration::new(1, "c@x.test").with_auto_create(false))
            .unwrap();
        store
            .add_integration(&MailIntegration::new(1, "d@x.test").with_active(false))
            .unwrap();

        let sweep = store.integrations_for_sweep().unwrap();
        assert_eq!(sweep.len(), 1);
        assert_eq!(sweep[0].mailbox, "a@x.test");
    }

    #[test]
    fn test_ticket_with_thread_created_then_conflicts() {
        let (store, _dir) = create_store();

        let first = store
            .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
            .unwrap();
        let TicketInsert::Created { ticket, thread } = first else {
            panic!("first insert should create");
        };
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(thread.ticket_id, ticket.id);

        let second = store
            .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
            .unwrap();
        let TicketInsert::Conflict { thread: existing } = second else {
            panic!("second insert should conflict");
        };
        assert_eq!(existing.id, thread.id);

        // The conflicting ticket was rolled back
        assert_eq!(store.tickets_for_company(1).unwrap().len(), 1);

        // Same provider thread for another tenant is independent
        let other = store
            .create_ticket_with_thread(sample_ticket(2), sample_thread(2, "thr-1"))
            .unwrap();
        assert!(matches!(other, TicketInsert::Created { .. }));
    }

    #[test]
    fn test_comment_insert_and_dedup() {
        let (store, _dir) = create_store();
        let created = store
            .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
            .unwrap();
        let TicketInsert::Created { ticket, .. } = created else {
            panic!("should create");
        };

        let comment = NewComment {
            company_id: 1,
            ticket_id: ticket.id,
            content: "From: alice\n\nreply body".to_string(),
            is_internal: false,
            is_system: true,
            provider_message_id: Some("m2".to_string()),
        };

        let stored = store.create_comment(comment.clone()).unwrap();
        assert!(stored.is_some());
        assert!(store.create_comment(comment).unwrap().is_none());
        assert!(store.message_ingested(1, "m2").unwrap());
        assert!(!store.message_ingested(1, "m3").unwrap());

        let comments = store.comments_for_ticket(ticket.id).unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].is_system);
        assert_eq!(comments[0].provider_message_id.as_deref(), Some("m2"));
    }

    #[test]
    fn test_founding_message_marked_ingested() {
        let (store, _dir) = create_store();
        store
            .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
            .unwrap();

        // sample_thread records m1 as the founding message
        assert!(store.message_ingested(1, "m1").unwrap());
        assert!(!store.message_ingested(2, "m1").unwrap());

        // A conflicting insert leaves no marker for its message
        let mut retry = sample_thread(1, "thr-1");
        retry.last_message_id = Some("m9".to_string());
        let outcome = store
            .create_ticket_with_thread(sample_ticket(1), retry)
            .unwrap();
        assert!(matches!(outcome, TicketInsert::Conflict { .. }));
        assert!(!store.message_ingested(1, "m9").unwrap());
    }

    #[test]
    fn test_internal_note_without_message_id_always_inserts() {
        let (store, _dir) = create_store();
        let created = store
            .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
            .unwrap();
        let TicketInsert::Created { ticket, .. } = created else {
            panic!("should create");
        };

        let note = NewComment {
            company_id: 1,
            ticket_id: ticket.id,
            content: "checking with the vendor".to_string(),
            is_internal: true,
            is_system: false,
            provider_message_id: None,
        };
        assert!(store.create_comment(note.clone()).unwrap().is_some());
        assert!(store.create_comment(note).unwrap().is_some());
        assert_eq!(store.comments_for_ticket(ticket.id).unwrap().len(), 2);
    }

    #[test]
    fn test_touch_thread() {
        let (store, _dir) = create_store();
        let created = store
            .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
            .unwrap();
        let TicketInsert::Created { thread, .. } = created else {
            panic!("should create");
        };

        let later = Utc::now();
        store.touch_thread(thread.id, "m5", later).unwrap();

        let loaded = store.thread_by_provider_id(1, "thr-1").unwrap().unwrap();
        assert_eq!(loaded.last_message_id.as_deref(), Some("m5"));
    }

    #[test]
    fn test_first_active_admin_order() {
        let (store, _dir) = create_store();
        store
            .add_membership(&Membership::new(1, 50, MemberRole::Agent))
            .unwrap();
        store
            .add_membership(&Membership::new(1, 51, MemberRole::Admin).with_active(false))
            .unwrap();
        store
            .add_membership(&Membership::new(1, 52, MemberRole::Admin))
            .unwrap();
        store
            .add_membership(&Membership::new(1, 53, MemberRole::Admin))
            .unwrap();

        assert_eq!(store.first_active_admin(1).unwrap(), Some(52));
        assert_eq!(store.first_active_admin(2).unwrap(), None);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("helpdesk.db");

        let integration_id;
        {
            let store = SqliteHelpdeskStore::new(&path).unwrap();
            let stored = store
                .add_integration(
                    &MailIntegration::new(1, "support@acme.test").with_history_id("77"),
                )
                .unwrap();
            integration_id = stored.id;
            store
                .create_ticket_with_thread(sample_ticket(1), sample_thread(1, "thr-1"))
                .unwrap();
        }

        let store = SqliteHelpdeskStore::new(&path).unwrap();
        let integration = store.integration(integration_id).unwrap().unwrap();
        assert_eq!(integration.last_history_id.as_deref(), Some("77"));

        let thread = store.thread_by_provider_id(1, "thr-1").unwrap().unwrap();
        assert_eq!(thread.participants.len(), 2);
        let ticket = store.ticket(thread.ticket_id).unwrap().unwrap();
        assert_eq!(ticket.subject, "Printer trouble");
        assert_eq!(ticket.customer_name.as_deref(), Some("Alice"));
    }
}
