//! In-memory storage implementation
//!
//! Used for testing and as a stub where no database is wanted. All tables
//! live behind one RwLock so the ticket-with-thread insert is atomic.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{HelpdeskStore, TicketInsert};
use crate::models::{
    Client, EmailThread, MailIntegration, Membership, NewComment, NewEmailThread, NewTicket,
    Ticket, TicketComment, TicketStatus,
};

#[derive(Default)]
struct Inner {
    integrations: HashMap<i64, MailIntegration>,
    clients: HashMap<i64, Client>,
    memberships: HashMap<i64, Membership>,
    tickets: HashMap<i64, Ticket>,
    comments: HashMap<i64, TicketComment>,
    threads: HashMap<i64, EmailThread>,
    /// Index: (company_id, provider_thread_id) -> thread id
    thread_index: HashMap<(i64, String), i64>,
    /// Index: (company_id, provider_message_id) pairs already ingested
    message_index: HashSet<(i64, String)>,
    next_integration_id: i64,
    next_client_id: i64,
    next_membership_id: i64,
    next_ticket_id: i64,
    next_comment_id: i64,
    next_thread_id: i64,
}

/// In-memory implementation of [`HelpdeskStore`]
#[derive(Default)]
pub struct InMemoryHelpdeskStore {
    inner: RwLock<Inner>,
}

impl InMemoryHelpdeskStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl HelpdeskStore for InMemoryHelpdeskStore {
    fn add_integration(&self, integration: &MailIntegration) -> Result<MailIntegration> {
        let mut inner = self.inner.write().unwrap();
        inner.next_integration_id += 1;
        let mut stored = integration.clone();
        stored.id = inner.next_integration_id;
        inner.integrations.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn integration(&self, id: i64) -> Result<Option<MailIntegration>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.integrations.get(&id).cloned())
    }

    fn integration_by_mailbox(&self, mailbox: &str) -> Result<Option<MailIntegration>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .integrations
            .values()
            .find(|i| i.mailbox == mailbox)
            .cloned())
    }

    fn integrations_for_sweep(&self) -> Result<Vec<MailIntegration>> {
        let inner = self.inner.read().unwrap();
        let mut integrations: Vec<MailIntegration> = inner
            .integrations
            .values()
            .filter(|i| i.is_active && i.auto_sync_enabled && i.auto_create_tickets)
            .cloned()
            .collect();
        integrations.sort_by_key(|i| i.id);
        Ok(integrations)
    }

    fn advance_history_id(&self, integration_id: i64, history_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let integration = inner
            .integrations
            .get_mut(&integration_id)
            .ok_or_else(|| anyhow::anyhow!("Integration {} not found", integration_id))?;
        integration.last_history_id = Some(history_id.to_string());
        Ok(())
    }

    fn advance_last_sync(&self, integration_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let integration = inner
            .integrations
            .get_mut(&integration_id)
            .ok_or_else(|| anyhow::anyhow!("Integration {} not found", integration_id))?;
        integration.last_sync_at = Some(at);
        Ok(())
    }

    fn update_tokens(
        &self,
        integration_id: i64,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let integration = inner
            .integrations
            .get_mut(&integration_id)
            .ok_or_else(|| anyhow::anyhow!("Integration {} not found", integration_id))?;
        integration.access_token = Some(access_token.to_string());
        integration.token_expires_at = expires_at;
        Ok(())
    }

    fn add_client(&self, client: &Client) -> Result<Client> {
        let mut inner = self.inner.write().unwrap();
        inner.next_client_id += 1;
        let mut stored = client.clone();
        stored.id = inner.next_client_id;
        inner.clients.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn active_clients(&self, company_id: i64) -> Result<Vec<Client>> {
        let inner = self.inner.read().unwrap();
        let mut clients: Vec<Client> = inner
            .clients
            .values()
            .filter(|c| c.company_id == company_id && c.is_active)
            .cloned()
            .collect();
        clients.sort_by_key(|c| c.id);
        Ok(clients)
    }

    fn add_membership(&self, membership: &Membership) -> Result<Membership> {
        let mut inner = self.inner.write().unwrap();
        inner.next_membership_id += 1;
        let mut stored = membership.clone();
        stored.id = inner.next_membership_id;
        inner.memberships.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn first_active_admin(&self, company_id: i64) -> Result<Option<i64>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .memberships
            .values()
            .filter(|m| {
                m.company_id == company_id
                    && m.is_active
                    && m.role == crate::models::MemberRole::Admin
            })
            .min_by_key(|m| m.id)
            .map(|m| m.user_id))
    }

    fn thread_by_provider_id(
        &self,
        company_id: i64,
        provider_thread_id: &str,
    ) -> Result<Option<EmailThread>> {
        let inner = self.inner.read().unwrap();
        let key = (company_id, provider_thread_id.to_string());
        Ok(inner
            .thread_index
            .get(&key)
            .and_then(|id| inner.threads.get(id))
            .cloned())
    }

    fn touch_thread(&self, thread_id: i64, last_message_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let thread = inner
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| anyhow::anyhow!("Thread {} not found", thread_id))?;
        thread.last_message_id = Some(last_message_id.to_string());
        thread.updated_at = at;
        Ok(())
    }

    fn create_ticket_with_thread(
        &self,
        ticket: NewTicket,
        thread: NewEmailThread,
    ) -> Result<TicketInsert> {
        let mut inner = self.inner.write().unwrap();

        let key = (thread.company_id, thread.provider_thread_id.clone());
        if let Some(existing) = inner
            .thread_index
            .get(&key)
            .and_then(|id| inner.threads.get(id))
        {
            return Ok(TicketInsert::Conflict {
                thread: existing.clone(),
            });
        }

        let now = Utc::now();
        inner.next_ticket_id += 1;
        let stored_ticket = Ticket {
            id: inner.next_ticket_id,
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
        };

        inner.next_thread_id += 1;
        let stored_thread = EmailThread {
            id: inner.next_thread_id,
            company_id: thread.company_id,
            ticket_id: stored_ticket.id,
            provider_thread_id: thread.provider_thread_id,
            subject: thread.subject,
            participants: thread.participants,
            last_message_id: thread.last_message_id,
            created_at: now,
            updated_at: now,
        };

        inner.tickets.insert(stored_ticket.id, stored_ticket.clone());
        inner.thread_index.insert(key, stored_thread.id);
        inner.threads.insert(stored_thread.id, stored_thread.clone());

        // The founding message is absorbed into the ticket's description,
        // not a comment row, so it needs its own ingestion marker
        if let Some(message_id) = &stored_thread.last_message_id {
            inner
                .message_index
                .insert((stored_thread.company_id, message_id.clone()));
        }

        Ok(TicketInsert::Created {
            ticket: stored_ticket,
            thread: stored_thread,
        })
    }

    fn ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.tickets.get(&id).cloned())
    }

    fn tickets_for_company(&self, company_id: i64) -> Result<Vec<Ticket>> {
        let inner = self.inner.read().unwrap();
        let mut tickets: Vec<Ticket> = inner
            .tickets
            .values()
            .filter(|t| t.company_id == company_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }

    fn create_comment(&self, comment: NewComment) -> Result<Option<TicketComment>> {
        let mut inner = self.inner.write().unwrap();

        if let Some(message_id) = &comment.provider_message_id {
            let key = (comment.company_id, message_id.clone());
            if inner.message_index.contains(&key) {
                return Ok(None);
            }
            inner.message_index.insert(key);
        }

        inner.next_comment_id += 1;
        let stored = TicketComment {
            id: inner.next_comment_id,
            company_id: comment.company_id,
            ticket_id: comment.ticket_id,
            content: comment.content,
            is_internal: comment.is_internal,
            is_system: comment.is_system,
            provider_message_id: comment.provider_message_id,
            created_at: Utc::now(),
        };
        inner.comments.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    fn message_ingested(&self, company_id: i64, provider_message_id: &str) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        let key = (company_id, provider_message_id.to_string());
        Ok(inner.message_index.contains(&key))
    }

    fn comments_for_ticket(&self, ticket_id: i64) -> Result<Vec<TicketComment>> {
        let inner = self.inner.read().unwrap();
        let mut comments: Vec<TicketComment> = inner
            .comments
            .values()
            .filter(|c| c.ticket_id == ticket_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner::default();
        Ok(())
    }
}
