//! Outbound acknowledgment mail
//!
//! When ingestion opens a ticket, the customer gets a short acknowledgment
//! so they know the request landed. Sending is best-effort: a failure is
//! logged by the caller and never blocks ingestion.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::models::Ticket;

/// A plain-text mail ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sender abstraction so the pipeline can be tested without SMTP
pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutboundMail) -> Result<()>;
}

/// Mailer that sends nothing. Used when no SMTP relay is configured.
pub struct NoopMailer;

impl Mailer for NoopMailer {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        log::debug!("Mail sending disabled, dropping mail to {}", mail.to);
        Ok(())
    }
}

/// SMTP mailer backed by lettre
pub struct SmtpMailer {
    host: String,
    from: String,
    credentials: Option<(String, String)>,
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            from: from.into(),
            credentials: None,
        }
    }

    /// Authenticate against the relay with username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutboundMail) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse().context("Invalid from address")?)
            .to(mail.to.parse().context("Invalid recipient address")?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .context("Failed to build mail")?;

        let transport = match &self.credentials {
            Some((username, password)) => SmtpTransport::relay(&self.host)
                .context("Failed to configure SMTP relay")?
                .credentials(Credentials::new(username.clone(), password.clone()))
                .build(),
            None => SmtpTransport::builder_dangerous(&self.host).build(),
        };

        transport
            .send(&email)
            .with_context(|| format!("Failed to send mail to {}", mail.to))?;

        log::info!("Sent acknowledgment to {}", mail.to);
        Ok(())
    }
}

/// Compose the acknowledgment for a freshly opened ticket
pub fn ticket_acknowledgment(ticket: &Ticket, mailbox: &str) -> OutboundMail {
    let greeting = match &ticket.customer_name {
        Some(name) => format!("Hello {},", name),
        None => "Hello,".to_string(),
    };

    OutboundMail {
        to: ticket.customer_email.clone(),
        subject: format!("[Ticket #{}] {}", ticket.id, ticket.subject),
        body: format!(
            "{greeting}\n\n\
             We received your message and opened ticket #{} to track it.\n\
             Reply to this email to add more detail; replies are attached to the same ticket.\n\n\
             -- \n\
             {mailbox}",
            ticket.id
        ),
    }
}
