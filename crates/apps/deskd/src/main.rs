//! deskd - Helpdesk mail ingestion daemon
//!
//! Exposes the Gmail push webhook and the scheduled sweep trigger over
//! HTTP, wiring the ingest pipeline to SQLite storage and outbound SMTP
//! acknowledgments.

mod error;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use log::{error, info, warn};

use ingest::source::MailSource;
use ingest::storage::{HelpdeskStore, SqliteHelpdeskStore};
use ingest::{GmailClient, GoogleCredentials, MailIntegration, Mailer, NoopMailer, SmtpMailer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HelpdeskStore>,
    pub mailer: Arc<dyn Mailer>,
    pub credentials: Option<GoogleCredentials>,
    pub cron_secret: Option<String>,
}

/// Connector handed to the pipeline: builds a Gmail client for one
/// integration and persists any refreshed access token.
///
/// Credentials are checked when the pipeline actually needs the provider,
/// so lookups and checkpoint seeding still work on a half-configured
/// deployment.
pub fn gmail_connector(
    store: Arc<dyn HelpdeskStore>,
    credentials: Option<GoogleCredentials>,
) -> impl Fn(&MailIntegration) -> anyhow::Result<Box<dyn MailSource>> {
    move |integration: &MailIntegration| {
        let credentials = credentials
            .as_ref()
            .context("Google OAuth credentials not configured")?;
        let connection = GmailClient::connect(credentials, integration)?;
        if let Some(token) = &connection.refreshed {
            store.update_tokens(integration.id, &token.secret, token.expires_at)?;
        }
        Ok(Box::new(connection.client) as Box<dyn MailSource>)
    }
}

/// Build the SMTP mailer from environment variables, or fall back to the
/// no-op mailer that only logs.
fn load_mailer() -> Arc<dyn Mailer> {
    let Some(host) = std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()) else {
        warn!("SMTP_HOST not set; acknowledgment mail will be logged, not sent");
        return Arc::new(NoopMailer);
    };

    let from = std::env::var("SMTP_FROM")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("helpdesk@{host}"));

    let mailer = match (std::env::var("SMTP_USER"), std::env::var("SMTP_PASS")) {
        (Ok(user), Ok(pass)) if !user.is_empty() => {
            SmtpMailer::new(&host, &from).with_credentials(&user, &pass)
        }
        _ => {
            warn!("SMTP_USER/SMTP_PASS not set; connecting to {host} without authentication");
            SmtpMailer::new(&host, &from)
        }
    };

    info!("Outbound mail via {host} as {from}");
    Arc::new(mailer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    // Data directory
    let data_dir = std::env::var("DESKD_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    std::fs::create_dir_all(&data_dir)?;
    info!("Data directory: {}", data_dir.display());

    let store = SqliteHelpdeskStore::new(data_dir.join("helpdesk.db"))?;
    info!("Database initialized");

    // Load Gmail credentials from config file or environment
    let credentials = match GoogleCredentials::load() {
        Ok(creds) => Some(creds),
        Err(e) => {
            warn!("Gmail credentials not found: {}", e);
            if let Some(path) = GoogleCredentials::default_credentials_path() {
                warn!(
                    "To configure Gmail access, either:\n\
                     1. Place your Google OAuth credentials at: {}\n\
                     2. Or set environment variables: GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
                    path.display()
                );
            }
            None
        }
    };

    let cron_secret = std::env::var("CRON_SECRET").ok().filter(|s| !s.is_empty());
    if cron_secret.is_none() {
        warn!("CRON_SECRET not set; the sweep endpoint will reject all requests");
    }

    let state = AppState {
        store: Arc::new(store),
        mailer: load_mailer(),
        credentials,
        cron_secret,
    };

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/hooks/gmail",
            post(routes::webhook::receive).get(routes::webhook::liveness),
        )
        .route("/cron/ingest", post(routes::cron::run))
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!("deskd listening on port {port}");
    axum::serve(listener, app).await?;

    Ok(())
}
