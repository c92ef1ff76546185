//! Gmail push notification endpoint
//!
//! Google Pub/Sub wraps the Gmail notification in a push envelope whose
//! `message.data` field is the base64-encoded notification JSON. Anything
//! that does not decode to `{emailAddress, historyId}` is a 400; processing
//! failures are 500 so Pub/Sub redelivers.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use ingest::pipeline::Notification;

use crate::AppState;
use crate::error::ApiErr;

/// Pub/Sub push delivery wrapper
#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    /// Base64-encoded notification payload
    data: Option<String>,
}

/// The notification Gmail serializes into `message.data`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailNotification {
    email_address: String,
    history_id: HistoryId,
}

/// Gmail sends historyId as a JSON number; tolerate strings too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryId {
    Num(u64),
    Str(String),
}

impl HistoryId {
    fn into_string(self) -> String {
        match self {
            HistoryId::Num(n) => n.to_string(),
            HistoryId::Str(s) => s,
        }
    }
}

/// Unwrap the push envelope down to the notification it carries.
fn parse_envelope(body: &Value) -> Result<Notification, String> {
    let envelope: PushEnvelope = serde_json::from_value(body.clone())
        .map_err(|_| "invalid Pub/Sub envelope".to_string())?;

    let data = envelope
        .message
        .data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| "envelope has no message data".to_string())?;

    let decoded = ingest::decode::decode_base64(&data)
        .ok_or_else(|| "message data is not valid base64".to_string())?;

    let notification: GmailNotification = serde_json::from_str(&decoded)
        .map_err(|_| "message data is not a Gmail notification".to_string())?;

    Ok(Notification {
        mailbox: notification.email_address,
        history_id: notification.history_id.into_string(),
    })
}

/// POST /hooks/gmail: ingest everything a push notification announces.
pub async fn receive(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiErr> {
    let notification = parse_envelope(&body).map_err(ApiErr::bad_request)?;

    log::info!(
        "Push notification for {} at history {}",
        notification.mailbox,
        notification.history_id
    );

    let connect = crate::gmail_connector(state.store.clone(), state.credentials.clone());
    let store = state.store.clone();
    let mailer = state.mailer.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        ingest::process_notification(store.as_ref(), mailer.as_ref(), &notification, connect)
    })
    .await
    .map_err(|e| ApiErr::internal("Webhook task failed", e))?
    .map_err(|e| ApiErr::internal("Webhook processing failed", format!("{e:#}")))?;

    Ok(Json(json!({
        "status": outcome.status.as_str(),
        "messagesSeen": outcome.stats.messages_seen,
        "ticketsCreated": outcome.stats.tickets_created,
        "commentsAdded": outcome.stats.comments_added,
        "errors": outcome.stats.errors,
    })))
}

/// GET /hooks/gmail: liveness probe for the push subscription.
pub async fn liveness() -> Json<Value> {
    Json(json!({
        "status": "listening",
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}
