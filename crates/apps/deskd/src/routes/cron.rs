//! Scheduled sweep endpoint
//!
//! Deployed behind a scheduler (Cloud Scheduler, systemd timer, plain
//! curl in crontab) that POSTs with the shared bearer secret.

use axum::{Json, extract::State, http::HeaderMap, http::header};

use ingest::pipeline::SweepOutcome;

use crate::AppState;
use crate::error::ApiErr;

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiErr> {
    let Some(secret) = &state.cron_secret else {
        return Err(ApiErr::unauthorized("cron secret not configured"));
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    if provided != secret {
        return Err(ApiErr::unauthorized("invalid bearer token"));
    }

    Ok(())
}

/// POST /cron/ingest: sweep every syncing integration's unread window.
pub async fn run(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepOutcome>, ApiErr> {
    authorize(&state, &headers)?;

    let connect = crate::gmail_connector(state.store.clone(), state.credentials.clone());
    let store = state.store.clone();
    let mailer = state.mailer.clone();
    let now = chrono::Utc::now();

    let outcome = tokio::task::spawn_blocking(move || {
        ingest::run_sweep(store.as_ref(), mailer.as_ref(), now, connect)
    })
    .await
    .map_err(|e| ApiErr::internal("Sweep task failed", e))?
    .map_err(|e| ApiErr::internal("Sweep failed", format!("{e:#}")))?;

    Ok(Json(outcome))
}
