//! OAuth2 token handling for Gmail integrations
//!
//! Tokens are minted fresh per connection from the integration's stored
//! refresh token. There is no shared token cache; each pipeline run builds
//! its own client from explicit credentials.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::config::GoogleCredentials;
use crate::models::MailIntegration;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Seconds of validity a stored access token must still have to be reused
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Error indicating the provider rejected the integration's credentials
#[derive(Debug, thiserror::Error)]
#[error("Mailbox authorization failed: {0}")]
pub struct AuthError(pub String);

/// A freshly minted access token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Return the stored access token when it is still comfortably valid
fn fresh_stored_token(integration: &MailIntegration, now: DateTime<Utc>) -> Option<&str> {
    let token = integration.access_token.as_deref()?;
    let expires_at = integration.token_expires_at?;
    (expires_at.timestamp() > now.timestamp() + EXPIRY_BUFFER_SECS).then_some(token)
}

/// Return a usable bearer token for the integration, refreshing when the
/// stored one is missing, near expiry, or of unknown age. The second element
/// carries a newly minted token the caller should persist.
pub(crate) fn obtain_token(
    agent: &ureq::Agent,
    credentials: &GoogleCredentials,
    integration: &MailIntegration,
) -> Result<(String, Option<AccessToken>)> {
    if let Some(token) = fresh_stored_token(integration, Utc::now()) {
        return Ok((token.to_string(), None));
    }

    let refresh_token = integration
        .refresh_token
        .as_deref()
        .ok_or_else(|| AuthError(format!("no refresh token for {}", integration.mailbox)))?;

    let minted = refresh_access_token(agent, credentials, refresh_token)?;
    Ok((minted.secret.clone(), Some(minted)))
}

/// Exchange a refresh token for a new access token
fn refresh_access_token(
    agent: &ureq::Agent,
    credentials: &GoogleCredentials,
    refresh_token: &str,
) -> Result<AccessToken> {
    let response = agent.post(TOKEN_URL).send_form([
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ]);

    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(code)) if code == 400 || code == 401 => {
            return Err(AuthError(format!("token refresh rejected ({code})")).into());
        }
        Err(e) => return Err(e).context("Failed to refresh access token"),
    };

    let token: TokenResponse = response
        .into_body()
        .read_json()
        .context("Failed to parse token refresh response")?;

    Ok(AccessToken {
        secret: token.access_token,
        expires_at: token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
    })
}
