//! Gmail API HTTP client
//!
//! Provides methods for fetching history records and messages from the
//! Gmail API. Uses synchronous HTTP (ureq) to be executor-agnostic.
//!
//! A client is built per pipeline run from one integration's stored
//! credentials; nothing here is shared or cached across runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

use super::api::{GmailMessage, HistoryResponse, ListMessagesResponse, MessageRef};
use super::auth::{self, AccessToken};
use crate::config::GoogleCredentials;
use crate::models::MailIntegration;
use crate::source::MailSource;

/// Error indicating the history cursor has expired
#[derive(Debug, thiserror::Error)]
#[error("History cursor expired or invalid")]
pub struct HistoryExpiredError;

/// Gmail API client bound to one mailbox's access token
pub struct GmailClient {
    agent: ureq::Agent,
    access_token: String,
}

/// Result of connecting to a mailbox: the client, plus the freshly minted
/// access token when a refresh happened so the caller can persist it.
pub struct GmailConnection {
    pub client: GmailClient,
    pub refreshed: Option<AccessToken>,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Connect to an integration's mailbox.
    ///
    /// Reuses the stored access token when it is still comfortably valid,
    /// otherwise exchanges the refresh token for a new one.
    pub fn connect(
        credentials: &GoogleCredentials,
        integration: &MailIntegration,
    ) -> Result<GmailConnection> {
        let agent = api_agent();
        let (access_token, refreshed) = auth::obtain_token(&agent, credentials, integration)?;
        Ok(GmailConnection {
            client: GmailClient {
                agent,
                access_token,
            },
            refreshed,
        })
    }

    /// List one page of history records since a given history cursor
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` if the cursor is too old (404 from Gmail)
    fn list_history(
        &self,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            Self::BASE_URL,
            urlencoding::encode(start_history_id)
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", self.access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let history: HistoryResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response")?;
                Ok(history)
            }
            Err(ureq::Error::StatusCode(404)) => {
                // History cursor expired or invalid
                Err(HistoryExpiredError.into())
            }
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }

    /// List one page of unread messages received after `since`
    fn list_unread(&self, since: DateTime<Utc>, max_results: usize) -> Result<ListMessagesResponse> {
        let query = format!("is:unread after:{}", since.timestamp());
        let url = format!(
            "{}/users/me/messages?maxResults={}&q={}",
            Self::BASE_URL,
            max_results.min(500),
            urlencoding::encode(&query)
        );

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", self.access_token))
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    /// Get full message details by ID
    fn get_message(&self, id: &str) -> Result<GmailMessage> {
        let url = format!("{}/users/me/messages/{}?format=full", Self::BASE_URL, id);

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", self.access_token))
            .call()
            .context("Failed to send get message request")?;

        let message: GmailMessage = response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")?;

        Ok(message)
    }

    /// Get a message with exponential backoff retry
    fn get_message_with_retry(&self, id: &str, max_retries: u32) -> Result<GmailMessage> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..max_retries {
            match self.get_message(id) {
                Ok(msg) => return Ok(msg),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries - 1 {
                        // Add jitter to delay
                        let jitter = Duration::from_millis(rand_jitter());
                        std::thread::sleep(delay + jitter);
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Failed to fetch message {}", id)))
    }
}

impl MailSource for GmailClient {
    /// List all messages added since the cursor, oldest first, deduplicated.
    ///
    /// Handles pagination; a message referenced by several history records
    /// is returned once.
    fn history_since(&self, start_history_id: &str) -> Result<Vec<MessageRef>> {
        let mut added = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token = None;

        loop {
            let response = self.list_history(start_history_id, page_token.as_deref())?;

            for record in response.history.unwrap_or_default() {
                for entry in record.messages_added.unwrap_or_default() {
                    if seen.insert(entry.message.id.clone()) {
                        added.push(entry.message);
                    }
                }
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(added)
    }

    fn unread_messages(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MessageRef>> {
        let list = self.list_unread(since, limit)?;
        let mut messages = list.messages.unwrap_or_default();
        messages.truncate(limit);
        Ok(messages)
    }

    fn fetch_message(&self, id: &str) -> Result<GmailMessage> {
        self.get_message_with_retry(id, 3)
    }
}

/// Agent with a global timeout so a stalled provider call cannot wedge a run
fn api_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(30)))
        .build()
        .into()
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
