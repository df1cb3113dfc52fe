use crate::config::BackendConfig;
use crate::errors::MessagingError;
use crate::identity::Identity;
use crate::thread::Message;
use crate::utils::http::default_http_client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message row as the Backend Data Service serializes it.
///
/// The backend's `id` column holds the sender's user id, not a message
/// identifier; the rename isolates that wire quirk so the rest of the crate
/// only sees `sender_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    #[serde(rename = "id")]
    pub sender_id: String,
    #[serde(rename = "first_name", default)]
    pub sender_name: String,
    #[serde(rename = "for", default)]
    pub recipient_id: String,
    #[serde(rename = "message")]
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            recipient_id: row.recipient_id,
            body: row.body,
            sent_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserDetailRow {
    #[serde(default)]
    pub detailsid: String,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    messages: Option<Vec<MessageRow>>,
    #[serde(default, rename = "userDetails")]
    user_details: Vec<UserDetailRow>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    data: Vec<MessageRow>,
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    message: &'a str,
    #[serde(rename = "forId")]
    for_id: &'a str,
    first_name: &'a str,
}

/// Result of a full inbox fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub messages: Vec<Message>,
    /// Display name of the selected conversation partner, when the backend
    /// attaches it to the response.
    pub partner_display_name: Option<String>,
}

/// Result of a send attempt.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Message persisted; carries the authoritative updated thread, which
    /// replaces prior local thread state.
    Sent(Vec<Message>),
    /// Empty input: nothing was transmitted and no error is surfaced.
    Skipped,
}

/// Authenticated client for the chat endpoint of the Backend Data Service.
pub struct MessageStoreClient {
    http: reqwest::Client,
    chat_url: String,
}

impl MessageStoreClient {
    pub fn new(backend: &BackendConfig) -> Self {
        Self {
            http: default_http_client(),
            chat_url: format!(
                "{}{}",
                backend.base_url.trim_end_matches('/'),
                backend.chat_path
            ),
        }
    }

    /// Fetch every message where the caller is sender or recipient.
    ///
    /// A missing or `null` `messages` field counts as an empty set, matching
    /// the backend's behavior for users with no conversations yet.
    pub async fn fetch_all(&self, identity: &Identity) -> Result<FetchResult, MessagingError> {
        let response = self
            .http
            .get(&self.chat_url)
            .header("Authorization", &identity.user_id)
            .header("Append", &identity.username)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MessagingError::transport(
                Some(status.as_u16()),
                "message fetch failed",
            ));
        }

        let body: FetchResponse = response.json().await?;
        let messages = body
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(Message::from)
            .collect();
        let partner_display_name = body
            .user_details
            .into_iter()
            .map(|detail| detail.first_name)
            .find(|name| !name.is_empty());

        Ok(FetchResult {
            messages,
            partner_display_name,
        })
    }

    /// Persist a new message to `recipient_id`.
    ///
    /// Empty or whitespace-only text is a silent no-op: no request is made
    /// and `Skipped` is returned. The backend assigns `created_at` and
    /// answers with the updated thread.
    pub async fn send(
        &self,
        identity: &Identity,
        recipient_id: &str,
        display_name: &str,
        text: &str,
    ) -> Result<SendOutcome, MessagingError> {
        if text.trim().is_empty() {
            tracing::debug!("ignoring empty outbound message");
            return Ok(SendOutcome::Skipped);
        }

        let response = self
            .http
            .put(&self.chat_url)
            .header("Authorization", &identity.user_id)
            .json(&SendBody {
                message: text,
                for_id: recipient_id,
                first_name: display_name,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MessagingError::transport(
                Some(status.as_u16()),
                "message send failed",
            ));
        }

        let body: SendResponse = response.json().await?;
        Ok(SendOutcome::Sent(
            body.data.into_iter().map(Message::from).collect(),
        ))
    }
}
