//! Outbound message delivery over the Graph API.

use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const GRAPH_API_VERSION: &str = "v21.0";

/// Errors surfaced while delivering messages.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// Building the underlying HTTP client failed.
    #[error("failed to build messenger client: {0}")]
    Client(#[source] reqwest::Error),
    /// The transport failed before a response arrived.
    #[error("message delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The Graph API answered with a non-success status.
    #[error("graph API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// Thin Graph API client for direct-message replies. Retry policy is the
/// platform's concern; every call here is a single attempt.
pub struct Messenger {
    client: Client,
    base_url: String,
    access_token: String,
}

impl Messenger {
    /// Builds a messenger against the production Graph API.
    pub fn new(access_token: String) -> Result<Self, MessengerError> {
        Self::with_base_url(
            access_token,
            format!("https://graph.facebook.com/{GRAPH_API_VERSION}"),
        )
    }

    /// Builds a messenger against a custom Graph endpoint (used by tests).
    pub fn with_base_url(access_token: String, base_url: String) -> Result<Self, MessengerError> {
        let client = Client::builder().build().map_err(MessengerError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Sends a text reply to a user.
    pub async fn send_message(&self, recipient_id: &str, text: &str) -> Result<(), MessengerError> {
        let body = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text },
        });
        self.post_messages(&body).await?;
        debug!(%recipient_id, "reply delivered");
        Ok(())
    }

    /// Shows the typing indicator to a user while an answer is prepared.
    pub async fn send_typing_indicator(&self, recipient_id: &str) -> Result<(), MessengerError> {
        let body = json!({
            "recipient": { "id": recipient_id },
            "sender_action": "typing_on",
        });
        self.post_messages(&body).await
    }

    /// Marks the user's last message as seen.
    pub async fn mark_seen(&self, sender_id: &str) -> Result<(), MessengerError> {
        let body = json!({
            "recipient": { "id": sender_id },
            "sender_action": "mark_seen",
        });
        self.post_messages(&body).await
    }

    async fn post_messages(&self, body: &serde_json::Value) -> Result<(), MessengerError> {
        let url = format!("{}/me/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(MessengerError::Api { status, body });
        }
        Ok(())
    }
}
