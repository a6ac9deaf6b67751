//! Inbound webhook payloads and signature verification.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Top-level webhook delivery. Parsing fails fast on payloads that do not
/// match this shape instead of propagating missing fields downstream.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    /// Platform object the delivery concerns (e.g. `"instagram"`).
    pub object: String,
    /// Delivery entries; absent means none.
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

/// One delivery entry holding messaging events.
#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    /// Messaging events; absent means none.
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// One messaging event. Events without a text message (reactions, reads,
/// attachments) carry no `message.text` and are skipped by the extraction
/// helper.
#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    /// Message author.
    pub sender: Participant,
    /// Message payload when the event is a message.
    #[serde(default)]
    pub message: Option<MessagePayload>,
}

/// A conversation participant.
#[derive(Debug, Deserialize)]
pub struct Participant {
    /// Platform-scoped participant id.
    pub id: String,
}

/// The message body of a messaging event.
#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    /// Text content, when the message is textual.
    #[serde(default)]
    pub text: Option<String>,
}

/// A text message addressed to the bot, borrowed from a parsed event.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage<'a> {
    /// Sender to reply to.
    pub sender_id: &'a str,
    /// The question text.
    pub text: &'a str,
}

impl WebhookEvent {
    /// Parses a raw delivery body.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Iterates over the text messages contained in this delivery, skipping
    /// events without text.
    pub fn text_messages(&self) -> impl Iterator<Item = InboundMessage<'_>> {
        self.entry
            .iter()
            .flat_map(|entry| entry.messaging.iter())
            .filter_map(|event| {
                let text = event.message.as_ref()?.text.as_deref()?;
                Some(InboundMessage {
                    sender_id: event.sender.id.as_str(),
                    text,
                })
            })
    }
}

/// Verifies an `X-Hub-Signature-256` header against the raw request body.
///
/// The header carries `sha256=` followed by the hex HMAC-SHA256 of the body
/// under the app secret. Comparison is constant-time. Any malformed header
/// fails verification.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> bool {
    let Some(hex_signature) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature) = hex::decode(hex_signature) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}
