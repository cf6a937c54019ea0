//! Inbound webhook payload.
//!
//! Only the fields the bot reads are modelled. Unknown event and message
//! types deserialize to catch-all variants and are skipped. So are
//! message events without a reply token, which LINE sends to channels
//! in standby mode.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Message {
        #[serde(default)]
        reply_token: Option<String>,
        source: Source,
        message: MessageContent,
    },
    #[serde(other)]
    Other,
}

/// Where an event came from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Source {
    #[serde(rename_all = "camelCase")]
    User { user_id: String },
    #[serde(rename_all = "camelCase")]
    Group {
        group_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Room {
        room_id: String,
        #[serde(default)]
        user_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl Event {
    /// `(reply_token, source, text)` for text messages, `None` otherwise.
    pub fn as_text_message(&self) -> Option<(&str, &Source, &str)> {
        match self {
            Event::Message {
                reply_token,
                source,
                message: MessageContent::Text { text },
            } => Some((reply_token.as_deref()?, source, text.as_str())),
            _ => None,
        }
    }
}
