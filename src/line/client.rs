//! LINE Messaging API client using reqwest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const API_BASE: &str = "https://api.line.me/v2/bot";

/// A LINE user's public profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Outbound calls the webhook handler makes.
#[async_trait]
pub trait LineApi: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, Error>;

    /// Answer an event with its one-time reply token. Messages are sent in order.
    async fn reply(&self, reply_token: &str, messages: &[String]) -> Result<(), Error>;
}

/// LINE API client.
pub struct LineClient {
    access_token: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl LineClient {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            base_url: API_BASE.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LineApi for LineClient {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, Error> {
        let response = self
            .http
            .get(format!("{}/profile/{}", self.base_url, user_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let msg = format!("{status}: {body}");
            warn!("Failed to get profile for {user_id}: {msg}");
            return Err(Error::Api(msg));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    async fn reply(&self, reply_token: &str, messages: &[String]) -> Result<(), Error> {
        let request = ReplyRequest {
            reply_token,
            messages: messages
                .iter()
                .map(|text| TextMessage { kind: "text", text })
                .collect(),
        };

        let response = self
            .http
            .post(format!("{}/message/reply", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let msg = format!("{status}: {body}");
            warn!("Failed to reply: {msg}");
            return Err(Error::Api(msg));
        }

        info!("💬 Sent {} message(s)", messages.len());
        Ok(())
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
