use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::chatbot::history::{Role, Turn};

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            temperature: 0.5,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Anything that can turn a conversation into the next assistant message.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, turns: &[Turn], params: &CompletionParams) -> Result<String, Error>;
}

/// Azure OpenAI chat-completions client.
pub struct AzureOpenAiClient {
    endpoint: String,
    api_key: String,
    api_version: String,
    deployment: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl AzureOpenAiClient {
    pub fn new(
        endpoint: String,
        api_key: String,
        api_version: String,
        deployment: String,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            api_version,
            deployment,
            http,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        )
    }
}

#[async_trait]
impl CompletionProvider for AzureOpenAiClient {
    async fn complete(&self, turns: &[Turn], params: &CompletionParams) -> Result<String, Error> {
        let request = ApiRequest {
            messages: turns
                .iter()
                .map(|t| ApiMessage {
                    role: role_str(t.role),
                    content: &t.content,
                })
                .collect(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        };

        debug!("Requesting completion for {} turns", turns.len());

        let response = self
            .http
            .post(self.url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        first_choice_text(api_response)
    }
}

fn first_choice_text(response: ApiResponse) -> Result<String, Error> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(Error::Empty)
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = CompletionParams::default();
        assert_eq!(params.max_tokens, 100);
        assert_eq!(params.temperature, 0.5);
        assert_eq!(params.frequency_penalty, 0.0);
        assert_eq!(params.presence_penalty, 0.0);
    }

    #[test]
    fn test_request_body_shape() {
        let turns = vec![Turn::system("be nice"), Turn::user("hi")];
        let params = CompletionParams::default();
        let request = ApiRequest {
            messages: turns
                .iter()
                .map(|t| ApiMessage { role: role_str(t.role), content: &t.content })
                .collect(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_takes_first_choice() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"first"}},
                           {"message":{"role":"assistant","content":"second"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "first");
    }

    #[test]
    fn test_null_content_is_empty() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert!(matches!(first_choice_text(response), Err(Error::Empty)));
    }

    #[test]
    fn test_no_choices_is_empty() {
        let response: ApiResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(matches!(first_choice_text(response), Err(Error::Empty)));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = AzureOpenAiClient::new(
            "https://example.openai.azure.com/".into(),
            "key".into(),
            "2024-02-01".into(),
            "gpt-4o".into(),
            None,
        )
        .unwrap();
        assert_eq!(
            client.url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions"
        );
    }
}
