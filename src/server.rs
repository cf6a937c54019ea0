//! HTTP server: the LINE webhook endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tracing::{debug, error, info, warn};

use crate::chatbot::{ChatbotEngine, EngineError, Sender};
use crate::line::client::{self, LineApi};
use crate::line::signature::{self, SIGNATURE_HEADER};
use crate::line::webhook::{Source, WebhookPayload};

/// First reply line when the sender is not an identifiable user.
pub const UNKNOWN_USER_NOTICE: &str = "ユーザー情報を取得できませんでした。";

pub struct AppState {
    pub channel_secret: String,
    pub engine: ChatbotEngine,
    pub line: Arc<dyn LineApi>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(bind: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await
}

async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, WebhookError> {
    let sig = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    debug!("Request body: {}", String::from_utf8_lossy(&body));

    if !signature::verify(&state.channel_secret, &body, sig) {
        warn!("Rejected webhook with invalid signature");
        return Err(WebhookError::InvalidSignature);
    }

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(WebhookError::Payload)?;
    debug!("{} event(s) for {:?}", payload.events.len(), payload.destination);

    for event in &payload.events {
        let Some((reply_token, source, text)) = event.as_text_message() else {
            continue;
        };

        let messages = match source {
            Source::User { user_id } => {
                let profile = state
                    .line
                    .get_profile(user_id)
                    .await
                    .map_err(WebhookError::Line)?;
                let text_preview: String = text.chars().take(100).collect();
                info!(
                    "📨 Message from {} ({}): \"{text_preview}\"",
                    profile.display_name, user_id
                );

                let sender = Sender {
                    user_id: user_id.clone(),
                    display_name: profile.display_name,
                };
                state
                    .engine
                    .respond(&sender, text)
                    .await
                    .map_err(WebhookError::Engine)?
            }
            _ => {
                info!("Message from non-user source, sending notice");
                vec![UNKNOWN_USER_NOTICE.to_string(), format!("メッセージ：{text}")]
            }
        };

        state
            .line
            .reply(reply_token, &messages)
            .await
            .map_err(WebhookError::Line)?;
    }

    Ok("OK")
}

/// Errors surfaced by the webhook endpoint.
#[derive(Debug)]
pub enum WebhookError {
    MissingSignature,
    InvalidSignature,
    Payload(serde_json::Error),
    Line(client::Error),
    Engine(EngineError),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "missing {SIGNATURE_HEADER} header"),
            Self::InvalidSignature => write!(
                f,
                "Invalid signature. Please check your channel access token/channel secret."
            ),
            Self::Payload(e) => write!(f, "malformed webhook payload: {e}"),
            Self::Line(e) => write!(f, "LINE API call failed: {e}"),
            Self::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WebhookError {}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingSignature | Self::InvalidSignature => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            other => {
                error!("Webhook handling failed: {other}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
