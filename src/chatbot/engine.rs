//! Chatbot engine - decides how each incoming text gets answered.
//!
//! Order of checks, first match wins:
//! 1. exact reset keyword: the sender's conversation is reset
//! 2. FAQ trigger substring: canned answer from the FAQ table
//! 3. anything else: delegated to the completion provider

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chatbot::faq::{is_faq_trigger, FaqTable};
use crate::chatbot::history::{ConversationStore, Turn, DEFAULT_MAX_CONVERSATIONS};
use crate::llm::{CompletionParams, CompletionProvider};

/// Messages that wipe the sender's conversation. Exact match only.
pub const RESET_KEYWORDS: [&str; 5] = ["リセット", "初期化", "クリア", "reset", "clear"];

pub const RESET_CONFIRMATION: &str = "チャットをリセットしました。";

/// System turn inserted on reset.
pub const ONBOARDING_PROMPT: &str = "UNISON SQUARE GARDENについて何でも聞いてな！\n\
例えばこんな質問ができるで:\n\
- メンバーは誰？\n\
- 代表曲を教えて！\n\
- デビューしたのはいつ？\n\
- 最新アルバムは？\n\
- ライブ情報を教えて！\n";

pub const DEFAULT_MAX_TURNS: usize = 20;

/// Who sent the message being answered.
#[derive(Debug, Clone)]
pub struct Sender {
    /// Stable platform user ID, used as the conversation key.
    pub user_id: String,
    pub display_name: String,
}

/// Chatbot configuration.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    /// Cap on non-system turns kept per user.
    pub max_turns: usize,
    /// Start new conversations with the onboarding system turn.
    pub onboard_new_conversations: bool,
    /// Cap on how many users' conversations are kept at once.
    pub max_conversations: usize,
    pub params: CompletionParams,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            onboard_new_conversations: false,
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
            params: CompletionParams::default(),
        }
    }
}

/// The chatbot engine.
pub struct ChatbotEngine {
    config: ChatbotConfig,
    faq: FaqTable,
    conversations: ConversationStore,
    model: Arc<dyn CompletionProvider>,
}

impl ChatbotEngine {
    pub fn new(config: ChatbotConfig, faq: FaqTable, model: Arc<dyn CompletionProvider>) -> Self {
        let seed = config
            .onboard_new_conversations
            .then(|| ONBOARDING_PROMPT.to_string());
        let conversations = ConversationStore::new(seed, config.max_conversations);
        Self {
            config,
            faq,
            conversations,
            model,
        }
    }

    /// Produce the reply texts for one incoming message.
    pub async fn respond(&self, sender: &Sender, text: &str) -> Result<Vec<String>, EngineError> {
        if RESET_KEYWORDS.contains(&text) {
            self.conversations.reset(&sender.user_id, ONBOARDING_PROMPT).await;
            info!("🔄 Reset conversation for {} ({})", sender.display_name, sender.user_id);
            return Ok(vec![RESET_CONFIRMATION.to_string()]);
        }

        if is_faq_trigger(text) {
            let answer = self.faq.lookup(text);
            return Ok(vec![answer.to_string()]);
        }

        let reply = self.delegate(sender, text).await?;
        Ok(vec![reply])
    }

    /// Append the user turn, ask the model, append its answer.
    ///
    /// The stored conversation only changes once the model has answered;
    /// a failed call leaves it exactly as it was.
    async fn delegate(&self, sender: &Sender, text: &str) -> Result<String, EngineError> {
        let slot = self.conversations.slot(&sender.user_id);
        let mut conversation = slot.lock().await;

        let mut pending = conversation.clone();
        pending.push(Turn::user(text));
        let evicted = pending.enforce_window(self.config.max_turns);
        if evicted > 0 {
            debug!("Evicting {evicted} old turns for {}", sender.user_id);
        }

        debug!(
            "Delegating to model for {} ({} turns)",
            sender.display_name,
            pending.len()
        );

        let reply = match self.model.complete(pending.turns(), &self.config.params).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Completion failed for {}: {e}", sender.user_id);
                return Err(EngineError::Model(e));
            }
        };

        pending.push(Turn::assistant(reply.clone()));
        *conversation = pending;
        Ok(reply)
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }
}

#[derive(Debug)]
pub enum EngineError {
    Model(crate::llm::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Model(e) => write!(f, "model delegation failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Model(e) => Some(e),
        }
    }
}
