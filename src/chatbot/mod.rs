//! Chatbot module - FAQ answers, conversation memory and model delegation.

pub mod engine;
pub mod faq;
pub mod history;


pub use engine::{ChatbotConfig, ChatbotEngine, EngineError, Sender};
pub use faq::{FaqEntry, FaqTable, Matcher};
pub use history::{Conversation, ConversationStore, Role, Turn};
