//! LINE chat relay: FAQ answers for UNISON SQUARE GARDEN questions, everything
//! else forwarded to an Azure OpenAI chat deployment.

pub mod chatbot;
pub mod config;
pub mod line;
pub mod llm;
pub mod server;
