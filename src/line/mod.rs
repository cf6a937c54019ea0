//! LINE Messaging API plumbing: webhook signatures, payloads and outbound calls.

pub mod client;
pub mod signature;
pub mod webhook;

pub use client::{LineApi, LineClient, Profile};
pub use webhook::{Event, MessageContent, Source, WebhookPayload};
