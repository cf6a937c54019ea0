//! Conversation history kept per LINE user.
//!
//! Each user gets an independently lockable buffer so turns from different
//! people never interleave. Buffers live in memory only and are dropped on
//! restart.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::debug;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns for a single user. The first turn, if it is a system turn,
/// survives window eviction.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything and insert exactly one system turn.
    pub fn reset(&mut self, system_prompt: &str) {
        self.turns.clear();
        self.turns.push(Turn::system(system_prompt));
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Evict the oldest non-system turns until at most `max` remain.
    /// Returns how many turns were dropped.
    pub fn enforce_window(&mut self, max: usize) -> usize {
        let start = usize::from(self.has_system_turn());
        let non_system = self.turns.len() - start;
        if non_system <= max {
            return 0;
        }
        let excess = non_system - max;
        self.turns.drain(start..start + excess);
        excess
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn has_system_turn(&self) -> bool {
        self.turns.first().is_some_and(|t| t.role == Role::System)
    }
}

/// Default cap on how many users' conversations are kept in memory.
pub const DEFAULT_MAX_CONVERSATIONS: usize = 1000;

struct Slot {
    conversation: Arc<Mutex<Conversation>>,
    last_used: u64,
}

#[derive(Default)]
struct Slots {
    map: HashMap<String, Slot>,
    clock: u64,
}

impl Slots {
    /// Drop the least recently used conversation nobody is holding.
    fn evict_idle(&mut self) -> Option<String> {
        let key = self
            .map
            .iter()
            .filter(|(_, slot)| Arc::strong_count(&slot.conversation) == 1)
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone())?;
        self.map.remove(&key);
        Some(key)
    }
}

/// Per-user conversation slots, keyed by the platform's user ID.
///
/// At most `max_conversations` users are tracked. Creating a slot beyond
/// that evicts the least recently used idle one, so a user who has been
/// quiet the longest starts over.
pub struct ConversationStore {
    slots: StdMutex<Slots>,
    /// Seed new conversations with this system turn, if set.
    seed: Option<String>,
    max_conversations: usize,
}

impl ConversationStore {
    pub fn new(seed: Option<String>, max_conversations: usize) -> Self {
        Self {
            slots: StdMutex::new(Slots::default()),
            seed,
            max_conversations,
        }
    }

    /// Get the slot for `key`, creating it on first use.
    pub fn slot(&self, key: &str) -> Arc<Mutex<Conversation>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.clock += 1;
        let now = slots.clock;

        if let Some(slot) = slots.map.get_mut(key) {
            slot.last_used = now;
            return slot.conversation.clone();
        }

        if slots.map.len() >= self.max_conversations
            && let Some(evicted) = slots.evict_idle()
        {
            debug!("Evicted idle conversation for {evicted}");
        }

        debug!("New conversation for {key}");
        let mut conversation = Conversation::new();
        if let Some(ref prompt) = self.seed {
            conversation.reset(prompt);
        }
        let conversation = Arc::new(Mutex::new(conversation));
        slots.map.insert(
            key.to_string(),
            Slot {
                conversation: conversation.clone(),
                last_used: now,
            },
        );
        conversation
    }

    /// Reset one user's conversation to a single system turn.
    pub async fn reset(&self, key: &str, system_prompt: &str) {
        let slot = self.slot(key);
        slot.lock().await.reset(system_prompt);
    }

    /// Snapshot of one user's turns (empty if the user has never spoken).
    pub async fn snapshot(&self, key: &str) -> Vec<Turn> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.map.get(key).map(|s| s.conversation.clone())
        };
        match slot {
            Some(slot) => slot.lock().await.turns().to_vec(),
            None => Vec::new(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).map.len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(None, DEFAULT_MAX_CONVERSATIONS)
    }
}
