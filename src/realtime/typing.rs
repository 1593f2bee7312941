use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::chat::chat_models::TypingIndicator;

/// Readers ignore typing indicators older than this. Clearing is
/// best-effort (a crashed client never clears), so the window is what
/// actually bounds how long a stale "is typing" can be shown.
pub const TYPING_STALENESS: Duration = Duration::from_secs(5);

/// Short-TTL store for typing indicators, kept apart from the durable
/// conversation/message tables. Entries are upserted on keystrokes and
/// expire by timestamp rather than relying on explicit deletion.
pub struct TypingRegistry {
    entries: DashMap<(Uuid, Uuid), TypingIndicator>,
    window: chrono::Duration,
}

impl TypingRegistry {
    pub fn new() -> Self {
        Self::with_window(TYPING_STALENESS)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::seconds(5)),
        }
    }

    pub fn set(&self, indicator: TypingIndicator) {
        self.entries
            .insert((indicator.conversation_id, indicator.user_id), indicator);
    }

    /// Returns true if an indicator was actually removed.
    pub fn clear(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.entries.remove(&(conversation_id, user_id)).is_some()
    }

    /// Current indicators for a conversation, staleness-filtered. Expired
    /// entries are pruned as a side effect so the map does not accumulate
    /// leftovers from clients that never cleared.
    pub fn snapshot(&self, conversation_id: Uuid) -> Vec<TypingIndicator> {
        let cutoff = Utc::now() - self.window;
        self.entries
            .retain(|&(conv, _), entry| conv != conversation_id || entry.updated_at >= cutoff);

        let mut indicators: Vec<TypingIndicator> = self
            .entries
            .iter()
            .filter(|entry| entry.conversation_id == conversation_id)
            .map(|entry| entry.value().clone())
            .collect();
        indicators.sort_by_key(|i| i.updated_at);
        indicators
    }
}

impl Default for TypingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator(conversation_id: Uuid, user_id: Uuid) -> TypingIndicator {
        TypingIndicator {
            conversation_id,
            user_id,
            user_nickname: "reader".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_returns_fresh_indicators() {
        let registry = TypingRegistry::new();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();
        registry.set(indicator(conv, user));

        let snapshot = registry.snapshot(conv);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, user);
    }

    #[test]
    fn stale_indicator_expires_without_clear() {
        let registry = TypingRegistry::with_window(Duration::from_millis(30));
        let conv = Uuid::new_v4();
        registry.set(indicator(conv, Uuid::new_v4()));

        std::thread::sleep(Duration::from_millis(50));
        assert!(registry.snapshot(conv).is_empty());
    }

    #[test]
    fn clear_removes_indicator() {
        let registry = TypingRegistry::new();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();
        registry.set(indicator(conv, user));

        assert!(registry.clear(conv, user));
        assert!(registry.snapshot(conv).is_empty());
        assert!(!registry.clear(conv, user));
    }

    #[test]
    fn snapshot_is_scoped_to_conversation() {
        let registry = TypingRegistry::new();
        let conv_a = Uuid::new_v4();
        let conv_b = Uuid::new_v4();
        registry.set(indicator(conv_a, Uuid::new_v4()));
        registry.set(indicator(conv_b, Uuid::new_v4()));

        assert_eq!(registry.snapshot(conv_a).len(), 1);
        assert_eq!(registry.snapshot(conv_b).len(), 1);
    }
}
