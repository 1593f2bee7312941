use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::chat::chat_models::{ChatMessage, Conversation, ConversationParticipant, TypingIndicator};

use super::{ChatEvent, Subscription, TypingRegistry};

const CHANNEL_CAPACITY: usize = 256;

/// In-process stand-in for the hosted real-time database the frontend
/// talks to. Holds the chat tables and pushes a change event on every
/// mutation, scoped per conversation for messages and typing plus one
/// unscoped coarse feed. Persistence is out of scope; the interesting
/// contract is rows in, change events out.
#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    conversations: DashMap<Uuid, Conversation>,
    /// Participant rows grouped by conversation. There is no user-keyed
    /// index; resolving a user's conversations goes through this join.
    participants: DashMap<Uuid, Vec<ConversationParticipant>>,
    /// Message rows grouped by conversation, ascending by creation time.
    messages: DashMap<Uuid, Vec<ChatMessage>>,
    typing: TypingRegistry,
    message_channels: DashMap<Uuid, broadcast::Sender<ChatEvent>>,
    typing_channels: DashMap<Uuid, broadcast::Sender<ChatEvent>>,
    feed: broadcast::Sender<ChatEvent>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::with_typing_window(super::TYPING_STALENESS)
    }

    pub fn with_typing_window(window: Duration) -> Self {
        let (feed, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                conversations: DashMap::new(),
                participants: DashMap::new(),
                messages: DashMap::new(),
                typing: TypingRegistry::with_window(window),
                message_channels: DashMap::new(),
                typing_channels: DashMap::new(),
                feed,
            }),
        }
    }

    // ── Conversations ────────────────────────────────────────────────────

    pub fn insert_conversation(&self, conversation: Conversation) -> Conversation {
        let id = conversation.id;
        self.inner.conversations.insert(id, conversation.clone());
        self.publish_feed(ChatEvent::ConversationTouched { conversation_id: id });
        conversation
    }

    /// Removes a conversation and its dependent rows. Used as the
    /// compensating cleanup when participant insertion fails mid-create,
    /// so no orphan conversation is left behind.
    pub fn remove_conversation(&self, conversation_id: Uuid) {
        self.inner.conversations.remove(&conversation_id);
        self.inner.participants.remove(&conversation_id);
        self.inner.messages.remove(&conversation_id);
        self.publish_feed(ChatEvent::ConversationTouched { conversation_id });
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.inner
            .conversations
            .get(&conversation_id)
            .map(|c| c.clone())
    }

    /// Sets the conversation's last-activity timestamp. Returns false if
    /// the conversation does not exist.
    pub fn touch_conversation(&self, conversation_id: Uuid, at: DateTime<Utc>) -> bool {
        match self.inner.conversations.get_mut(&conversation_id) {
            Some(mut conversation) => {
                conversation.updated_at = at;
                drop(conversation);
                self.publish_feed(ChatEvent::ConversationTouched { conversation_id });
                true
            }
            None => false,
        }
    }

    // ── Participants ─────────────────────────────────────────────────────

    /// Returns false if the owning conversation does not exist.
    pub fn insert_participant(&self, participant: ConversationParticipant) -> bool {
        let conversation_id = participant.conversation_id;
        if !self.inner.conversations.contains_key(&conversation_id) {
            return false;
        }
        self.inner
            .participants
            .entry(conversation_id)
            .or_default()
            .push(participant);
        self.publish_feed(ChatEvent::ConversationTouched { conversation_id });
        true
    }

    pub fn participants(&self, conversation_id: Uuid) -> Vec<ConversationParticipant> {
        self.inner
            .participants
            .get(&conversation_id)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// The participant join: which conversations does this user belong to.
    pub fn conversation_ids_for_user(&self, user_id: Uuid) -> Vec<Uuid> {
        self.inner
            .participants
            .iter()
            .filter(|entry| entry.value().iter().any(|p| p.user_id == user_id))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Returns false if no such participant row exists.
    pub fn set_last_read(&self, conversation_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> bool {
        match self.inner.participants.get_mut(&conversation_id) {
            Some(mut rows) => match rows.iter_mut().find(|p| p.user_id == user_id) {
                Some(participant) => {
                    participant.last_read_at = at;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Inserts a message row and pushes the change event to conversation
    /// subscribers and the coarse feed. Returns false if the conversation
    /// does not exist.
    pub fn insert_message(&self, message: ChatMessage) -> bool {
        let conversation_id = message.conversation_id;
        if !self.inner.conversations.contains_key(&conversation_id) {
            return false;
        }

        {
            let mut rows = self.inner.messages.entry(conversation_id).or_default();
            // Rows are kept ascending by creation time; inserts land at the
            // tail in practice, so scan from the end.
            let at = rows
                .iter()
                .rposition(|m| {
                    (m.created_at, m.id) <= (message.created_at, message.id)
                })
                .map(|i| i + 1)
                .unwrap_or(0);
            rows.insert(at, message.clone());
        }

        self.publish_message(conversation_id, ChatEvent::MessageInserted(message));
        self.publish_feed(ChatEvent::ConversationTouched { conversation_id });
        true
    }

    /// The most recent `limit` messages, still in ascending order. This is
    /// a recency window, not pagination.
    pub fn messages_tail(&self, conversation_id: Uuid, limit: usize) -> Vec<ChatMessage> {
        self.inner
            .messages
            .get(&conversation_id)
            .map(|rows| {
                let skip = rows.len().saturating_sub(limit);
                rows[skip..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn last_message(&self, conversation_id: Uuid) -> Option<ChatMessage> {
        self.inner
            .messages
            .get(&conversation_id)
            .and_then(|rows| rows.last().cloned())
    }

    pub fn messages_after(
        &self,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Vec<ChatMessage> {
        self.inner
            .messages
            .get(&conversation_id)
            .map(|rows| {
                rows.iter()
                    .filter(|m| m.created_at > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Typing indicators ────────────────────────────────────────────────

    pub fn set_typing(&self, indicator: TypingIndicator) {
        let conversation_id = indicator.conversation_id;
        self.inner.typing.set(indicator);
        self.publish_typing(conversation_id, ChatEvent::TypingChanged { conversation_id });
    }

    pub fn clear_typing(&self, conversation_id: Uuid, user_id: Uuid) {
        if self.inner.typing.clear(conversation_id, user_id) {
            self.publish_typing(conversation_id, ChatEvent::TypingChanged { conversation_id });
        }
    }

    pub fn typing_snapshot(&self, conversation_id: Uuid) -> Vec<TypingIndicator> {
        self.inner.typing.snapshot(conversation_id)
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    pub fn subscribe_messages(&self, conversation_id: Uuid) -> Subscription {
        Subscription::new(self.channel(&self.inner.message_channels, conversation_id))
    }

    pub fn subscribe_typing(&self, conversation_id: Uuid) -> Subscription {
        Subscription::new(self.channel(&self.inner.typing_channels, conversation_id))
    }

    /// The unscoped invalidation feed. Consumers filter by relevance
    /// themselves, typically by just reloading their conversation list.
    pub fn subscribe_feed(&self) -> Subscription {
        Subscription::new(self.inner.feed.subscribe())
    }

    pub fn message_subscribers(&self, conversation_id: Uuid) -> usize {
        self.inner
            .message_channels
            .get(&conversation_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn typing_subscribers(&self, conversation_id: Uuid) -> usize {
        self.inner
            .typing_channels
            .get(&conversation_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn channel(
        &self,
        channels: &DashMap<Uuid, broadcast::Sender<ChatEvent>>,
        conversation_id: Uuid,
    ) -> broadcast::Receiver<ChatEvent> {
        channels
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn publish_message(&self, conversation_id: Uuid, event: ChatEvent) {
        if let Some(tx) = self.inner.message_channels.get(&conversation_id) {
            // Send only fails when nobody is subscribed.
            let _ = tx.send(event);
        }
    }

    fn publish_typing(&self, conversation_id: Uuid, event: ChatEvent) {
        if let Some(tx) = self.inner.typing_channels.get(&conversation_id) {
            let _ = tx.send(event);
        }
    }

    fn publish_feed(&self, event: ChatEvent) {
        let _ = self.inner.feed.send(event);
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}
