use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    chat::chat_dto::ConversationSummary,
    chat::chat_models::{
        ChatMessage, ChatUser, Conversation, ConversationParticipant, TypingIndicator,
    },
    error::{AppError, Result},
    realtime::{ChatStore, Subscription},
};

/// How much history a conversation open fetches. A recency window, not
/// pagination; older history is not loaded.
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Data access layer over the real-time store: shape translation and
/// timestamp-window filtering only, no session state.
#[derive(Clone)]
pub struct ChatRepository {
    store: ChatStore,
    /// Serializes direct-conversation lookup-or-create. Two users starting
    /// a conversation with each other at the same moment must not end up
    /// with two conversations for the pair.
    direct_create_lock: Arc<Mutex<()>>,
}

impl ChatRepository {
    pub fn new(store: ChatStore) -> Self {
        Self {
            store,
            direct_create_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    // ── Conversations ────────────────────────────────────────────────────

    /// All conversations the user participates in, most recently active
    /// first. A user with no conversations gets an empty list, not an
    /// error. The lookup has to go through the participant join; there is
    /// no direct user-to-conversation index.
    pub async fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let ids = self.store.conversation_ids_for_user(user_id);
        let mut conversations: Vec<Conversation> = ids
            .into_iter()
            .filter_map(|id| self.store.conversation(id))
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    pub async fn get_participants(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ConversationParticipant>> {
        Ok(self.store.participants(conversation_id))
    }

    /// Finds the direct conversation pairing these two users, or creates
    /// it: one conversation row plus both participant rows. If a
    /// participant insert fails the conversation row is removed again, so
    /// a partial create never leaves an orphan behind.
    pub async fn get_or_create_direct_conversation(
        &self,
        user: &ChatUser,
        other: &ChatUser,
    ) -> Result<Conversation> {
        let _guard = self.direct_create_lock.lock().await;

        for conversation_id in self.store.conversation_ids_for_user(user.id) {
            let Some(conversation) = self.store.conversation(conversation_id) else {
                continue;
            };
            if conversation.is_group {
                continue;
            }
            let shared = self
                .store
                .participants(conversation_id)
                .iter()
                .any(|p| p.user_id == other.id);
            if shared {
                return Ok(conversation);
            }
        }

        let conversation = self.store.insert_conversation(Conversation::direct());

        let inserted = self.store.insert_participant(ConversationParticipant::new(
            conversation.id,
            user.id,
            Some(&user.nickname),
            user.avatar_url.as_deref(),
        )) && self.store.insert_participant(ConversationParticipant::new(
            conversation.id,
            other.id,
            Some(&other.nickname),
            other.avatar_url.as_deref(),
        ));

        if !inserted {
            self.store.remove_conversation(conversation.id);
            return Err(AppError::Internal(
                "Failed to add participants to new conversation".to_string(),
            ));
        }

        Ok(conversation)
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// The most recent `limit` messages, ascending by creation time.
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        self.require_conversation(conversation_id)?;
        Ok(self.store.messages_tail(conversation_id, limit))
    }

    /// Inserts a message and bumps the conversation's last-activity
    /// timestamp. Content is trimmed here; rejecting empty content is the
    /// caller's job.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender: &ChatUser,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage::new(
            conversation_id,
            sender.id,
            &sender.nickname,
            sender.avatar_url.as_deref(),
            content.trim(),
        );

        if !self.store.insert_message(message.clone()) {
            return Err(AppError::NotFound("Conversation not found".to_string()));
        }
        self.store.touch_conversation(conversation_id, message.created_at);

        Ok(message)
    }

    /// Batch lookup of each conversation's most recent message, for list
    /// previews without pulling full history.
    pub async fn last_messages(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ChatMessage>> {
        let mut map = HashMap::new();
        for &conversation_id in conversation_ids {
            if let Some(message) = self.store.last_message(conversation_id) {
                map.insert(conversation_id, message);
            }
        }
        Ok(map)
    }

    // ── Read state ───────────────────────────────────────────────────────

    pub async fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        if !self.store.set_last_read(conversation_id, user_id, Utc::now()) {
            return Err(AppError::NotFound(
                "Participant not found in conversation".to_string(),
            ));
        }
        Ok(())
    }

    /// Messages newer than the participant's read marker, authored by
    /// someone else. Always recomputed from the rows, never tracked
    /// incrementally, so it cannot drift.
    pub async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        let participants = self.store.participants(conversation_id);
        let Some(participant) = participants.iter().find(|p| p.user_id == user_id) else {
            return Ok(0);
        };

        let count = self
            .store
            .messages_after(conversation_id, participant.last_read_at)
            .iter()
            .filter(|m| m.sender_id != user_id)
            .count();
        Ok(count as i64)
    }

    // ── Typing indicators ────────────────────────────────────────────────

    pub async fn set_typing(&self, conversation_id: Uuid, user: &ChatUser) -> Result<()> {
        self.store.set_typing(TypingIndicator {
            conversation_id,
            user_id: user.id,
            user_nickname: user.nickname.clone(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn clear_typing(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.store.clear_typing(conversation_id, user_id);
        Ok(())
    }

    /// Indicators updated within the staleness window.
    pub async fn list_typing(&self, conversation_id: Uuid) -> Result<Vec<TypingIndicator>> {
        Ok(self.store.typing_snapshot(conversation_id))
    }

    // ── Subscriptions ────────────────────────────────────────────────────

    pub fn subscribe_messages(&self, conversation_id: Uuid) -> Subscription {
        self.store.subscribe_messages(conversation_id)
    }

    pub fn subscribe_typing(&self, conversation_id: Uuid) -> Subscription {
        self.store.subscribe_typing(conversation_id)
    }

    /// Coarse conversations feed; dropping the handle unsubscribes.
    pub fn subscribe_conversations(&self) -> Subscription {
        self.store.subscribe_feed()
    }

    // ── Enriched list view ───────────────────────────────────────────────

    /// Conversation summaries for the list view: row + participants +
    /// last-message preview + unread count, most recently active first.
    pub async fn conversation_summaries(
        &self,
        user: &ChatUser,
    ) -> Result<Vec<ConversationSummary>> {
        let conversations = self.list_conversations_for_user(user.id).await?;
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let mut last_messages = self.last_messages(&ids).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let participants = self.get_participants(conversation.id).await?;
            let unread = self.unread_count(conversation.id, user.id).await?;
            summaries.push(ConversationSummary::build(
                user.id,
                conversation.clone(),
                participants,
                last_messages.remove(&conversation.id),
                unread,
            ));
        }
        Ok(summaries)
    }

    fn require_conversation(&self, conversation_id: Uuid) -> Result<Conversation> {
        self.store
            .conversation(conversation_id)
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }
}
