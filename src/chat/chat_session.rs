use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::{StreamExt, StreamMap};
use uuid::Uuid;

use crate::{
    chat::chat_dto::ConversationSummary,
    chat::chat_models::{ChatMessage, ChatUser, TypingIndicator},
    chat::chat_repository::{ChatRepository, DEFAULT_MESSAGE_LIMIT},
    realtime::{ChatEvent, Subscription},
    websocket::types::{ErrorPayload, TypingUpdatePayload, WsMessage},
};

/// Typing indicators auto-clear after this much keyboard idle time.
pub const TYPING_DEBOUNCE: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum SubKey {
    /// Coarse conversations feed, open for the whole session.
    Conversations,
    /// Message inserts for the active conversation.
    Messages,
    /// Typing changes for the active conversation.
    Typing,
}

struct ActiveConversation {
    id: Uuid,
    messages: Vec<ChatMessage>,
    typing_users: Vec<TypingIndicator>,
}

/// Per-user chat session: owns the client-visible state (conversation
/// summaries, active conversation, typing users) and the subscription
/// lifecycle. One instance per connection, created at session start and
/// dropped at logout; all mutation happens on the owning task, so there is
/// a single writer for every piece of state.
///
/// State updates are pushed to the presentation layer through the outbound
/// channel as [`WsMessage`]s.
pub struct ChatSession {
    user: ChatUser,
    repo: ChatRepository,
    out: mpsc::UnboundedSender<WsMessage>,
    conversations: Vec<ConversationSummary>,
    active: Option<ActiveConversation>,
    streams: StreamMap<SubKey, Subscription>,
    typing_deadline: Option<Instant>,
    is_loading: bool,
}

impl ChatSession {
    pub fn new(
        user: ChatUser,
        repo: ChatRepository,
        out: mpsc::UnboundedSender<WsMessage>,
    ) -> Self {
        let mut streams = StreamMap::new();
        streams.insert(SubKey::Conversations, repo.subscribe_conversations());
        Self {
            user,
            repo,
            out,
            conversations: Vec::new(),
            active: None,
            streams,
            typing_deadline: None,
            is_loading: false,
        }
    }

    pub fn user(&self) -> &ChatUser {
        &self.user
    }

    pub fn active_conversation_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.active.as_ref().map(|a| a.messages.as_slice()).unwrap_or(&[])
    }

    pub fn typing_users(&self) -> &[TypingIndicator] {
        self.active
            .as_ref()
            .map(|a| a.typing_users.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing_deadline
    }

    /// Initial load when the session begins.
    pub async fn start(&mut self) {
        self.load_conversations().await;
    }

    /// Full reload of the conversation summary list. On failure the
    /// previous list stays as it was; the only lasting effect is the
    /// cleared loading flag.
    pub async fn load_conversations(&mut self) {
        self.set_loading(true);
        match self.repo.conversation_summaries(&self.user).await {
            Ok(summaries) => {
                self.conversations = summaries;
                self.push(WsMessage::ConversationList {
                    conversations: self.conversations.clone(),
                });
            }
            Err(err) => {
                tracing::warn!(user_id = %self.user.id, "failed to load conversations: {}", err);
            }
        }
        self.set_loading(false);
    }

    /// Opens a conversation: tears down the previous conversation's
    /// subscriptions first, then loads history, marks it read and opens
    /// the message and typing channels. The cached unread count is zeroed
    /// immediately, ahead of the read-marker round-trip.
    pub async fn select_conversation(&mut self, conversation_id: Uuid) {
        self.teardown_active().await;

        if let Some(summary) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            summary.unread_count = 0;
        }

        self.set_loading(true);
        match self.repo.list_messages(conversation_id, DEFAULT_MESSAGE_LIMIT).await {
            Ok(messages) => {
                if let Err(err) = self.repo.mark_read(conversation_id, self.user.id).await {
                    tracing::warn!("failed to mark conversation read: {}", err);
                }

                self.streams
                    .insert(SubKey::Messages, self.repo.subscribe_messages(conversation_id));
                self.streams
                    .insert(SubKey::Typing, self.repo.subscribe_typing(conversation_id));

                let typing_users: Vec<TypingIndicator> = self
                    .repo
                    .list_typing(conversation_id)
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|i| i.user_id != self.user.id)
                    .collect();

                self.active = Some(ActiveConversation {
                    id: conversation_id,
                    messages: messages.clone(),
                    typing_users: typing_users.clone(),
                });
                self.push(WsMessage::ConversationOpened {
                    conversation_id,
                    messages,
                });
                self.push(WsMessage::TypingUpdate(TypingUpdatePayload {
                    conversation_id,
                    users: typing_users,
                }));
            }
            Err(err) => {
                // Back to idle; the summary list is untouched.
                tracing::warn!(%conversation_id, "failed to open conversation: {}", err);
                self.push_error(&err.to_string());
            }
        }
        self.set_loading(false);
    }

    /// Leaves the active conversation and releases both of its
    /// subscriptions.
    pub async fn clear_active_conversation(&mut self) {
        self.teardown_active().await;
    }

    /// Looks up or creates the direct conversation with `other` and
    /// refreshes the list. Returns the conversation id on success.
    pub async fn start_conversation(&mut self, other: &ChatUser) -> Option<Uuid> {
        match self
            .repo
            .get_or_create_direct_conversation(&self.user, other)
            .await
        {
            Ok(conversation) => {
                self.load_conversations().await;
                self.push(WsMessage::ConversationReady {
                    conversation_id: conversation.id,
                });
                Some(conversation.id)
            }
            Err(err) => {
                tracing::warn!("failed to start conversation: {}", err);
                self.push_error(&err.to_string());
                None
            }
        }
    }

    /// Sends a message in the active conversation. Blank or
    /// whitespace-only content is a no-op: nothing is stored and no event
    /// fires. The stored message comes back to us over the message
    /// subscription, so it is not appended here.
    pub async fn send_message(&mut self, content: &str) {
        let Some(conversation_id) = self.active_conversation_id() else {
            return;
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return;
        }

        // Sending always clears typing, whatever the debounce timer says.
        self.typing_deadline = None;
        if let Err(err) = self.repo.clear_typing(conversation_id, self.user.id).await {
            tracing::debug!("failed to clear typing on send: {}", err);
        }

        match self.repo.send_message(conversation_id, &self.user, trimmed).await {
            Ok(message) => {
                if let Some(summary) = self
                    .conversations
                    .iter_mut()
                    .find(|c| c.id == conversation_id)
                {
                    summary.updated_at = message.created_at;
                    summary.last_message = Some(message);
                }
                self.conversations
                    .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            }
            Err(err) => {
                tracing::warn!(%conversation_id, "failed to send message: {}", err);
                self.push_error(&err.to_string());
            }
        }
    }

    /// Keystroke activity from the input box. Non-empty input refreshes
    /// the typing indicator and re-arms the debounce timer; empty input
    /// clears both.
    pub async fn set_typing(&mut self, is_typing: bool) {
        let Some(conversation_id) = self.active_conversation_id() else {
            return;
        };

        if is_typing {
            if let Err(err) = self.repo.set_typing(conversation_id, &self.user).await {
                tracing::debug!("failed to set typing indicator: {}", err);
            }
            self.typing_deadline = Some(Instant::now() + TYPING_DEBOUNCE);
        } else {
            self.typing_deadline = None;
            if let Err(err) = self.repo.clear_typing(conversation_id, self.user.id).await {
                tracing::debug!("failed to clear typing indicator: {}", err);
            }
        }
    }

    /// Called when the debounce deadline elapses with no further
    /// keystrokes.
    pub async fn typing_expired(&mut self) {
        self.typing_deadline = None;
        if let Some(conversation_id) = self.active_conversation_id() {
            if let Err(err) = self.repo.clear_typing(conversation_id, self.user.id).await {
                tracing::debug!("failed to clear typing indicator: {}", err);
            }
        }
    }

    /// Next pushed change event across all open subscriptions. Pends
    /// forever if the store's channels have closed; the surrounding select
    /// loop still reacts to client traffic.
    pub async fn next_event(&mut self) -> ChatEvent {
        match self.streams.next().await {
            Some((_, event)) => event,
            None => std::future::pending().await,
        }
    }

    /// Merges one subscription event into session state.
    pub async fn apply_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::MessageInserted(message) => self.apply_message(message).await,
            ChatEvent::TypingChanged { conversation_id } => {
                self.refresh_typing(conversation_id).await
            }
            // The feed is a coarse invalidation signal: reload the whole
            // summary list rather than patching it.
            ChatEvent::ConversationTouched { .. } => self.load_conversations().await,
        }
    }

    /// Session teardown at disconnect/logout: releases the active
    /// conversation and the conversations feed.
    pub async fn shutdown(&mut self) {
        self.teardown_active().await;
        self.streams.remove(&SubKey::Conversations);
    }

    async fn apply_message(&mut self, message: ChatMessage) {
        let from_other = message.sender_id != self.user.id;
        let conversation_id = message.conversation_id;
        {
            let Some(active) = self.active.as_mut() else {
                return;
            };
            // Buffered event from a conversation we already left.
            if active.id != conversation_id {
                return;
            }
            // Delivery is at-least-once; the row may also already be here
            // from our own send. Never append the same id twice.
            if active.messages.iter().any(|m| m.id == message.id) {
                return;
            }
            // Display order is creation time, not arrival order.
            let at = active
                .messages
                .iter()
                .rposition(|m| (m.created_at, m.id) <= (message.created_at, message.id))
                .map(|i| i + 1)
                .unwrap_or(0);
            active.messages.insert(at, message.clone());
        }

        self.push(WsMessage::MessageReceived(message));

        // Keep the read marker current while the conversation is open.
        if from_other {
            if let Err(err) = self.repo.mark_read(conversation_id, self.user.id).await {
                tracing::debug!("failed to refresh read marker: {}", err);
            }
        }
    }

    async fn refresh_typing(&mut self, conversation_id: Uuid) {
        if self.active_conversation_id() != Some(conversation_id) {
            return;
        }
        match self.repo.list_typing(conversation_id).await {
            Ok(indicators) => {
                let users: Vec<TypingIndicator> = indicators
                    .into_iter()
                    .filter(|i| i.user_id != self.user.id)
                    .collect();
                if let Some(active) = self.active.as_mut() {
                    active.typing_users = users.clone();
                }
                self.push(WsMessage::TypingUpdate(TypingUpdatePayload {
                    conversation_id,
                    users,
                }));
            }
            Err(err) => {
                tracing::warn!("failed to refresh typing indicators: {}", err);
            }
        }
    }

    async fn teardown_active(&mut self) {
        // Drop both per-conversation subscriptions before anything else so
        // no stale callback can fire for the old conversation.
        self.streams.remove(&SubKey::Messages);
        self.streams.remove(&SubKey::Typing);

        if let Some(active) = self.active.take() {
            if self.typing_deadline.take().is_some() {
                if let Err(err) = self.repo.clear_typing(active.id, self.user.id).await {
                    tracing::debug!("failed to clear typing on teardown: {}", err);
                }
            }
        }
    }

    fn set_loading(&mut self, is_loading: bool) {
        self.is_loading = is_loading;
        self.push(WsMessage::Loading { is_loading });
    }

    fn push(&self, message: WsMessage) {
        // Only fails when the connection is already gone.
        let _ = self.out.send(message);
    }

    fn push_error(&self, message: &str) {
        self.push(WsMessage::Error(ErrorPayload {
            message: message.to_string(),
        }));
    }
}

/// Awaits the typing-debounce deadline, or forever when none is armed.
/// Kept outside [`ChatSession`] so the connection loop can poll it without
/// holding a borrow of the session.
pub async fn debounce_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
