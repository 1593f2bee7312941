use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::chat_dto::ConversationSummary;
use crate::chat::chat_models::{ChatMessage, TypingIndicator};

/// Server-to-client events. The session controller pushes these whenever
/// its state changes; the client renders them as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    ConversationList {
        conversations: Vec<ConversationSummary>,
    },
    ConversationOpened {
        conversation_id: Uuid,
        messages: Vec<ChatMessage>,
    },
    /// Reply to `start_conversation`: the direct conversation is ready to
    /// be selected.
    ConversationReady {
        conversation_id: Uuid,
    },
    MessageReceived(ChatMessage),
    TypingUpdate(TypingUpdatePayload),
    Loading {
        is_loading: bool,
    },
    Error(ErrorPayload),
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingUpdatePayload {
    pub conversation_id: Uuid,
    /// Current typing users, the viewer already filtered out.
    pub users: Vec<TypingIndicator>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Client-to-server intents.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SelectConversation {
        conversation_id: Uuid,
    },
    CloseConversation,
    SendMessage {
        content: String,
    },
    /// Keystroke activity in the input box: true while the trimmed input
    /// is non-empty, false once it goes blank.
    Typing {
        is_typing: bool,
    },
    StartConversation {
        other_user_id: Uuid,
        other_nickname: Option<String>,
        other_avatar_url: Option<String>,
    },
    LoadConversations,
    Ping,
}
