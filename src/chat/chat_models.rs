use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A chat conversation. `name` is only set for group conversations;
/// direct conversations derive their display name from the other
/// participant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
    /// Bumped on every message append. The conversation list is ordered
    /// by this, most recent first.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn direct() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: None,
            is_group: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn group(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: Some(name.to_string()),
            is_group: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user's membership in a conversation.
///
/// Nickname and avatar are snapshots taken at join time and are not kept
/// in sync with later profile edits. That staleness is accepted: it keeps
/// reads join-free, and historical rows are not rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationParticipant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub user_nickname: Option<String>,
    pub user_avatar: Option<String>,
    pub joined_at: DateTime<Utc>,
    /// Sole basis for unread counts: any message newer than this, sent by
    /// someone else, is unread.
    pub last_read_at: DateTime<Utc>,
}

impl ConversationParticipant {
    pub fn new(
        conversation_id: Uuid,
        user_id: Uuid,
        user_nickname: Option<&str>,
        user_avatar: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            user_id,
            user_nickname: user_nickname.map(str::to_string),
            user_avatar: user_avatar.map(str::to_string),
            joined_at: now,
            last_read_at: now,
        }
    }
}

/// An immutable chat message. Sender nickname/avatar are denormalized
/// snapshots, same trade-off as on participants.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_nickname: String,
    pub sender_avatar: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_nickname: &str,
        sender_avatar: Option<&str>,
        content: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            sender_nickname: sender_nickname.to_string(),
            sender_avatar: sender_avatar.map(str::to_string),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Identity of the logged-in user as carried in the auth token claims.
/// Nickname and avatar from here become the denormalized snapshots on
/// participant and message rows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatUser {
    pub id: Uuid,
    pub nickname: String,
    pub avatar_url: Option<String>,
}

/// Ephemeral "user is typing" record, keyed by (conversation, user).
/// Refreshed on keystrokes, deleted on stop or send. Readers additionally
/// drop entries older than the staleness window, so a client that crashed
/// without cleaning up cannot leave a permanent indicator behind.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TypingIndicator {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub user_nickname: String,
    pub updated_at: DateTime<Utc>,
}
