use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::chat::chat_models::{ChatMessage, Conversation, ConversationParticipant};

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    /// Must contain something besides whitespace; the stored content is
    /// the trimmed form.
    #[validate(custom(function = not_blank))]
    pub content: String,
}

fn not_blank(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct StartConversationRequest {
    pub other_user_id: Uuid,
    pub other_nickname: Option<String>,
    pub other_avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

/// A conversation as the list view needs it: the row itself plus
/// participants, last-message preview, unread count and the resolved
/// display name/avatar for the viewing user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: Vec<ConversationParticipant>,
    pub last_message: Option<ChatMessage>,
    pub unread_count: i64,
    pub display_name: String,
    pub avatar_url: String,
    pub last_active_label: String,
}

impl ConversationSummary {
    pub fn build(
        viewer_id: Uuid,
        conversation: Conversation,
        participants: Vec<ConversationParticipant>,
        last_message: Option<ChatMessage>,
        unread_count: i64,
    ) -> Self {
        let display_name = display_name(viewer_id, &conversation, &participants);
        let avatar_url = avatar_url(viewer_id, &conversation, &participants, &display_name);
        Self {
            id: conversation.id,
            name: conversation.name,
            is_group: conversation.is_group,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            participants,
            last_message,
            unread_count,
            display_name,
            avatar_url,
            last_active_label: time_ago(conversation.updated_at),
        }
    }
}

/// Group conversations show their own name; direct conversations show the
/// other participant's nickname snapshot.
fn display_name(
    viewer_id: Uuid,
    conversation: &Conversation,
    participants: &[ConversationParticipant],
) -> String {
    if conversation.is_group {
        if let Some(name) = &conversation.name {
            return name.clone();
        }
    }
    participants
        .iter()
        .find(|p| p.user_id != viewer_id)
        .and_then(|p| p.user_nickname.clone())
        .unwrap_or_else(|| "Unknown User".to_string())
}

fn avatar_url(
    viewer_id: Uuid,
    conversation: &Conversation,
    participants: &[ConversationParticipant],
    display_name: &str,
) -> String {
    if conversation.is_group {
        return fallback_avatar_url(conversation.name.as_deref().unwrap_or("Group"));
    }
    participants
        .iter()
        .find(|p| p.user_id != viewer_id)
        .and_then(|p| p.user_avatar.clone())
        .unwrap_or_else(|| fallback_avatar_url(display_name))
}

/// Generated avatar for users and groups without a stored one, same
/// service the web frontend uses.
pub fn fallback_avatar_url(name: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background=random",
        urlencoding::encode(name)
    )
}

/// Coarse relative timestamp for list previews.
pub fn time_ago(at: DateTime<Utc>) -> String {
    let seconds = (Utc::now() - at).num_seconds().max(0);
    if seconds < 60 {
        return "Just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    format!("{}d ago", hours / 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn participant(conversation_id: Uuid, user_id: Uuid, nickname: &str) -> ConversationParticipant {
        ConversationParticipant::new(conversation_id, user_id, Some(nickname), None)
    }

    #[test]
    fn direct_conversation_uses_other_participant_name() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let conversation = Conversation::direct();
        let participants = vec![
            participant(conversation.id, me, "Me"),
            participant(conversation.id, other, "Ada"),
        ];

        let summary = ConversationSummary::build(me, conversation, participants, None, 0);
        assert_eq!(summary.display_name, "Ada");
        assert!(summary.avatar_url.contains("ui-avatars.com"));
        assert!(summary.avatar_url.contains("Ada"));
    }

    #[test]
    fn group_conversation_uses_group_name() {
        let me = Uuid::new_v4();
        let conversation = Conversation::group("Sci-Fi Book Club");
        let participants = vec![participant(conversation.id, me, "Me")];

        let summary = ConversationSummary::build(me, conversation, participants, None, 0);
        assert_eq!(summary.display_name, "Sci-Fi Book Club");
        assert!(summary.avatar_url.contains("Sci-Fi%20Book%20Club"));
    }

    #[test]
    fn missing_nickname_falls_back_to_unknown() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let conversation = Conversation::direct();
        let participants = vec![
            participant(conversation.id, me, "Me"),
            ConversationParticipant::new(conversation.id, other, None, None),
        ];

        let summary = ConversationSummary::build(me, conversation, participants, None, 0);
        assert_eq!(summary.display_name, "Unknown User");
    }

    #[test]
    fn whitespace_only_message_fails_validation() {
        let blank = SendMessageRequest {
            content: "   \t ".to_string(),
        };
        assert!(blank.validate().is_err());

        let empty = SendMessageRequest {
            content: String::new(),
        };
        assert!(empty.validate().is_err());

        let padded = SendMessageRequest {
            content: "  hi  ".to_string(),
        };
        assert!(padded.validate().is_ok());
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(time_ago(now), "Just now");
        assert_eq!(time_ago(now - Duration::minutes(5)), "5m ago");
        assert_eq!(time_ago(now - Duration::hours(3)), "3h ago");
        assert_eq!(time_ago(now - Duration::days(2)), "2d ago");
    }
}
