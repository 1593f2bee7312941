use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    chat::{
        chat_dto::{ConversationSummary, MessagesQuery, SendMessageRequest, StartConversationRequest},
        chat_models::{ChatMessage, ChatUser, Conversation, ConversationParticipant, TypingIndicator},
        chat_repository::DEFAULT_MESSAGE_LIMIT,
    },
    error::Result,
    middleware::AuthUser,
    state::AppState,
};

/// List the caller's conversations, most recently active first, with
/// participants, last-message preview and unread count
#[utoipa::path(
    get,
    path = "/api/chat/conversations",
    tag = "chat",
    responses(
        (status = 200, description = "Conversation summaries", body = Vec<ConversationSummary>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let summaries = state.chat_repository.conversation_summaries(&user).await?;
    Ok((StatusCode::OK, Json(summaries)))
}

/// Look up or create the direct conversation with another user
#[utoipa::path(
    post,
    path = "/api/chat/conversations/direct",
    tag = "chat",
    request_body = StartConversationRequest,
    responses(
        (status = 200, description = "Existing or newly created conversation", body = Conversation),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn start_direct_conversation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<StartConversationRequest>,
) -> Result<impl IntoResponse> {
    let other = ChatUser {
        id: payload.other_user_id,
        nickname: payload
            .other_nickname
            .unwrap_or_else(|| "Unknown User".to_string()),
        avatar_url: payload.other_avatar_url,
    };

    let conversation = state
        .chat_repository
        .get_or_create_direct_conversation(&user, &other)
        .await?;

    Ok((StatusCode::OK, Json(conversation)))
}

/// Get the participants of a conversation
#[utoipa::path(
    get,
    path = "/api/chat/conversations/{id}/participants",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Participant rows", body = Vec<ConversationParticipant>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_participants(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let participants = state.chat_repository.get_participants(conversation_id).await?;
    Ok((StatusCode::OK, Json(participants)))
}

/// Get the most recent messages of a conversation, ascending by creation
/// time. Fetching also moves the caller's read marker.
#[utoipa::path(
    get,
    path = "/api/chat/conversations/{id}/messages",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        ("limit" = Option<usize>, Query, description = "Recency window size (default: 50)")
    ),
    responses(
        (status = 200, description = "Messages, oldest first", body = Vec<ChatMessage>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let messages = state.chat_repository.list_messages(conversation_id, limit).await?;

    // Viewing the history counts as reading it.
    let _ = state.chat_repository.mark_read(conversation_id, user.id).await;

    Ok((StatusCode::OK, Json(messages)))
}

/// Send a message to a conversation
#[utoipa::path(
    post,
    path = "/api/chat/conversations/{id}/messages",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message created", body = ChatMessage),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    // Sending always clears the sender's typing indicator.
    let _ = state.chat_repository.clear_typing(conversation_id, user.id).await;

    let message = state
        .chat_repository
        .send_message(conversation_id, &user, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Move the caller's read marker to now
#[utoipa::path(
    patch,
    path = "/api/chat/conversations/{id}/read",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Read marker updated"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Participant not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.chat_repository.mark_read(conversation_id, user.id).await?;
    Ok(StatusCode::OK)
}

/// Current typing indicators for a conversation, staleness-filtered
#[utoipa::path(
    get,
    path = "/api/chat/conversations/{id}/typing",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Typing indicators", body = Vec<TypingIndicator>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_typing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let indicators: Vec<TypingIndicator> = state
        .chat_repository
        .list_typing(conversation_id)
        .await?
        .into_iter()
        .filter(|i| i.user_id != user.id)
        .collect();
    Ok((StatusCode::OK, Json(indicators)))
}

/// Unread message count for the caller in a conversation
#[utoipa::path(
    get,
    path = "/api/chat/conversations/{id}/unread",
    tag = "chat",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Unread count"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let count = state
        .chat_repository
        .unread_count(conversation_id, user.id)
        .await?;
    Ok((StatusCode::OK, Json(json!({ "unread_count": count }))))
}
