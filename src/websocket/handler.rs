use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    chat::chat_models::ChatUser,
    chat::chat_session::{debounce_elapsed, ChatSession},
    middleware::AuthUser,
    state::AppState,
    websocket::types::{ClientMessage, ErrorPayload, WsMessage},
};

/// Chat WebSocket endpoint. One connection equals one chat session: the
/// socket carries client intents in and session state updates out.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

async fn handle_socket(socket: WebSocket, user: ChatUser, state: AppState) {
    let user_id = user.id;
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    // Task: serialize outbound session events onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut session = ChatSession::new(user, state.chat_repository.clone(), tx.clone());
    session.start().await;

    let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(30));
    heartbeat.tick().await; // first tick is immediate

    // The session actor loop. All session state is touched only here, so
    // interleaved fetch completions, subscription pushes and timers can
    // never race each other.
    loop {
        let typing_deadline = session.typing_deadline();
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(intent) => process_client_message(&mut session, intent, &tx).await,
                        Err(err) => {
                            let _ = tx.send(WsMessage::Error(ErrorPayload {
                                message: format!("Invalid message format: {}", err),
                            }));
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ignore binary/ping/pong frames
                Some(Err(_)) => break,
            },
            event = session.next_event() => session.apply_event(event).await,
            _ = debounce_elapsed(typing_deadline) => session.typing_expired().await,
            _ = heartbeat.tick() => {
                if tx.send(WsMessage::Ping).is_err() {
                    break;
                }
            }
        }
    }

    session.shutdown().await;
    send_task.abort();
    tracing::info!("Chat WebSocket closed for user {}", user_id);
}

async fn process_client_message(
    session: &mut ChatSession,
    intent: ClientMessage,
    tx: &mpsc::UnboundedSender<WsMessage>,
) {
    match intent {
        ClientMessage::SelectConversation { conversation_id } => {
            session.select_conversation(conversation_id).await;
        }
        ClientMessage::CloseConversation => {
            session.clear_active_conversation().await;
        }
        ClientMessage::SendMessage { content } => {
            session.send_message(&content).await;
        }
        ClientMessage::Typing { is_typing } => {
            session.set_typing(is_typing).await;
        }
        ClientMessage::StartConversation {
            other_user_id,
            other_nickname,
            other_avatar_url,
        } => {
            let other = ChatUser {
                id: other_user_id,
                nickname: other_nickname.unwrap_or_else(|| "Unknown User".to_string()),
                avatar_url: other_avatar_url,
            };
            session.start_conversation(&other).await;
        }
        ClientMessage::LoadConversations => {
            session.load_conversations().await;
        }
        ClientMessage::Ping => {
            let _ = tx.send(WsMessage::Pong);
        }
    }
}
