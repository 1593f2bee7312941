use axum::{
    http::{
        header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    chat::{
        chat_dto::{ConversationSummary, SendMessageRequest, StartConversationRequest},
        chat_handlers,
        chat_models::{ChatMessage, ChatUser, Conversation, ConversationParticipant, TypingIndicator},
    },
    middleware::auth_middleware,
    state::AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::chat::chat_handlers::get_conversations,
        crate::chat::chat_handlers::start_direct_conversation,
        crate::chat::chat_handlers::get_participants,
        crate::chat::chat_handlers::get_messages,
        crate::chat::chat_handlers::send_message,
        crate::chat::chat_handlers::mark_conversation_read,
        crate::chat::chat_handlers::get_typing,
        crate::chat::chat_handlers::get_unread_count,
    ),
    components(
        schemas(
            SendMessageRequest,
            StartConversationRequest,
            ConversationSummary,
            Conversation,
            ConversationParticipant,
            ChatMessage,
            TypingIndicator,
            ChatUser,
        )
    ),
    tags(
        (name = "chat", description = "Real-time chat endpoints")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let chat_routes = Router::new()
        .route("/conversations", get(chat_handlers::get_conversations))
        .route(
            "/conversations/direct",
            post(chat_handlers::start_direct_conversation),
        )
        .route(
            "/conversations/:id/participants",
            get(chat_handlers::get_participants),
        )
        .route(
            "/conversations/:id/messages",
            get(chat_handlers::get_messages).post(chat_handlers::send_message),
        )
        .route(
            "/conversations/:id/read",
            patch(chat_handlers::mark_conversation_read),
        )
        .route("/conversations/:id/typing", get(chat_handlers::get_typing))
        .route("/conversations/:id/unread", get(chat_handlers::get_unread_count))
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new().nest("/chat", chat_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(state)
}
