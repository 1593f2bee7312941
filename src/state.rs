use std::sync::Arc;

use crate::{chat::ChatRepository, realtime::ChatStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: ChatStore,
    pub chat_repository: ChatRepository,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let store = ChatStore::new();
        let chat_repository = ChatRepository::new(store.clone());
        Self {
            config,
            store,
            chat_repository,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_expiration_hours: std::env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| {
                    "http://localhost:3000,http://localhost:5173".to_string()
                })
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        }
    }
}
