pub mod chat_dto;
pub mod chat_handlers;
pub mod chat_models;
pub mod chat_repository;
pub mod chat_session;

pub use chat_repository::ChatRepository;
pub use chat_session::ChatSession;
