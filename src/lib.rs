pub mod auth;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod websocket;
