//! HTTP and WebSocket request handlers.

pub mod api;
pub mod chat;
pub mod relay;
pub mod session;

pub use relay::relay_handler;
