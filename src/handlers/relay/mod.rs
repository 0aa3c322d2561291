//! Realtime relay handlers.

pub mod connection;
pub mod handler;
pub mod messages;

pub use connection::{RelayConnection, RelayEvent, RelayState};
pub use handler::relay_handler;
pub use messages::{RelayErrorKind, error_frame};
