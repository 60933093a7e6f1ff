// Library crate for the Looproom real-time server
// This file exposes the public API for integration tests

pub mod auth;
pub mod chat;
pub mod moderation;
pub mod room;
pub mod session;
pub mod shared;
pub mod signaling;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use room::actor::{JoinSnapshot, RoomActor};
pub use room::{models::LooproomModel, registry::RoomRegistry};
pub use shared::{AppError, AppState};
pub use websockets::{
    ClientEvent, Connection, ConnectionManager, InMemoryConnectionManager,
    LooproomReceiveHandler, MessageHandler, ServerEvent,
};
