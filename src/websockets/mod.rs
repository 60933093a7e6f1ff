// Public API
pub use connection_manager::{ConnectionManager, InMemoryConnectionManager};
pub use handler::{websocket_handler, LooproomReceiveHandler};
pub use messages::{ClientEvent, ServerEvent};
pub use socket::{Connection, MessageHandler, SocketWrapper};

// Internal modules
pub mod connection_manager;
mod handler;
pub mod messages;
pub mod socket;
