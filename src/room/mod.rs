// Public API - what other modules can use
pub use handlers::{create_room, list_rooms};
pub use registry::RoomRegistry;

// Internal modules
pub mod actor;
pub mod config;
mod handlers;
pub mod models;
pub mod presence;
pub mod registry;
pub mod repository;
