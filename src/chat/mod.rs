// Public API - what other modules can use
pub use handlers::recent_messages;

// Internal modules
pub mod buffer;
mod handlers;
pub mod models;
pub mod repository;
