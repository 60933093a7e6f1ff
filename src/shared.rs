use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::TokenConfig;
use crate::chat::repository::MessageRepository;
use crate::room::registry::RoomRegistry;
use crate::room::repository::LooproomRepository;
use crate::websockets::ConnectionManager;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub looproom_repository: Arc<dyn LooproomRepository + Send + Sync>,
    pub message_repository: Arc<dyn MessageRepository + Send + Sync>,
    pub registry: Arc<RoomRegistry>,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub token_config: TokenConfig,
}

impl AppState {
    pub fn new(
        looproom_repository: Arc<dyn LooproomRepository + Send + Sync>,
        message_repository: Arc<dyn MessageRepository + Send + Sync>,
        registry: Arc<RoomRegistry>,
        connection_manager: Arc<dyn ConnectionManager>,
        token_config: TokenConfig,
    ) -> Self {
        Self {
            looproom_repository,
            message_repository,
            registry,
            connection_manager,
            token_config,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Session already active")]
    AlreadyActive,

    #[error("No active session")]
    NotActive,

    #[error("You are banned from this room")]
    Banned,

    #[error("You are muted in this room")]
    Muted,

    #[error("Slow mode is on, retry in {retry_in_secs}s")]
    RateLimited { retry_in_secs: i64 },

    #[error("Room is full")]
    RoomFull,

    #[error("Signaling target unavailable: {0}")]
    SignalingTargetUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Stable machine-readable code, used in inline `error` events
    pub fn code(&self) -> &'static str {
        match self {
            AppError::JwtError(_) => "jwt_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotConnected(_) => "not_connected",
            AppError::RoomNotFound(_) => "room_not_found",
            AppError::AlreadyActive => "already_active",
            AppError::NotActive => "not_active",
            AppError::Banned => "banned",
            AppError::Muted => "muted",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::RoomFull => "room_full",
            AppError::SignalingTargetUnavailable(_) => "signaling_target_unavailable",
            AppError::DatabaseError(_) => "database_error",
            AppError::NotFound(_) => "not_found",
            AppError::Internal => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::JwtError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::Banned | AppError::Muted => StatusCode::FORBIDDEN,
            AppError::RoomNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyActive | AppError::NotActive | AppError::RoomFull => {
                StatusCode::CONFLICT
            }
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotConnected(_) | AppError::SignalingTargetUnavailable(_) => StatusCode::GONE,
            AppError::DatabaseError(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::chat::repository::InMemoryMessageRepository;
    use crate::moderation::repository::InMemoryModerationRepository;
    use crate::room::config::RoomConfig;
    use crate::room::models::LooproomModel;
    use crate::room::repository::InMemoryLooproomRepository;
    use crate::session::repository::InMemorySessionRepository;
    use crate::websockets::InMemoryConnectionManager;

    /// Builder for creating AppState with overrides for testing
    pub struct AppStateBuilder {
        rooms: Vec<LooproomModel>,
        config: RoomConfig,
    }

    impl AppStateBuilder {
        pub fn new() -> Self {
            Self {
                rooms: Vec::new(),
                config: RoomConfig::default(),
            }
        }

        pub fn with_room(mut self, room: LooproomModel) -> Self {
            self.rooms.push(room);
            self
        }

        pub fn with_config(mut self, config: RoomConfig) -> Self {
            self.config = config;
            self
        }

        pub fn build(self) -> AppState {
            let looproom_repository = Arc::new(InMemoryLooproomRepository::with_rooms(self.rooms));
            let message_repository = Arc::new(InMemoryMessageRepository::new());
            let connection_manager: Arc<dyn ConnectionManager> =
                Arc::new(InMemoryConnectionManager::new());
            let registry = Arc::new(RoomRegistry::new(
                self.config,
                looproom_repository.clone(),
                Arc::new(InMemorySessionRepository::new()),
                Arc::new(InMemoryModerationRepository::new()),
                message_repository.clone(),
                connection_manager.clone(),
            ));

            AppState {
                looproom_repository,
                message_repository,
                registry,
                connection_manager,
                token_config: TokenConfig::new(),
            }
        }
    }

    impl Default for AppStateBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
