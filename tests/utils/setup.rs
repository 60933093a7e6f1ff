use std::sync::Arc;

use looproom::auth::TokenConfig;
use looproom::chat::repository::InMemoryMessageRepository;
use looproom::moderation::repository::InMemoryModerationRepository;
use looproom::room::config::RoomConfig;
use looproom::room::models::LooproomModel;
use looproom::room::repository::InMemoryLooproomRepository;
use looproom::session::repository::InMemorySessionRepository;
use looproom::shared::AppState;
use looproom::websockets::{LooproomReceiveHandler, MessageHandler};
use looproom::RoomRegistry;

use super::mocks::MockConnectionManager;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub const ROOM_ID: &str = "calm-corner";

pub struct TestSetup {
    pub app_state: AppState,
    pub mock_conn_manager: Arc<MockConnectionManager>,
    pub users: Vec<String>,
}

impl TestSetup {
    /// Feeds one raw client event through the receive handler, exactly as
    /// an inbound socket frame would arrive. The sender's display name is
    /// their user id.
    pub async fn send_event(&self, user_id: &str, json: &str) {
        let handler =
            LooproomReceiveHandler::new(self.app_state.clone(), user_id.to_string());
        handler
            .handle_message(user_id, ROOM_ID, json.to_string())
            .await;
    }

    pub async fn join(&self, user_id: &str) {
        self.send_event(
            user_id,
            &format!(r#"{{"event": "join-looproom", "roomId": "{ROOM_ID}"}}"#),
        )
        .await;
    }

    pub async fn send_chat(&self, user_id: &str, content: &str) {
        self.send_event(
            user_id,
            &format!(
                r#"{{"event": "send-message", "roomId": "{ROOM_ID}", "content": "{content}"}}"#
            ),
        )
        .await;
    }

    /// All events a user has received, parsed off the wire
    pub async fn events_for(&self, user_id: &str) -> Vec<serde_json::Value> {
        self.mock_conn_manager
            .get_messages_for(user_id)
            .await
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("server emitted invalid JSON"))
            .collect()
    }

    pub async fn events_named(&self, user_id: &str, event: &str) -> Vec<serde_json::Value> {
        self.events_for(user_id)
            .await
            .into_iter()
            .filter(|v| v["event"] == event)
            .collect()
    }

    pub async fn clear_messages(&self) {
        self.mock_conn_manager.clear_messages().await;
    }
}

pub struct TestSetupBuilder {
    users: Vec<String>,
    capacity: Option<i32>,
    config: RoomConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            capacity: None,
            config: RoomConfig::default(),
        }
    }

    pub fn with_users(mut self, users: Vec<&str>) -> Self {
        self.users = users.into_iter().map(|s| s.to_string()).collect();
        self
    }

    /// Creator plus two regulars, everyone already joined
    pub fn with_three_users(self) -> Self {
        self.with_users(vec!["alice", "bob", "carol"])
    }

    pub fn with_capacity(mut self, capacity: i32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_config(mut self, config: RoomConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the room (first user is the creator) and joins every user
    pub async fn build(self) -> TestSetup {
        let creator = self
            .users
            .first()
            .cloned()
            .unwrap_or_else(|| "alice".to_string());
        let room = LooproomModel {
            id: ROOM_ID.to_string(),
            creator_id: creator,
            name: "Calm Corner".to_string(),
            capacity: self.capacity,
        };

        let looproom_repository = Arc::new(InMemoryLooproomRepository::with_rooms(vec![room]));
        let message_repository = Arc::new(InMemoryMessageRepository::new());
        let mock_conn_manager = Arc::new(MockConnectionManager::new());
        let registry = Arc::new(RoomRegistry::new(
            self.config,
            looproom_repository.clone(),
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(InMemoryModerationRepository::new()),
            message_repository.clone(),
            mock_conn_manager.clone(),
        ));

        let app_state = AppState::new(
            looproom_repository,
            message_repository,
            registry,
            mock_conn_manager.clone(),
            TokenConfig::new(),
        );

        let setup = TestSetup {
            app_state,
            mock_conn_manager,
            users: self.users.clone(),
        };

        for user in &self.users {
            setup.mock_conn_manager.add_connected_user(user).await;
            setup.join(user).await;
        }
        // joins themselves are not under test in most scenarios
        setup.clear_messages().await;

        setup
    }
}
