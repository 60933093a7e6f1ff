use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use looproom::websockets::ConnectionManager;

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Records every outbound message per user instead of writing to sockets
#[derive(Clone)]
pub struct MockConnectionManager {
    sent_messages: Arc<RwLock<HashMap<String, Vec<String>>>>,
    connected_users: Arc<RwLock<Vec<String>>>,
}

impl MockConnectionManager {
    pub fn new() -> Self {
        Self {
            sent_messages: Arc::new(RwLock::new(HashMap::new())),
            connected_users: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn add_connected_user(&self, user_id: &str) {
        self.connected_users.write().await.push(user_id.to_string());
    }

    pub async fn get_messages_for(&self, user_id: &str) -> Vec<String> {
        self.sent_messages
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn clear_messages(&self) {
        self.sent_messages.write().await.clear();
    }
}

#[async_trait]
impl ConnectionManager for MockConnectionManager {
    async fn register(&self, user_id: String) -> mpsc::UnboundedReceiver<String> {
        self.add_connected_user(&user_id).await;
        // deliveries are recorded in sent_messages; the channel is unused
        let (_sender, receiver) = mpsc::unbounded_channel();
        receiver
    }

    async fn remove_connection(&self, user_id: &str) {
        self.connected_users.write().await.retain(|u| u != user_id);
    }

    async fn is_connected(&self, user_id: &str) -> bool {
        self.connected_users
            .read()
            .await
            .iter()
            .any(|u| u == user_id)
    }

    async fn send_to_user(&self, user_id: &str, message: &str) {
        self.sent_messages
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(message.to_string());
    }

    async fn send_to_users(&self, user_ids: &[String], message: &str) {
        for user_id in user_ids {
            self.send_to_user(user_id, message).await;
        }
    }
}
