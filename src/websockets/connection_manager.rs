use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Outbound delivery surface. The manager mints the channel on `register`
/// and keeps the only sender, so `remove_connection` is also the hangup
/// path: dropping the entry closes the channel and the socket loop that
/// drains the returned receiver terminates. Kick and ban rely on this
/// after queuing their terminal event.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Registers a user and hands back the receiving end of their
    /// outbound channel. Registering again replaces the prior entry,
    /// hanging up the old connection.
    async fn register(&self, user_id: String) -> mpsc::UnboundedReceiver<String>;

    async fn remove_connection(&self, user_id: &str);

    async fn is_connected(&self, user_id: &str) -> bool;

    async fn send_to_user(&self, user_id: &str, message: &str);

    async fn send_to_users(&self, user_ids: &[String], message: &str);
}

pub struct InMemoryConnectionManager {
    // user_id -> the sole sender for that user's outbound channel
    senders: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl Default for InMemoryConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionManager {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConnectionManager for InMemoryConnectionManager {
    async fn register(&self, user_id: String) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut senders = self.senders.write().await;
        senders.insert(user_id, sender);
        receiver
    }

    async fn remove_connection(&self, user_id: &str) {
        let mut senders = self.senders.write().await;
        senders.remove(user_id);
    }

    async fn is_connected(&self, user_id: &str) -> bool {
        let senders = self.senders.read().await;
        senders.contains_key(user_id)
    }

    async fn send_to_user(&self, user_id: &str, message: &str) {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(user_id) {
            let _ = sender.send(message.to_string());
        }
    }

    async fn send_to_users(&self, user_ids: &[String], message: &str) {
        let senders = self.senders.read().await;
        for user_id in user_ids {
            if let Some(sender) = senders.get(user_id) {
                let _ = sender.send(message.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_targeted_and_multicast_send() {
        let manager = InMemoryConnectionManager::new();
        let mut rx1 = manager.register("u1".to_string()).await;
        let mut rx2 = manager.register("u2".to_string()).await;

        manager.send_to_user("u1", "direct").await;
        manager
            .send_to_users(&["u1".to_string(), "u2".to_string()], "fanout")
            .await;

        assert_eq!(rx1.recv().await.unwrap(), "direct");
        assert_eq!(rx1.recv().await.unwrap(), "fanout");
        assert_eq!(rx2.recv().await.unwrap(), "fanout");
    }

    #[tokio::test]
    async fn test_remove_closes_channel() {
        let manager = InMemoryConnectionManager::new();
        let mut rx = manager.register("u1".to_string()).await;
        assert!(manager.is_connected("u1").await);

        manager.remove_connection("u1").await;
        assert!(!manager.is_connected("u1").await);
        // the manager held the only sender, so the receiver observes closure
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reregister_hangs_up_prior_connection() {
        let manager = InMemoryConnectionManager::new();
        let mut old_rx = manager.register("u1".to_string()).await;
        let mut new_rx = manager.register("u1".to_string()).await;

        manager.send_to_user("u1", "hello").await;

        assert!(old_rx.recv().await.is_none());
        assert_eq!(new_rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_to_unknown_user_is_noop() {
        let manager = InMemoryConnectionManager::new();
        manager.send_to_user("ghost", "hello").await;
    }
}
