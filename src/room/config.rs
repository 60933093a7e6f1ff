use std::time::Duration;

/// Runtime knobs for live rooms and the registry sweep task
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum concurrently active participants per room
    pub capacity: usize,
    /// How long a room may sit empty before it is evicted
    pub idle_window: Duration,
    /// How long an active session survives a creator disconnect
    pub creator_grace: Duration,
    /// How often the registry sweeps for idle rooms and expired moderation
    pub sweep_interval: Duration,
    /// Most-recent-N live message buffer size
    pub buffer_size: usize,
    /// How many persisted messages to hydrate into a fresh buffer
    pub history_limit: u32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            idle_window: Duration::from_secs(5 * 60),
            creator_grace: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            buffer_size: 200,
            history_limit: 50,
        }
    }
}
