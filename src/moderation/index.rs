use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::models::{ModerationActionModel, ModerationKind};

/// Per-room derived view of the "currently effective" moderation state.
/// Persisted audit rows are the source of truth for history; this index is
/// recomputed lazily at decision time, so no background sweeper is needed
/// for correctness. `reap` is an optimization pass only.
#[derive(Debug, Default)]
pub struct ModerationIndex {
    /// target user -> expiry; None = indefinite
    mutes: HashMap<String, Option<DateTime<Utc>>>,
    bans: HashMap<String, Option<DateTime<Utc>>>,
    slow_mode_seconds: u32,
    /// last accepted message per user, for slow-mode enforcement
    last_sent: HashMap<String, DateTime<Utc>>,
}

fn expired(expiry: &Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expiry, Some(at) if *at <= now)
}

impl ModerationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one action to the effective state. Actions with no standing
    /// effect (warn, kick, message ops) fall through.
    pub fn apply(&mut self, action: &ModerationActionModel) {
        match (action.kind, &action.target_user_id) {
            (ModerationKind::Mute, Some(target)) => {
                self.mutes.insert(target.clone(), action.expires_at);
            }
            (ModerationKind::Unmute, Some(target)) => {
                self.mutes.remove(target);
            }
            (ModerationKind::Ban, Some(target)) => {
                self.bans.insert(target.clone(), action.expires_at);
            }
            (ModerationKind::Unban, Some(target)) => {
                self.bans.remove(target);
            }
            _ => {}
        }
    }

    /// Seeds the index from persisted rows, oldest first, so later
    /// unmute/unban rows supersede earlier mutes/bans.
    pub fn seed(&mut self, actions: &[ModerationActionModel]) {
        for action in actions {
            self.apply(action);
        }
    }

    pub fn is_muted(&mut self, user_id: &str, now: DateTime<Utc>) -> bool {
        match self.mutes.get(user_id) {
            Some(expiry) if expired(expiry, now) => {
                self.mutes.remove(user_id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn is_banned(&mut self, user_id: &str, now: DateTime<Utc>) -> bool {
        match self.bans.get(user_id) {
            Some(expiry) if expired(expiry, now) => {
                self.bans.remove(user_id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn set_slow_mode(&mut self, seconds: u32) {
        self.slow_mode_seconds = seconds;
        if seconds == 0 {
            self.last_sent.clear();
        }
    }

    pub fn slow_mode_seconds(&self) -> u32 {
        self.slow_mode_seconds
    }

    /// Checks the slow-mode gate for a non-privileged sender. Err carries
    /// the seconds remaining until the next message is allowed.
    pub fn check_slow_mode(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), i64> {
        if self.slow_mode_seconds == 0 {
            return Ok(());
        }
        match self.last_sent.get(user_id) {
            Some(last) => {
                let elapsed = (now - *last).num_seconds();
                let window = self.slow_mode_seconds as i64;
                if elapsed < window {
                    Err(window - elapsed)
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    pub fn record_send(&mut self, user_id: &str, now: DateTime<Utc>) {
        if self.slow_mode_seconds > 0 {
            self.last_sent.insert(user_id.to_string(), now);
        }
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn reap(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.mutes.len() + self.bans.len();
        self.mutes.retain(|_, expiry| !expired(expiry, now));
        self.bans.retain(|_, expiry| !expired(expiry, now));
        before - (self.mutes.len() + self.bans.len())
    }
}
