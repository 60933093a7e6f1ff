use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::shared::AppError;

/// Signaling routes for one room's live broadcast: exactly one broadcaster
/// (the creator) and N independent viewers. This relays WebRTC handshake
/// routing decisions only; media descriptors and SDP payloads are opaque.
#[derive(Debug)]
pub struct BroadcastState {
    pub broadcaster_id: String,
    pub media_descriptor: serde_json::Value,
    pub started_at: DateTime<Utc>,
    viewers: HashSet<String>,
}

impl BroadcastState {
    pub fn new(
        broadcaster_id: String,
        media_descriptor: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            broadcaster_id,
            media_descriptor,
            started_at: now,
            viewers: HashSet::new(),
        }
    }

    /// Registers a viewer route. Returns false if the viewer was already
    /// registered.
    pub fn add_viewer(&mut self, viewer_id: &str) -> bool {
        self.viewers.insert(viewer_id.to_string())
    }

    /// Drops one viewer's route without touching the others
    pub fn remove_viewer(&mut self, viewer_id: &str) -> bool {
        self.viewers.remove(viewer_id)
    }

    pub fn has_viewer(&self, viewer_id: &str) -> bool {
        self.viewers.contains(viewer_id)
    }

    pub fn viewer_ids(&self) -> Vec<String> {
        self.viewers.iter().cloned().collect()
    }

    /// Resolves where an offer from the broadcaster should go
    pub fn route_offer(&self, from_id: &str, target_id: &str) -> Result<String, AppError> {
        if from_id != self.broadcaster_id {
            return Err(AppError::Forbidden(
                "Only the broadcaster may send offers".to_string(),
            ));
        }
        if !self.has_viewer(target_id) {
            return Err(AppError::SignalingTargetUnavailable(target_id.to_string()));
        }
        Ok(target_id.to_string())
    }

    /// Answers always route back to the broadcaster
    pub fn route_answer(&self, from_id: &str) -> Result<String, AppError> {
        if !self.has_viewer(from_id) {
            return Err(AppError::SignalingTargetUnavailable(from_id.to_string()));
        }
        Ok(self.broadcaster_id.clone())
    }

    /// ICE candidates are bidirectional: broadcaster -> named viewer,
    /// viewer -> broadcaster
    pub fn route_ice(&self, from_id: &str, to_id: Option<&str>) -> Result<String, AppError> {
        if from_id == self.broadcaster_id {
            let target = to_id.ok_or_else(|| {
                AppError::SignalingTargetUnavailable("no target viewer".to_string())
            })?;
            if !self.has_viewer(target) {
                return Err(AppError::SignalingTargetUnavailable(target.to_string()));
            }
            Ok(target.to_string())
        } else {
            if !self.has_viewer(from_id) {
                return Err(AppError::SignalingTargetUnavailable(from_id.to_string()));
            }
            Ok(self.broadcaster_id.clone())
        }
    }
}
