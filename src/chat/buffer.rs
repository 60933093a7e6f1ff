use std::collections::{HashMap, VecDeque};

use super::models::MessageModel;

/// Bounded most-recent-N live message buffer. Messages are flat records
/// indexed by id with a separate order deque; reply chains are id lookups,
/// never nested graphs. Serves history on join without re-querying the
/// store.
#[derive(Debug)]
pub struct ChatBuffer {
    capacity: usize,
    order: VecDeque<String>,
    by_id: HashMap<String, MessageModel>,
    pinned: Option<String>,
}

impl ChatBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            by_id: HashMap::new(),
            pinned: None,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends a message, evicting the oldest entry at capacity
    pub fn push(&mut self, message: MessageModel) {
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.by_id.remove(&evicted);
                if self.pinned.as_deref() == Some(evicted.as_str()) {
                    self.pinned = None;
                }
            }
        }
        self.order.push_back(message.id.clone());
        self.by_id.insert(message.id.clone(), message);
    }

    pub fn get(&self, message_id: &str) -> Option<&MessageModel> {
        self.by_id.get(message_id)
    }

    pub fn get_mut(&mut self, message_id: &str) -> Option<&mut MessageModel> {
        self.by_id.get_mut(message_id)
    }

    /// Tombstones a message in place; the entry keeps its position and id
    pub fn delete(&mut self, message_id: &str) -> bool {
        match self.by_id.get_mut(message_id) {
            Some(message) => {
                message.tombstone();
                true
            }
            None => false,
        }
    }

    /// Pins a message, implicitly unpinning any prior pin. Returns the
    /// previously pinned id.
    pub fn pin(&mut self, message_id: &str) -> Option<String> {
        if !self.by_id.contains_key(message_id) {
            return None;
        }
        let previous = self.pinned.take();
        if let Some(prev_id) = &previous {
            if let Some(prev) = self.by_id.get_mut(prev_id) {
                prev.is_pinned = false;
            }
        }
        if let Some(message) = self.by_id.get_mut(message_id) {
            message.is_pinned = true;
        }
        self.pinned = Some(message_id.to_string());
        previous
    }

    pub fn unpin(&mut self) -> Option<String> {
        let previous = self.pinned.take();
        if let Some(prev_id) = &previous {
            if let Some(prev) = self.by_id.get_mut(prev_id) {
                prev.is_pinned = false;
            }
        }
        previous
    }

    pub fn pinned_id(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    /// Tombstones every non-deleted message. Returns how many were cleared.
    pub fn clear(&mut self) -> usize {
        let mut cleared = 0;
        for message in self.by_id.values_mut() {
            if !message.is_deleted {
                message.tombstone();
                cleared += 1;
            }
        }
        cleared
    }

    /// Messages in send order, oldest first
    pub fn snapshot(&self) -> Vec<MessageModel> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }
}
