use std::collections::HashSet;

use super::ChatMessage;

/// Ordered chat feed.
///
/// Storage is in arrival order (oldest first) so live pushes are a cheap
/// append; readers get the display order, newest first. Message ids are
/// unique: a repeated id is dropped, never re-ordered.
#[derive(Debug, Default, Clone)]
pub struct MessageFeed {
    arrived: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the feed with history delivered newest first.
    pub fn load_history(&mut self, newest_first: Vec<ChatMessage>) -> usize {
        self.arrived.clear();
        self.ids.clear();
        for message in newest_first.into_iter().rev() {
            self.push(message);
        }
        self.arrived.len()
    }

    /// Add a live message at the head of the feed. Returns `false` for a
    /// duplicate id.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.arrived.push(message);
        true
    }

    pub fn len(&self) -> usize {
        self.arrived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrived.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn latest(&self) -> Option<&ChatMessage> {
        self.arrived.last()
    }

    /// Display order, most recent first.
    pub fn newest_first(&self) -> impl Iterator<Item = &ChatMessage> {
        self.arrived.iter().rev()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.newest_first().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.arrived.clear();
        self.ids.clear();
    }
}
