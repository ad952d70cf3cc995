use std::collections::{HashMap, VecDeque};

use chatsync_types::models::{ConversationKey, Message};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Real-time messages for conversations that have no history bucket yet.
/// Drained into the first bucket installed for the key.
#[derive(Debug)]
pub struct PendingEventBuffer {
    limit: usize,
    parked: Mutex<HashMap<ConversationKey, VecDeque<Message>>>,
}

impl PendingEventBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            parked: Mutex::new(HashMap::new()),
        }
    }

    /// Park a message. Duplicate ids are ignored; past the per-key limit the
    /// oldest parked message is dropped. Returns whether it was added.
    pub fn push(&self, key: &ConversationKey, message: Message) -> bool {
        let mut parked = self.parked.lock();
        let queue = parked.entry(key.clone()).or_default();
        if queue.iter().any(|m| m.id == message.id) {
            return false;
        }
        while queue.len() >= self.limit {
            let Some(dropped) = queue.pop_front() else {
                break;
            };
            warn!("pending buffer for {} full, dropping {}", key, dropped.id);
        }
        debug!("parked {} for {} ({} waiting)", message.id, key, queue.len() + 1);
        queue.push_back(message);
        true
    }

    pub fn drain(&self, key: &ConversationKey) -> Vec<Message> {
        self.parked
            .lock()
            .remove(key)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn len(&self, key: &ConversationKey) -> usize {
        self.parked.lock().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.parked.lock().is_empty()
    }

    pub fn clear(&self) {
        self.parked.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::fixtures::dm;

    #[test]
    fn push_dedups_by_id() {
        let buffer = PendingEventBuffer::new(10);
        let key = ConversationKey::direct("bob");
        assert!(buffer.push(&key, dm(1, "bob", "me")));
        assert!(!buffer.push(&key, dm(1, "bob", "me")));
        assert_eq!(buffer.len(&key), 1);
    }

    #[test]
    fn overflow_drops_oldest() {
        let buffer = PendingEventBuffer::new(2);
        let key = ConversationKey::direct("bob");
        for offset in 1..=3 {
            buffer.push(&key, dm(offset, "bob", "me"));
        }
        let drained = buffer.drain(&key);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, dm(2, "bob", "me").id);
        assert_eq!(buffer.len(&key), 0);
        assert!(buffer.is_empty());
    }
}
