use std::collections::HashMap;
use std::sync::Arc;

use chatsync_types::models::{ConversationKey, Message, MessageId};
use parking_lot::RwLock;

use crate::timeline;

/// Shared, immutable view of one conversation's ordered messages.
pub type Bucket = Arc<Vec<Message>>;

/// Result of offering a real-time message to the history cache.
#[derive(Debug, PartialEq)]
pub enum Append {
    Inserted,
    /// Same id already cached or already parked; nothing changed.
    Duplicate,
    /// No bucket exists for the key yet; the message was parked.
    Parked,
}

/// Paginated history per conversation.
///
/// Buckets are replaced wholesale on every mutation, so a reader holding a
/// [`Bucket`] keeps a complete snapshot no matter what lands afterwards.
#[derive(Debug, Default)]
pub struct MessageCache {
    buckets: RwLock<HashMap<ConversationKey, Bucket>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConversationKey) -> Option<Bucket> {
        self.buckets.read().get(key).cloned()
    }

    pub fn has_bucket(&self, key: &ConversationKey) -> bool {
        self.buckets.read().contains_key(key)
    }

    pub fn contains_message(&self, key: &ConversationKey, id: &MessageId) -> bool {
        self.buckets
            .read()
            .get(key)
            .is_some_and(|bucket| timeline::contains(bucket, id))
    }

    /// Install the first page for `key`. `drain_pending` runs under the cache
    /// lock, so no real-time message can slip between the check for a bucket
    /// and the flush of parked messages.
    pub fn install<F>(&self, key: &ConversationKey, page: Vec<Message>, drain_pending: F) -> Bucket
    where
        F: FnOnce() -> Vec<Message>,
    {
        let mut buckets = self.buckets.write();
        let base = match buckets.get(key) {
            // A concurrent install won the race; fold this page into it.
            Some(existing) => timeline::prepend(existing, page),
            None => timeline::normalize(page),
        };
        let merged = Arc::new(timeline::append(&base, drain_pending()));
        buckets.insert(key.clone(), merged.clone());
        merged
    }

    /// Idempotent append. When no bucket exists `park` receives the message
    /// while the lock is still held and reports whether it was new.
    pub fn append_or_park<F>(&self, key: &ConversationKey, message: Message, park: F) -> Append
    where
        F: FnOnce(Message) -> bool,
    {
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get(key) else {
            return if park(message) {
                Append::Parked
            } else {
                Append::Duplicate
            };
        };
        match timeline::insert(bucket, message) {
            Some(next) => {
                buckets.insert(key.clone(), Arc::new(next));
                Append::Inserted
            }
            None => Append::Duplicate,
        }
    }

    /// Merge an older page in front of whatever the bucket holds now.
    pub fn prepend(&self, key: &ConversationKey, older: Vec<Message>) -> Bucket {
        let mut buckets = self.buckets.write();
        let merged = match buckets.get(key) {
            Some(existing) => timeline::prepend(existing, older),
            None => timeline::normalize(older),
        };
        let merged = Arc::new(merged);
        buckets.insert(key.clone(), merged.clone());
        merged
    }

    /// Replace the bucket for `key` with `update`'s result. Returns whether it changed.
    pub fn update<F>(&self, key: &ConversationKey, update: F) -> bool
    where
        F: FnOnce(&[Message]) -> Option<Vec<Message>>,
    {
        let mut buckets = self.buckets.write();
        let Some(next) = buckets.get(key).and_then(|bucket| update(bucket)) else {
            return false;
        };
        buckets.insert(key.clone(), Arc::new(next));
        true
    }

    /// Run `update` over every bucket; returns the keys that changed.
    pub fn update_all<F>(&self, mut update: F) -> Vec<ConversationKey>
    where
        F: FnMut(&[Message]) -> Option<Vec<Message>>,
    {
        let mut buckets = self.buckets.write();
        let mut changed = Vec::new();
        for (key, bucket) in buckets.iter_mut() {
            if let Some(next) = update(&bucket[..]) {
                *bucket = Arc::new(next);
                changed.push(key.clone());
            }
        }
        changed
    }

    pub fn clear(&self) {
        self.buckets.write().clear();
    }
}

/// Temporary "jump to message" windows. While one exists for a key it takes
/// display priority over [`MessageCache`].
#[derive(Debug, Default)]
pub struct SearchContextCache {
    windows: RwLock<HashMap<ConversationKey, Bucket>>,
}

impl SearchContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConversationKey) -> Option<Bucket> {
        self.windows.read().get(key).cloned()
    }

    pub fn has_window(&self, key: &ConversationKey) -> bool {
        self.windows.read().contains_key(key)
    }

    pub fn contains_message(&self, key: &ConversationKey, id: &MessageId) -> bool {
        self.windows
            .read()
            .get(key)
            .is_some_and(|window| timeline::contains(window, id))
    }

    /// Store a freshly fetched window, replacing any previous one for `key`.
    pub fn put(&self, key: &ConversationKey, page: Vec<Message>) -> Bucket {
        let window = Arc::new(timeline::normalize(page));
        self.windows.write().insert(key.clone(), window.clone());
        window
    }

    /// Merge newer messages behind the window. `None` if the window is gone.
    pub fn append(&self, key: &ConversationKey, newer: Vec<Message>) -> Option<Bucket> {
        let mut windows = self.windows.write();
        let window = windows.get_mut(key)?;
        *window = Arc::new(timeline::append(&window[..], newer));
        Some(window.clone())
    }

    pub fn remove(&self, key: &ConversationKey) -> bool {
        self.windows.write().remove(key).is_some()
    }

    pub fn update<F>(&self, key: &ConversationKey, update: F) -> bool
    where
        F: FnOnce(&[Message]) -> Option<Vec<Message>>,
    {
        let mut windows = self.windows.write();
        let Some(window) = windows.get_mut(key) else {
            return false;
        };
        match update(&window[..]) {
            Some(next) => {
                *window = Arc::new(next);
                true
            }
            None => false,
        }
    }

    pub fn update_all<F>(&self, mut update: F) -> Vec<ConversationKey>
    where
        F: FnMut(&[Message]) -> Option<Vec<Message>>,
    {
        let mut windows = self.windows.write();
        let mut changed = Vec::new();
        for (key, window) in windows.iter_mut() {
            if let Some(next) = update(&window[..]) {
                *window = Arc::new(next);
                changed.push(key.clone());
            }
        }
        changed
    }

    pub fn clear(&self) {
        self.windows.write().clear();
    }
}
