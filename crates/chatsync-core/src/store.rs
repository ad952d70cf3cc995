use std::collections::HashMap;

use chatsync_types::models::{ConversationKey, Message};
use parking_lot::RwLock;

use crate::cache::{Append, Bucket, MessageCache, SearchContextCache};
use crate::config::SyncConfig;
use crate::pending::PendingEventBuffer;
use crate::pins::PinnedMessageSet;

/// Everything the engine caches for one signed-in user.
///
/// Created with the session and shared by `Arc` with the pager and the
/// router; [`SyncStore::clear`] is the sign-out teardown.
#[derive(Debug)]
pub struct SyncStore {
    history: MessageCache,
    search: SearchContextCache,
    pending: PendingEventBuffer,
    pins: RwLock<HashMap<ConversationKey, PinnedMessageSet>>,
}

impl SyncStore {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            history: MessageCache::new(),
            search: SearchContextCache::new(),
            pending: PendingEventBuffer::new(config.pending_limit),
            pins: RwLock::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &MessageCache {
        &self.history
    }

    pub fn search(&self) -> &SearchContextCache {
        &self.search
    }

    pub fn pending(&self) -> &PendingEventBuffer {
        &self.pending
    }

    /// Store a first page and flush anything parked for the key into it.
    pub fn install_initial(&self, key: &ConversationKey, page: Vec<Message>) -> Bucket {
        self.history.install(key, page, || self.pending.drain(key))
    }

    /// Append a real-time message, parking it when the key has no bucket.
    pub fn append_realtime(&self, key: &ConversationKey, message: Message) -> Append {
        self.history
            .append_or_park(key, message, |parked| self.pending.push(key, parked))
    }

    pub fn pins(&self, key: &ConversationKey) -> PinnedMessageSet {
        self.pins.read().get(key).cloned().unwrap_or_default()
    }

    /// Mutate the pin set for `key`, creating it on first use.
    pub fn update_pins<F, R>(&self, key: &ConversationKey, update: F) -> R
    where
        F: FnOnce(&mut PinnedMessageSet) -> R,
    {
        update(self.pins.write().entry(key.clone()).or_default())
    }

    pub fn clear(&self) {
        self.history.clear();
        self.search.clear();
        self.pending.clear();
        self.pins.write().clear();
    }
}
