use std::collections::HashSet;
use std::sync::Arc;

use chatsync_types::events::{
    DeleteForMe, PinNotice, PinnedPayload, RecallNotice, SeenUpdate, ServerEvent, UnpinNotice,
};
use chatsync_types::models::{ConversationKey, Message, MessageId, RecallInfo};
use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::Append;
use crate::collaborators::Collaborators;
use crate::seen::SeenStatusProjector;
use crate::store::SyncStore;
use crate::timeline;

/// What a routed event touched, so the session knows what to re-render.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Conversations whose messages changed.
    pub messages: Vec<ConversationKey>,
    /// Conversations whose pin set changed.
    pub pins: Vec<ConversationKey>,
    /// The local user posted a system message here, i.e. left the group.
    pub left_group: Option<ConversationKey>,
}

impl RouteOutcome {
    fn messages(keys: Vec<ConversationKey>) -> Self {
        Self {
            messages: keys,
            ..Default::default()
        }
    }

    fn pins(key: ConversationKey) -> Self {
        Self {
            pins: vec![key],
            ..Default::default()
        }
    }

    pub fn touches(&self, key: &ConversationKey) -> bool {
        self.messages.contains(key) || self.pins.contains(key)
    }
}

/// Applies real-time events to the store. Each event is handled to completion
/// before the next one; nothing here awaits.
pub struct RealtimeEventRouter {
    store: Arc<SyncStore>,
    local_user: String,
    projector: SeenStatusProjector,
    collaborators: Collaborators,
}

impl RealtimeEventRouter {
    pub fn new(store: Arc<SyncStore>, local_user: impl Into<String>, collaborators: Collaborators) -> Self {
        let local_user = local_user.into();
        Self {
            store,
            projector: SeenStatusProjector::new(local_user.clone()),
            local_user,
            collaborators,
        }
    }

    pub fn route(&self, event: &ServerEvent) -> RouteOutcome {
        match event {
            ServerEvent::Chat(message) => self.on_message(message),
            ServerEvent::SeenUpdate(seen) => self.on_seen(seen),
            ServerEvent::DeleteForMe(delete) => self.on_delete(delete),
            ServerEvent::Recall(recall) => self.on_recall(recall),
            ServerEvent::Pin(pin) => self.on_pin(pin),
            ServerEvent::Unpin(unpin) => self.on_unpin(unpin),
            ServerEvent::Ping | ServerEvent::Pong => RouteOutcome::default(),
        }
    }

    fn key_for(&self, sender: &str, receiver: Option<&str>, group: Option<&str>) -> ConversationKey {
        ConversationKey::for_participants(&self.local_user, sender, receiver, group)
    }

    fn on_message(&self, message: &Message) -> RouteOutcome {
        let key = message.conversation_key(&self.local_user);
        let mine = message.sender_id == self.local_user;
        let mut outcome = RouteOutcome::default();
        if mine && message.is_system() && key.is_group() {
            outcome.left_group = Some(key.clone());
        }

        match self.store.append_realtime(&key, message.clone()) {
            Append::Parked => {
                debug!("{}: no bucket yet, parked {}", key, message.id);
                self.chime(mine);
            }
            Append::Duplicate => {
                debug!("{}: duplicate {} ignored", key, message.id);
            }
            Append::Inserted => {
                debug!("{}: appended {}", key, message.id);
                self.chime(mine);
                outcome.messages.push(key);
            }
        }
        outcome
    }

    /// New messages from anyone else ring, whether or not their conversation
    /// is cached yet.
    fn chime(&self, mine: bool) {
        if !mine && !self.collaborators.sound.is_muted() {
            self.collaborators.sound.play();
        }
    }

    fn on_seen(&self, seen: &SeenUpdate) -> RouteOutcome {
        if seen.last_seen_message_id.embedded_secs().is_none() {
            warn!(
                "seen update with undecodable id {} ignored",
                seen.last_seen_message_id
            );
            return RouteOutcome::default();
        }
        // The conversation is keyed by whichever side is not us.
        let peer = if seen.sender_id == self.local_user {
            &seen.receiver_id
        } else {
            &seen.sender_id
        };
        let key = ConversationKey::direct(peer);
        let last_seen = &seen.last_seen_message_id;

        let mut changed = Vec::new();
        let in_history = self
            .store
            .history()
            .update(&key, |bucket| self.projector.advance(bucket, last_seen));
        let in_search = self
            .store
            .search()
            .update(&key, |bucket| self.projector.advance(bucket, last_seen));
        if in_history || in_search {
            changed.push(key.clone());
        }
        self.collaborators.conversations.reset_unread(&key);
        debug!("{}: seen up to {}", key, last_seen);
        RouteOutcome::messages(changed)
    }

    fn on_delete(&self, delete: &DeleteForMe) -> RouteOutcome {
        if delete.user_id != self.local_user {
            debug!("delete_for_me for {} ignored", delete.user_id);
            return RouteOutcome::default();
        }
        let ids: HashSet<MessageId> = delete.message_ids.iter().cloned().collect();
        let mut changed = self
            .store
            .history()
            .update_all(|bucket| timeline::remove_ids(bucket, &ids));
        for key in self
            .store
            .search()
            .update_all(|bucket| timeline::remove_ids(bucket, &ids))
        {
            if !changed.contains(&key) {
                changed.push(key);
            }
        }
        debug!("deleted {} ids for me across {} buckets", ids.len(), changed.len());
        RouteOutcome::messages(changed)
    }

    fn on_recall(&self, recall: &RecallNotice) -> RouteOutcome {
        let key = self.key_for(
            &recall.sender_id,
            recall.receiver_id.as_deref(),
            recall.group_id.as_deref(),
        );
        let info = RecallInfo {
            recalled_at: recall.recalled_at.unwrap_or_else(Utc::now),
            recalled_by: recall.recalled_by.clone(),
        };
        let mark = |bucket: &[Message]| {
            timeline::update_each(bucket, |message| {
                if message.id != recall.id || message.recall.as_ref() == Some(&info) {
                    return false;
                }
                message.recall = Some(info.clone());
                true
            })
        };

        let in_history = self.store.history().update(&key, mark);
        let in_search = self.store.search().update(&key, mark);
        if !(in_history || in_search) {
            debug!("{}: recalled {} not cached", key, recall.id);
            return RouteOutcome::default();
        }
        RouteOutcome::messages(vec![key])
    }

    fn on_pin(&self, pin: &PinNotice) -> RouteOutcome {
        let key = self.key_for(&pin.sender_id, pin.receiver_id.as_deref(), pin.group_id.as_deref());
        self.store.update_pins(&key, |set| match &pin.pinned {
            PinnedPayload::Single(one) => set.upsert(one.clone()),
            PinnedPayload::List(all) => set.replace_all(all.clone()),
        });
        RouteOutcome::pins(key)
    }

    fn on_unpin(&self, unpin: &UnpinNotice) -> RouteOutcome {
        let key = self.key_for(
            &unpin.sender_id,
            unpin.receiver_id.as_deref(),
            unpin.group_id.as_deref(),
        );
        let removed = self.store.update_pins(&key, |set| {
            set.remove(Some(&unpin.message_id), unpin.pin_id.as_deref())
        });
        if !removed {
            debug!("{}: unpinned {} was not listed", key, unpin.message_id);
            return RouteOutcome::default();
        }
        RouteOutcome::pins(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chatsync_types::models::{MessageStatus, PinnedMessage};

    use super::*;
    use crate::collaborators::{ConversationList, SoundCue};
    use crate::config::SyncConfig;
    use crate::timeline::fixtures::{dm, oid};

    #[derive(Default)]
    struct Counters {
        sounds: AtomicUsize,
        resets: AtomicUsize,
    }

    impl SoundCue for Counters {
        fn is_muted(&self) -> bool {
            false
        }

        fn play(&self) {
            self.sounds.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ConversationList for Counters {
        fn reset_unread(&self, _key: &ConversationKey) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn router(local: &str) -> (RealtimeEventRouter, Arc<SyncStore>, Arc<Counters>) {
        let store = Arc::new(SyncStore::new(&SyncConfig::default()));
        let counters = Arc::new(Counters::default());
        let collaborators = Collaborators {
            sound: counters.clone(),
            conversations: counters.clone(),
            ..Default::default()
        };
        (
            RealtimeEventRouter::new(store.clone(), local, collaborators),
            store,
            counters,
        )
    }

    #[test]
    fn chat_without_bucket_is_parked_and_rings() {
        let (router, store, counters) = router("me");
        let outcome = router.route(&ServerEvent::Chat(dm(1, "bob", "me")));
        assert!(outcome.messages.is_empty());
        assert_eq!(store.pending().len(&ConversationKey::direct("bob")), 1);
        assert_eq!(counters.sounds.load(Ordering::SeqCst), 1);

        // Redelivered while still parked: no second ring.
        router.route(&ServerEvent::Chat(dm(1, "bob", "me")));
        assert_eq!(store.pending().len(&ConversationKey::direct("bob")), 1);
        assert_eq!(counters.sounds.load(Ordering::SeqCst), 1);

        // Our own echo to an uncached conversation stays quiet.
        router.route(&ServerEvent::Chat(dm(2, "me", "eve")));
        assert_eq!(store.pending().len(&ConversationKey::direct("eve")), 1);
        assert_eq!(counters.sounds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chat_plays_sound_only_for_peer_messages() {
        let (router, store, counters) = router("me");
        let key = ConversationKey::direct("bob");
        store.install_initial(&key, vec![dm(1, "bob", "me")]);

        router.route(&ServerEvent::Chat(dm(2, "me", "bob")));
        assert_eq!(counters.sounds.load(Ordering::SeqCst), 0);

        let outcome = router.route(&ServerEvent::Chat(dm(3, "bob", "me")));
        assert_eq!(outcome.messages, vec![key.clone()]);
        assert_eq!(counters.sounds.load(Ordering::SeqCst), 1);

        // Replayed delivery: no change, no sound.
        let outcome = router.route(&ServerEvent::Chat(dm(3, "bob", "me")));
        assert!(outcome.messages.is_empty());
        assert_eq!(counters.sounds.load(Ordering::SeqCst), 1);
        assert_eq!(store.history().get(&key).unwrap().len(), 3);
    }

    #[test]
    fn seen_marks_history_and_search_and_resets_unread() {
        let (router, store, counters) = router("me");
        let key = ConversationKey::direct("bob");
        store.install_initial(&key, vec![dm(1, "me", "bob"), dm(5, "me", "bob")]);
        store.search().put(&key, vec![dm(2, "me", "bob")]);

        let outcome = router.route(&ServerEvent::SeenUpdate(SeenUpdate {
            last_seen_message_id: oid(2, 0),
            sender_id: "bob".into(),
            receiver_id: "me".into(),
        }));

        assert_eq!(outcome.messages, vec![key.clone()]);
        let history = store.history().get(&key).unwrap();
        assert_eq!(history[0].status, MessageStatus::Seen);
        assert_eq!(history[1].status, MessageStatus::Sent);
        assert_eq!(store.search().get(&key).unwrap()[0].status, MessageStatus::Seen);
        assert_eq!(counters.resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_for_me_requires_local_user() {
        let (router, store, _) = router("u2");
        let key = ConversationKey::direct("bob");
        let doomed = dm(1, "bob", "u2");
        store.install_initial(&key, vec![doomed.clone(), dm(2, "bob", "u2")]);

        let foreign = DeleteForMe {
            user_id: "u1".into(),
            message_ids: vec![doomed.id.clone()],
        };
        assert!(router.route(&ServerEvent::DeleteForMe(foreign)).messages.is_empty());
        assert_eq!(store.history().get(&key).unwrap().len(), 2);

        let own = DeleteForMe {
            user_id: "u2".into(),
            message_ids: vec![doomed.id.clone()],
        };
        assert_eq!(router.route(&ServerEvent::DeleteForMe(own)).messages, vec![key.clone()]);
        assert_eq!(store.history().get(&key).unwrap().len(), 1);
    }

    #[test]
    fn recall_marks_message_in_place() {
        let (router, store, _) = router("me");
        let key = ConversationKey::direct("bob");
        let target = dm(1, "bob", "me");
        store.install_initial(&key, vec![target.clone(), dm(2, "me", "bob")]);

        router.route(&ServerEvent::Recall(RecallNotice {
            id: target.id.clone(),
            sender_id: "bob".into(),
            receiver_id: Some("me".into()),
            group_id: None,
            recalled_by: "bob".into(),
            recalled_at: None,
        }));

        let bucket = store.history().get(&key).unwrap();
        assert_eq!(bucket.len(), 2);
        assert!(bucket[0].is_recalled());
        assert!(!bucket[1].is_recalled());
    }

    #[test]
    fn pin_and_unpin_follow_participants() {
        let (router, store, _) = router("me");
        let pinned = PinnedMessage {
            pin_id: "p1".into(),
            message_id: MessageId::new("m1"),
            ..Default::default()
        };
        let outcome = router.route(&ServerEvent::Pin(PinNotice {
            sender_id: "bob".into(),
            receiver_id: Some("me".into()),
            group_id: None,
            pinned: PinnedPayload::Single(pinned),
        }));
        let key = ConversationKey::direct("bob");
        assert_eq!(outcome.pins, vec![key.clone()]);
        assert_eq!(store.pins(&key).len(), 1);

        router.route(&ServerEvent::Unpin(UnpinNotice {
            sender_id: "me".into(),
            receiver_id: Some("bob".into()),
            group_id: None,
            message_id: MessageId::new("m1"),
            pin_id: None,
            conversation_id: None,
        }));
        assert!(store.pins(&key).is_empty());
    }

    #[test]
    fn own_system_message_in_group_flags_departure() {
        let (router, _, _) = router("me");
        let mut left = dm(1, "me", "");
        left.receiver_id = None;
        left.group_id = Some("g1".into());
        left.kind = "system".into();

        let outcome = router.route(&ServerEvent::Chat(left));
        assert_eq!(outcome.left_group, Some(ConversationKey::group("g1")));
    }
}
