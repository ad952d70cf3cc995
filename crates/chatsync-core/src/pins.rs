use chatsync_types::models::{MessageId, PinnedMessage};
use chrono::Utc;

/// Pinned messages of one conversation, newest pin first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinnedMessageSet {
    entries: Vec<PinnedMessage>,
}

impl PinnedMessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PinnedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `pin` into the entry sharing its pin id or message id, or add it
    /// at the front. A pin without a timestamp is stamped with the current time.
    pub fn upsert(&mut self, mut pin: PinnedMessage) {
        if pin.pinned_at.is_none() {
            pin.pinned_at = Some(Utc::now());
        }
        match self.entries.iter_mut().find(|p| same_pin(p, &pin)) {
            Some(existing) => merge(existing, pin),
            None => self.entries.insert(0, pin),
        }
        self.sort();
    }

    /// Drop every entry matching either key. Returns whether anything went.
    pub fn remove(&mut self, message_id: Option<&MessageId>, pin_id: Option<&str>) -> bool {
        let pin_id = pin_id.filter(|id| !id.is_empty());
        let before = self.entries.len();
        self.entries.retain(|p| {
            let by_message = message_id.is_some_and(|id| &p.message_id == id);
            let by_pin = pin_id.is_some_and(|id| p.pin_id == id);
            !(by_message || by_pin)
        });
        self.entries.len() != before
    }

    /// Swap in an authoritative list from the server.
    pub fn replace_all(&mut self, pins: Vec<PinnedMessage>) {
        self.entries = pins;
        self.sort();
    }

    fn sort(&mut self) {
        // Option orders None first, so descending leaves undated pins last.
        self.entries.sort_by(|a, b| b.pinned_at.cmp(&a.pinned_at));
    }
}

fn same_pin(a: &PinnedMessage, b: &PinnedMessage) -> bool {
    let pin_match = !a.pin_id.is_empty() && a.pin_id == b.pin_id;
    pin_match || a.message_id == b.message_id
}

fn merge(into: &mut PinnedMessage, from: PinnedMessage) {
    fn take(field: &mut String, value: String) {
        if !value.is_empty() {
            *field = value;
        }
    }

    take(&mut into.pin_id, from.pin_id);
    take(&mut into.conversation_id, from.conversation_id);
    take(&mut into.content, from.content);
    take(&mut into.sender_id, from.sender_id);
    take(&mut into.pinned_by_id, from.pinned_by_id);
    take(&mut into.message_type, from.message_type);
    if !from.message_id.as_str().is_empty() {
        into.message_id = from.message_id;
    }
    into.sender_name = from.sender_name.or(into.sender_name.take());
    into.pinned_by_name = from.pinned_by_name.or(into.pinned_by_name.take());
    into.pinned_at = from.pinned_at.or(into.pinned_at);
    into.note = from.note.or(into.note.take());
    into.created_at = from.created_at.or(into.created_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::fixtures::at;

    fn pin(pin_id: &str, message_id: &str, offset: u32) -> PinnedMessage {
        PinnedMessage {
            pin_id: pin_id.into(),
            message_id: MessageId::new(message_id),
            content: format!("pinned {message_id}"),
            pinned_at: Some(at(offset)),
            ..Default::default()
        }
    }

    fn message_ids(set: &PinnedMessageSet) -> Vec<&str> {
        set.entries().iter().map(|p| p.message_id.as_str()).collect()
    }

    #[test]
    fn upsert_sorts_newest_first() {
        let mut set = PinnedMessageSet::new();
        set.upsert(pin("p1", "m1", 10));
        set.upsert(pin("p2", "m2", 30));
        set.upsert(pin("p3", "m3", 20));
        assert_eq!(message_ids(&set), vec!["m2", "m3", "m1"]);
    }

    #[test]
    fn upsert_dedups_on_pin_id_or_message_id() {
        let mut set = PinnedMessageSet::new();
        set.upsert(pin("p1", "m1", 10));

        // Same message, new pin id: still one entry.
        set.upsert(pin("p9", "m1", 40));
        assert_eq!(set.len(), 1);
        assert_eq!(set.entries()[0].pin_id, "p9");

        // Same pin id, message id matches too: merged, note kept.
        let mut noted = pin("p9", "m1", 40);
        noted.note = Some("read this".into());
        set.upsert(noted);
        let mut bare = pin("p9", "m1", 41);
        bare.content.clear();
        set.upsert(bare);

        assert_eq!(set.len(), 1);
        let only = &set.entries()[0];
        assert_eq!(only.note.as_deref(), Some("read this"));
        assert_eq!(only.content, "pinned m1");
        assert_eq!(only.pinned_at, Some(at(41)));
    }

    #[test]
    fn empty_pin_ids_do_not_collide() {
        let mut set = PinnedMessageSet::new();
        set.upsert(pin("", "m1", 1));
        set.upsert(pin("", "m2", 2));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn undated_pin_is_stamped() {
        let mut set = PinnedMessageSet::new();
        set.upsert(pin("p1", "m1", 10));
        let mut fresh = pin("p2", "m2", 0);
        fresh.pinned_at = None;
        set.upsert(fresh);
        assert_eq!(message_ids(&set), vec!["m2", "m1"]);
    }

    #[test]
    fn remove_matches_either_key() {
        let mut set = PinnedMessageSet::new();
        set.upsert(pin("p1", "m1", 1));
        set.upsert(pin("p2", "m2", 2));
        set.upsert(pin("p3", "m3", 3));

        assert!(set.remove(Some(&MessageId::new("m1")), None));
        assert!(set.remove(Some(&MessageId::new("nope")), Some("p3")));
        assert!(!set.remove(None, Some("")));
        assert_eq!(message_ids(&set), vec!["m2"]);
    }

    #[test]
    fn replace_all_resorts() {
        let mut set = PinnedMessageSet::new();
        set.upsert(pin("old", "m0", 99));
        set.replace_all(vec![pin("p1", "m1", 1), pin("p2", "m2", 2)]);
        assert_eq!(message_ids(&set), vec!["m2", "m1"]);
    }
}
