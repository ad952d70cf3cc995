//! Pure operations on an ordered message sequence.
//!
//! Every function takes the current bucket by reference and returns a fresh
//! sequence (or `None` when nothing would change), so stores can swap whole
//! buckets and readers never see a half-applied merge. Buckets are kept
//! sorted ascending by `created_at`; messages with equal timestamps keep their
//! arrival order.

use std::collections::HashSet;

use chatsync_types::models::{Message, MessageId};
use chrono::{DateTime, Utc};

pub fn sort_ascending(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

pub fn contains(messages: &[Message], id: &MessageId) -> bool {
    messages.iter().any(|m| &m.id == id)
}

pub fn earliest(messages: &[Message]) -> Option<DateTime<Utc>> {
    messages.first().map(|m| m.created_at)
}

pub fn latest(messages: &[Message]) -> Option<DateTime<Utc>> {
    messages.last().map(|m| m.created_at)
}

/// Insert one message at its time position. `None` if the id is already present.
pub fn insert(messages: &[Message], message: Message) -> Option<Vec<Message>> {
    if contains(messages, &message.id) {
        return None;
    }
    let at = messages.partition_point(|m| m.created_at <= message.created_at);
    let mut next = Vec::with_capacity(messages.len() + 1);
    next.extend_from_slice(&messages[..at]);
    next.push(message);
    next.extend_from_slice(&messages[at..]);
    Some(next)
}

/// Merge an older page in front of the bucket. Existing copies win on id
/// collisions, so mutations already applied to them survive.
pub fn prepend(messages: &[Message], older: Vec<Message>) -> Vec<Message> {
    let known: HashSet<&MessageId> = messages.iter().map(|m| &m.id).collect();
    let mut page_ids = HashSet::new();
    let mut next: Vec<Message> = older
        .into_iter()
        .filter(|m| !known.contains(&m.id) && page_ids.insert(m.id.clone()))
        .collect();
    next.extend_from_slice(messages);
    sort_ascending(&mut next);
    next
}

/// Merge messages behind the bucket, skipping ids already present.
pub fn append(messages: &[Message], newer: Vec<Message>) -> Vec<Message> {
    let mut next = messages.to_vec();
    let mut ids: HashSet<MessageId> = messages.iter().map(|m| m.id.clone()).collect();
    next.extend(newer.into_iter().filter(|m| ids.insert(m.id.clone())));
    sort_ascending(&mut next);
    next
}

/// Sort a fetched page and drop duplicate ids within it (first copy wins).
pub fn normalize(mut page: Vec<Message>) -> Vec<Message> {
    let mut ids = HashSet::new();
    page.retain(|m| ids.insert(m.id.clone()));
    sort_ascending(&mut page);
    page
}

pub fn remove_ids(messages: &[Message], ids: &HashSet<MessageId>) -> Option<Vec<Message>> {
    if !messages.iter().any(|m| ids.contains(&m.id)) {
        return None;
    }
    Some(
        messages
            .iter()
            .filter(|m| !ids.contains(&m.id))
            .cloned()
            .collect(),
    )
}

/// Apply `update` to a copy of every message; it returns whether it changed
/// anything. `None` when no message changed.
pub fn update_each<F>(messages: &[Message], mut update: F) -> Option<Vec<Message>>
where
    F: FnMut(&mut Message) -> bool,
{
    let mut next = messages.to_vec();
    let mut changed = false;
    for message in next.iter_mut() {
        changed |= update(message);
    }
    changed.then_some(next)
}

pub fn is_ascending(messages: &[Message]) -> bool {
    messages.windows(2).all(|w| w[0].created_at <= w[1].created_at)
}


#[cfg(test)]
mod tests {
    use super::fixtures::dm;
    use super::*;

    fn offsets(messages: &[Message]) -> Vec<i64> {
        messages
            .iter()
            .map(|m| m.created_at.timestamp() - i64::from(super::fixtures::BASE_SECS))
            .collect()
    }

    #[test]
    fn insert_keeps_time_order() {
        let bucket = vec![dm(1, "a", "b"), dm(5, "a", "b")];
        let next = insert(&bucket, dm(3, "b", "a")).unwrap();
        assert_eq!(offsets(&next), vec![1, 3, 5]);

        let tail = insert(&next, dm(9, "b", "a")).unwrap();
        assert_eq!(offsets(&tail), vec![1, 3, 5, 9]);
    }

    #[test]
    fn insert_duplicate_is_rejected() {
        let bucket = vec![dm(1, "a", "b"), dm(5, "a", "b")];
        assert!(insert(&bucket, dm(5, "a", "b")).is_none());
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut first = dm(4, "a", "b");
        first.id = MessageId::new("first");
        let mut second = dm(4, "a", "b");
        second.id = MessageId::new("second");

        let bucket = insert(&[first], second).unwrap();
        assert_eq!(bucket[0].id.as_str(), "first");
        assert_eq!(bucket[1].id.as_str(), "second");
    }

    #[test]
    fn prepend_dedups_and_keeps_existing_copy() {
        let mut live = dm(10, "a", "b");
        live.content = "edited live".into();
        let bucket = vec![live, dm(11, "a", "b")];

        let older = vec![dm(9, "a", "b"), dm(8, "a", "b"), dm(10, "a", "b")];
        let merged = prepend(&bucket, older);

        assert_eq!(offsets(&merged), vec![8, 9, 10, 11]);
        assert_eq!(merged[2].content, "edited live");
    }

    #[test]
    fn append_skips_known_ids() {
        let bucket = vec![dm(1, "a", "b"), dm(2, "a", "b")];
        let merged = append(&bucket, vec![dm(2, "a", "b"), dm(4, "a", "b"), dm(3, "a", "b")]);
        assert_eq!(offsets(&merged), vec![1, 2, 3, 4]);
        assert!(is_ascending(&merged));
    }

    #[test]
    fn remove_ids_reports_no_change() {
        let bucket = vec![dm(1, "a", "b"), dm(2, "a", "b")];
        let gone: HashSet<MessageId> = [MessageId::new("nope")].into_iter().collect();
        assert!(remove_ids(&bucket, &gone).is_none());

        let gone: HashSet<MessageId> = [bucket[0].id.clone()].into_iter().collect();
        assert_eq!(offsets(&remove_ids(&bucket, &gone).unwrap()), vec![2]);
    }

    #[test]
    fn normalize_sorts_and_dedups_page() {
        let page = vec![dm(3, "a", "b"), dm(1, "a", "b"), dm(3, "a", "b")];
        assert_eq!(offsets(&normalize(page)), vec![1, 3]);
    }
}
