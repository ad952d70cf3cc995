use chatsync_types::models::{Message, MessageId, MessageStatus};

use crate::timeline;

/// Projects a peer's "seen up to" acknowledgement onto the local user's
/// messages.
///
/// The predicate compares creation seconds decoded from the ids themselves,
/// so acknowledgements can be applied in any order and repeated freely:
/// once a message is seen it stays seen.
#[derive(Debug, Clone)]
pub struct SeenStatusProjector {
    local_user: String,
}

impl SeenStatusProjector {
    pub fn new(local_user: impl Into<String>) -> Self {
        Self {
            local_user: local_user.into(),
        }
    }

    /// Returns the updated bucket, or `None` when nothing changed or
    /// `last_seen` carries no decodable time.
    pub fn advance(&self, bucket: &[Message], last_seen: &MessageId) -> Option<Vec<Message>> {
        let cutoff = last_seen.embedded_secs()?;
        timeline::update_each(bucket, |message| {
            let covered = message.sender_id == self.local_user
                && message.status != MessageStatus::Seen
                && message.id.embedded_secs().is_some_and(|secs| secs <= cutoff);
            if covered {
                message.status = MessageStatus::Seen;
            }
            covered
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::fixtures::{dm, oid};

    fn statuses(bucket: &[Message]) -> Vec<MessageStatus> {
        bucket.iter().map(|m| m.status).collect()
    }

    #[test]
    fn marks_own_messages_up_to_cutoff() {
        let projector = SeenStatusProjector::new("me");
        let bucket = vec![dm(1, "me", "bob"), dm(2, "bob", "me"), dm(3, "me", "bob")];

        let next = projector.advance(&bucket, &oid(2, 99)).unwrap();
        assert_eq!(
            statuses(&next),
            vec![MessageStatus::Seen, MessageStatus::Sent, MessageStatus::Sent]
        );
    }

    #[test]
    fn out_of_order_acks_are_monotonic() {
        let projector = SeenStatusProjector::new("me");
        let bucket = vec![dm(1, "me", "bob"), dm(2, "me", "bob"), dm(3, "me", "bob")];

        let after_t3 = projector.advance(&bucket, &oid(3, 0)).unwrap();
        assert!(after_t3.iter().all(|m| m.status == MessageStatus::Seen));

        // A late ack for t1 changes nothing.
        assert!(projector.advance(&after_t3, &oid(1, 0)).is_none());
    }

    #[test]
    fn undecodable_ids_are_skipped() {
        let projector = SeenStatusProjector::new("me");
        let mut opaque = dm(1, "me", "bob");
        opaque.id = MessageId::new("local-echo");
        let bucket = vec![opaque, dm(2, "me", "bob")];

        assert!(projector.advance(&bucket, &MessageId::new("m5")).is_none());

        let next = projector.advance(&bucket, &oid(9, 0)).unwrap();
        assert_eq!(statuses(&next), vec![MessageStatus::Sent, MessageStatus::Seen]);
    }
}
