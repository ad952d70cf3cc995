use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group id the server uses for "no group" on direct messages.
pub const NULL_GROUP_ID: &str = "000000000000000000000000";

/// Message `type` values with special meaning to the client.
pub const KIND_TEXT: &str = "text";
pub const KIND_FILE: &str = "file";
pub const KIND_SYSTEM: &str = "system";

/// Opaque, sortable message identifier.
///
/// Ids are 12-byte object ids rendered as 24 hex characters. The first four
/// bytes are the big-endian creation time in seconds since the Unix epoch, so
/// the creation second can be recovered from the id alone with
/// [`MessageId::embedded_secs`]. Ids that do not follow this layout are still
/// valid identifiers; they just decode to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time in whole seconds, decoded from the leading 8 hex digits.
    pub fn embedded_secs(&self) -> Option<u32> {
        let prefix = self.0.get(..8)?;
        let bytes: [u8; 4] = hex::decode(prefix).ok()?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Creation time decoded from the id, see [`MessageId::embedded_secs`].
    pub fn embedded_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::from(self.embedded_secs()?), 0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Delivery state of a message, in the order it can advance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Received,
    Seen,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Set when the sender recalled ("unsent") a message. The message stays in
/// the timeline; renderers show it as recalled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallInfo {
    pub recalled_at: DateTime<Utc>,
    pub recalled_by: String,
}

/// Quote of the message being replied to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub id: MessageId,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "media_ids")]
    pub media: Vec<MediaDescriptor>,
    #[serde(default)]
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<RecallInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Message {
    pub fn is_system(&self) -> bool {
        self.kind == KIND_SYSTEM
    }

    pub fn is_recalled(&self) -> bool {
        self.recall.is_some()
    }

    /// Conversation this message belongs to, as seen by `local_user`.
    pub fn conversation_key(&self, local_user: &str) -> ConversationKey {
        ConversationKey::for_participants(
            local_user,
            &self.sender_id,
            self.receiver_id.as_deref(),
            self.group_id.as_deref(),
        )
    }
}

/// A pinned message as listed in a conversation's pin bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinnedMessage {
    #[serde(default)]
    pub pin_id: String,
    pub message_id: MessageId,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub pinned_by_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_by_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// What the user has open: a direct conversation with a peer, or a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Selection {
    pub fn direct(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: Some(peer_id.into()),
            group_id: None,
        }
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            peer_id: None,
            group_id: Some(group_id.into()),
        }
    }

    /// The group id, unless absent or the null sentinel.
    pub fn effective_group(&self) -> Option<&str> {
        real_group(self.group_id.as_deref())
    }

    pub fn is_group(&self) -> bool {
        self.effective_group().is_some()
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey::from_selection(self)
    }
}

/// Cache partition key: `group_<id>` or `user_<peer id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn group(group_id: &str) -> Self {
        Self(format!("group_{group_id}"))
    }

    pub fn direct(peer_id: &str) -> Self {
        Self(format!("user_{peer_id}"))
    }

    pub fn from_selection(selection: &Selection) -> Self {
        match selection.effective_group() {
            Some(group_id) => Self::group(group_id),
            None => Self::direct(selection.peer_id.as_deref().unwrap_or_default()),
        }
    }

    /// Key for an event exchanged between `sender` and `receiver` (or posted
    /// to `group`), from the point of view of `local_user`: for direct
    /// messages the peer is whichever side is not the local user.
    pub fn for_participants(
        local_user: &str,
        sender: &str,
        receiver: Option<&str>,
        group: Option<&str>,
    ) -> Self {
        if let Some(group_id) = real_group(group) {
            return Self::group(group_id);
        }
        let peer = if sender == local_user {
            receiver.unwrap_or_default()
        } else {
            sender
        };
        Self::direct(peer)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_group(&self) -> bool {
        self.0.starts_with("group_")
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn real_group(group: Option<&str>) -> Option<&str> {
    group.filter(|g| !g.is_empty() && *g != NULL_GROUP_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_creation_second_from_id() {
        let id = MessageId::new("65a1b2c3000000000000000a");
        assert_eq!(id.embedded_secs(), Some(0x65a1_b2c3));
        assert_eq!(
            id.embedded_time().map(|t| t.timestamp()),
            Some(0x65a1_b2c3)
        );
    }

    #[test]
    fn opaque_ids_do_not_decode() {
        assert_eq!(MessageId::new("m5").embedded_secs(), None);
        assert_eq!(MessageId::new("zzzzzzzz0000").embedded_secs(), None);
        assert_eq!(MessageId::new("").embedded_secs(), None);
    }

    #[test]
    fn selection_keys() {
        assert_eq!(Selection::direct("u2").key().as_str(), "user_u2");
        assert_eq!(Selection::group("g1").key().as_str(), "group_g1");

        let null_group = Selection {
            peer_id: Some("u3".into()),
            group_id: Some(NULL_GROUP_ID.into()),
        };
        assert_eq!(null_group.key().as_str(), "user_u3");
        assert!(!null_group.is_group());

        let empty_group = Selection {
            peer_id: Some("u4".into()),
            group_id: Some(String::new()),
        };
        assert_eq!(empty_group.key().as_str(), "user_u4");
    }

    #[test]
    fn participant_key_picks_the_other_side() {
        let mine = ConversationKey::for_participants("me", "me", Some("bob"), None);
        assert_eq!(mine.as_str(), "user_bob");

        let theirs = ConversationKey::for_participants("me", "bob", Some("me"), None);
        assert_eq!(theirs.as_str(), "user_bob");

        let group =
            ConversationKey::for_participants("me", "bob", None, Some("g9"));
        assert_eq!(group.as_str(), "group_g9");
    }

    #[test]
    fn message_wire_shape() {
        let json = r#"{
            "id": "65a1b2c3000000000000000a",
            "sender_id": "bob",
            "receiver_id": "me",
            "group_id": "000000000000000000000000",
            "content": "<p>hi</p>",
            "media_ids": [{"id": "f1", "url": "https://cdn/f1", "type": "image"}],
            "status": "delivered",
            "created_at": "2024-01-12T20:00:03Z",
            "type": "file"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.status, MessageStatus::Delivered);
        assert_eq!(msg.media.len(), 1);
        assert_eq!(msg.media[0].media_type, "image");
        assert_eq!(msg.kind, KIND_FILE);
        assert!(msg.recall.is_none());
        assert_eq!(msg.conversation_key("me").as_str(), "user_bob");
    }
}
