use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaDescriptor, Message, MessageId, PinnedMessage, ReplyRef};

/// Events pushed by the server over the chat socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ServerEvent {
    /// A new message in a direct or group conversation
    #[serde(rename = "chat")]
    Chat(Message),

    /// A reader acknowledged messages up to and including an id
    #[serde(rename = "update_seen")]
    SeenUpdate(SeenUpdate),

    /// Cross-device echo of a user hiding messages for themselves
    #[serde(rename = "delete_for_me")]
    DeleteForMe(DeleteForMe),

    /// A sender recalled one of their messages
    #[serde(rename = "recall-message")]
    Recall(RecallNotice),

    /// A message was pinned, or the full pin list was re-sent
    #[serde(rename = "pinned-message")]
    Pin(PinNotice),

    /// A message was unpinned
    #[serde(rename = "un-pinned-message")]
    Unpin(UnpinNotice),

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,
}

/// Discriminant used to route events to interested subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Chat,
    SeenUpdate,
    DeleteForMe,
    Recall,
    Pin,
    Unpin,
    Heartbeat,
}

impl EventKind {
    /// Every kind the sync engine mutates caches for.
    pub const SYNC: [EventKind; 6] = [
        EventKind::Chat,
        EventKind::SeenUpdate,
        EventKind::DeleteForMe,
        EventKind::Recall,
        EventKind::Pin,
        EventKind::Unpin,
    ];
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Chat(_) => EventKind::Chat,
            Self::SeenUpdate(_) => EventKind::SeenUpdate,
            Self::DeleteForMe(_) => EventKind::DeleteForMe,
            Self::Recall(_) => EventKind::Recall,
            Self::Pin(_) => EventKind::Pin,
            Self::Unpin(_) => EventKind::Unpin,
            Self::Ping | Self::Pong => EventKind::Heartbeat,
        }
    }
}

/// Commands sent FROM client TO server over the chat socket. Payloads mirror
/// the inbound shapes so local echoes and remote views converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ClientCommand {
    #[serde(rename = "chat")]
    Chat(OutgoingChat),

    #[serde(rename = "update_seen")]
    Seen(SeenUpdate),

    #[serde(rename = "delete_for_me")]
    DeleteForMe(DeleteForMe),

    #[serde(rename = "recall-message")]
    Recall(RecallNotice),

    #[serde(rename = "pinned-message")]
    Pin(PinNotice),

    #[serde(rename = "un-pinned-message")]
    Unpin(UnpinNotice),

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingChat {
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub media_ids: Vec<MediaDescriptor>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
}

/// `sender_id` is the reader; `receiver_id` the peer whose messages were read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenUpdate {
    pub last_seen_message_id: MessageId,
    pub sender_id: String,
    pub receiver_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteForMe {
    pub user_id: String,
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallNotice {
    pub id: MessageId,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub recalled_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recalled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinNotice {
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(alias = "message_res")]
    pub pinned: PinnedPayload,
}

/// Pin events carry either a single delta or the authoritative list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinnedPayload {
    List(Vec<PinnedMessage>),
    Single(PinnedMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpinNotice {
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}
