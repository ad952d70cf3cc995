use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, Selection};

// -- Responses --

/// Every history endpoint answers `{ "data": [...] }`; a missing or null
/// `data` means "nothing".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: Option<Vec<T>>,
}

impl<T> DataEnvelope<T> {
    pub fn into_items(self) -> Vec<T> {
        self.data.unwrap_or_default()
    }
}

// -- Queries --

/// `GET /message/get-message`: newest page, or the page before `beforeTime`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub limit: usize,
    #[serde(rename = "beforeTime", skip_serializing_if = "Option::is_none")]
    pub before_time: Option<String>,
}

impl HistoryQuery {
    pub fn new(selection: &Selection, limit: usize, before: Option<DateTime<Utc>>) -> Self {
        Self {
            receiver_id: selection.peer_id.clone(),
            group_id: selection.group_id.clone(),
            limit,
            before_time: before.map(cursor),
        }
    }
}

/// `GET /message/get-message-below`: the page after `afterTime`.
#[derive(Debug, Clone, Serialize)]
pub struct BelowQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub limit: usize,
    #[serde(rename = "afterTime")]
    pub after_time: String,
}

impl BelowQuery {
    pub fn new(selection: &Selection, limit: usize, after: DateTime<Utc>) -> Self {
        Self {
            receiver_id: selection.peer_id.clone(),
            group_id: selection.group_id.clone(),
            limit,
            after_time: cursor(after),
        }
    }
}

/// `GET /message/get-message-by-id`: a window of history around one message.
#[derive(Debug, Clone, Serialize)]
pub struct ByIdQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub message_id: MessageId,
}

impl ByIdQuery {
    pub fn new(selection: &Selection, message_id: &MessageId) -> Self {
        Self {
            receiver_id: selection.peer_id.clone(),
            group_id: selection.group_id.clone(),
            message_id: message_id.clone(),
        }
    }
}

/// `GET /message/pinned`.
#[derive(Debug, Clone, Serialize)]
pub struct PinnedQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl PinnedQuery {
    pub fn new(selection: &Selection) -> Self {
        Self {
            receiver_id: selection.peer_id.clone(),
            group_id: selection.group_id.clone(),
        }
    }
}

/// Pagination cursors travel as RFC 3339 timestamps with millisecond precision.
pub fn cursor(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn null_data_is_empty() {
        let env: DataEnvelope<Message> = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(env.into_items().is_empty());
        let env: DataEnvelope<Message> = serde_json::from_str("{}").unwrap();
        assert!(env.into_items().is_empty());
    }

    #[test]
    fn cursor_format() {
        let at = DateTime::parse_from_rfc3339("2024-01-12T20:00:03.250Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(cursor(at), "2024-01-12T20:00:03.250Z");
    }
}
