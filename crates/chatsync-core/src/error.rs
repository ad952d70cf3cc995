use chatsync_types::models::MessageId;
use thiserror::Error;

/// Failure reported by a [`HistoryApi`](crate::collaborators::HistoryApi) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered 404 for the requested resource.
    #[error("resource not found")]
    NotFound,

    #[error("server returned status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Errors surfaced by sync operations. None of them are fatal: callers keep
/// showing whatever is already cached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// An id lookup found nothing; the message was deleted or is inaccessible.
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// Network or server failure during a fetch. Not retried.
    #[error("fetch failed: {0}")]
    Transient(#[from] FetchError),

    /// The outbound command queue has no consumer (socket loop gone).
    #[error("not connected")]
    Disconnected,

    /// A command needs an open conversation and none is selected.
    #[error("no conversation selected")]
    NoSelection,
}
