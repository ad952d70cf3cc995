//! Narrow interfaces to everything outside the sync engine: the REST history
//! service, user-facing notices, the notification sound and the conversation
//! list. Defaults only log, so a session works headless.

use std::sync::Arc;

use async_trait::async_trait;
use chatsync_types::models::{ConversationKey, Message, MessageId, PinnedMessage, Selection};
use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::error::FetchError;

/// REST-style history endpoints. Results come back in server order; callers
/// sort them.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Newest `limit` messages, or the `limit` messages created before `before`.
    async fn fetch_history(
        &self,
        selection: &Selection,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, FetchError>;

    /// Up to `limit` messages created after `after`.
    async fn fetch_newer(
        &self,
        selection: &Selection,
        limit: usize,
        after: DateTime<Utc>,
    ) -> Result<Vec<Message>, FetchError>;

    /// A window of history containing `target`. Empty when the target was
    /// deleted or is not visible to the caller.
    async fn fetch_by_id(
        &self,
        selection: &Selection,
        target: &MessageId,
    ) -> Result<Vec<Message>, FetchError>;

    async fn fetch_pinned(&self, selection: &Selection) -> Result<Vec<PinnedMessage>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// Non-blocking, toast-style notice for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Incoming-message sound. The mute flag lives with the implementor.
pub trait SoundCue: Send + Sync {
    fn is_muted(&self) -> bool;
    fn play(&self);
}

/// Sidebar conversation list; only its unread counters are touched here.
pub trait ConversationList: Send + Sync {
    fn reset_unread(&self, key: &ConversationKey);
}

/// Fallback collaborator: notices go to the log, everything else is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnly;

impl Notifier for LogOnly {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Warning => warn!("{}", notice.text),
            NoticeLevel::Error => error!("{}", notice.text),
        }
    }
}

impl SoundCue for LogOnly {
    fn is_muted(&self) -> bool {
        true
    }

    fn play(&self) {}
}

impl ConversationList for LogOnly {
    fn reset_unread(&self, key: &ConversationKey) {
        debug!("unread reset for {}", key);
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub sound: Arc<dyn SoundCue>,
    pub conversations: Arc<dyn ConversationList>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            notifier: Arc::new(LogOnly),
            sound: Arc::new(LogOnly),
            conversations: Arc::new(LogOnly),
        }
    }
}
