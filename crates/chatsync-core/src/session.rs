//! The chat session: owns the store for one signed-in user, decides which
//! cache is authoritative for the open conversation, and publishes the
//! resulting [`Timeline`] to the UI.

use std::collections::HashMap;
use std::sync::Arc;

use chatsync_types::events::{
    ClientCommand, DeleteForMe, OutgoingChat, PinNotice, PinnedPayload, RecallNotice, SeenUpdate,
    ServerEvent, UnpinNotice,
};
use chatsync_types::models::{
    ConversationKey, KIND_FILE, KIND_TEXT, MediaDescriptor, Message, MessageId, PinnedMessage,
    ReplyRef, Selection,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::bus::Subscription;
use crate::cache::Bucket;
use crate::collaborators::{Collaborators, HistoryApi, Notice};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::indicator::LoadingIndicator;
use crate::pagination::{InitialLoad, Located, PaginationController};
use crate::pins::PinnedMessageSet;
use crate::router::RealtimeEventRouter;
use crate::store::SyncStore;

/// Which cache the open conversation is rendered from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimelineSource {
    History,
    SearchContext,
    #[default]
    Empty,
}

/// Everything a renderer needs for the open conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub key: Option<ConversationKey>,
    pub source: TimelineSource,
    pub messages: Bucket,
    pub has_more: bool,
    pub has_newer: bool,
    pub loading_older: bool,
    pub highlight: Option<MessageId>,
    pub left_group: bool,
    pub pinned: PinnedMessageSet,
}

#[derive(Default)]
struct ViewState {
    selection: Option<Selection>,
    highlight: Option<MessageId>,
    left_group: bool,
    /// Last id we sent a seen acknowledgement for, per conversation.
    acked: HashMap<ConversationKey, MessageId>,
}

#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    local_user: String,
    store: Arc<SyncStore>,
    pager: PaginationController,
    router: RealtimeEventRouter,
    collaborators: Collaborators,
    indicator: LoadingIndicator,
    outbox: mpsc::UnboundedSender<ClientCommand>,
    view: Mutex<ViewState>,
    timeline: watch::Sender<Timeline>,
}

impl ChatSession {
    /// Start a session for `local_user`. The returned receiver yields the
    /// commands to write to the socket.
    pub fn new(
        local_user: impl Into<String>,
        config: SyncConfig,
        api: Arc<dyn HistoryApi>,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<ClientCommand>) {
        let local_user = local_user.into();
        let store = Arc::new(SyncStore::new(&config));
        let (outbox, outbound) = mpsc::unbounded_channel();
        let (timeline, _) = watch::channel(Timeline::default());
        let session = Self {
            inner: Arc::new(SessionInner {
                pager: PaginationController::new(api, store.clone(), config.page_limit),
                router: RealtimeEventRouter::new(store.clone(), local_user.clone(), collaborators.clone()),
                indicator: LoadingIndicator::new(config.min_loading_display),
                local_user,
                store,
                collaborators,
                outbox,
                view: Mutex::new(ViewState::default()),
                timeline,
            }),
        };
        (session, outbound)
    }

    pub fn local_user(&self) -> &str {
        &self.inner.local_user
    }

    pub fn store(&self) -> &Arc<SyncStore> {
        &self.inner.store
    }

    pub fn selection(&self) -> Option<Selection> {
        self.inner.view.lock().selection.clone()
    }

    pub fn active_key(&self) -> Option<ConversationKey> {
        self.inner.view.lock().selection.as_ref().map(Selection::key)
    }

    pub fn timeline(&self) -> Timeline {
        self.inner.timeline.borrow().clone()
    }

    pub fn watch_timeline(&self) -> watch::Receiver<Timeline> {
        self.inner.timeline.subscribe()
    }

    /// Initial-load indicator, already debounced to its minimum display time.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.inner.indicator.subscribe()
    }

    /// Open a conversation: show what is cached, otherwise fetch the newest
    /// page, and refresh its pinned list.
    pub async fn select(&self, selection: Selection) -> Result<InitialLoad, SyncError> {
        let key = selection.key();
        {
            let mut view = self.inner.view.lock();
            view.selection = Some(selection.clone());
            view.highlight = None;
            view.left_group = false;
        }
        info!("selected {}", key);

        let needs_fetch = !self.inner.store.search().has_window(&key)
            && !self
                .inner
                .store
                .history()
                .get(&key)
                .is_some_and(|bucket| !bucket.is_empty());
        let ticket = needs_fetch.then(|| self.inner.indicator.begin());
        self.refresh();

        let (loaded, pinned) = tokio::join!(
            self.inner.pager.load_initial(&selection),
            self.inner.pager.load_pinned(&selection),
        );
        if let Some(ticket) = ticket {
            self.inner.indicator.finish(ticket);
        }
        if let Err(e) = &pinned {
            self.report(e);
        }
        self.refresh();
        loaded.inspect_err(|e| self.report(e))
    }

    /// Page back through history of the open conversation.
    pub async fn load_older(&self) -> Result<Option<usize>, SyncError> {
        let Some(selection) = self.selection() else {
            return Ok(None);
        };
        let result = self.inner.pager.load_older(&selection).await;
        self.refresh();
        result.inspect_err(|e| self.report(e))
    }

    /// Page forward inside the open search window.
    pub async fn load_newer(&self) -> Result<Option<usize>, SyncError> {
        let Some(selection) = self.selection() else {
            return Ok(None);
        };
        let result = self.inner.pager.load_newer(&selection).await;
        self.refresh();
        result.inspect_err(|e| self.report(e))
    }

    /// Jump to a message of the open conversation and highlight it.
    pub async fn jump_to(&self, target: MessageId) -> Result<Located, SyncError> {
        let Some(selection) = self.selection() else {
            return Err(SyncError::NoSelection);
        };
        let located = self
            .inner
            .pager
            .load_by_id(&selection, &target)
            .await
            .inspect_err(|e| self.report(e))?;
        debug!("{}: located {} ({:?})", selection.key(), target, located);
        if self.active_key() == Some(selection.key()) {
            self.inner.view.lock().highlight = Some(target);
        }
        self.refresh();
        Ok(located)
    }

    pub fn clear_highlight(&self) {
        self.inner.view.lock().highlight = None;
        self.refresh();
    }

    /// Leave the search window and fall back to history, fetching it if
    /// nothing is cached.
    pub async fn clear_search_context(&self) -> Result<(), SyncError> {
        let Some(selection) = self.selection() else {
            return Ok(());
        };
        let key = selection.key();
        self.inner.store.search().remove(&key);
        self.inner.view.lock().highlight = None;

        let cached = self
            .inner
            .store
            .history()
            .get(&key)
            .is_some_and(|bucket| !bucket.is_empty());
        if cached {
            self.refresh();
            return Ok(());
        }

        let ticket = self.inner.indicator.begin();
        self.refresh();
        let result = self.inner.pager.load_initial(&selection).await;
        self.inner.indicator.finish(ticket);
        self.refresh();
        result.map(|_| ()).inspect_err(|e| self.report(e))
    }

    /// Apply one real-time event.
    pub fn dispatch(&self, event: &ServerEvent) {
        let outcome = self.inner.router.route(event);
        let active = self.active_key();
        let departed = outcome
            .left_group
            .as_ref()
            .is_some_and(|left| active.as_ref() == Some(left));
        if departed {
            info!("left group {:?}", active);
            self.inner.view.lock().left_group = true;
            self.refresh();
            return;
        }
        if active.is_some_and(|key| outcome.touches(&key)) {
            self.refresh();
        }
    }

    /// Dispatch loop: apply events until the subscription closes.
    pub async fn run(&self, mut subscription: Subscription) {
        debug!("dispatch loop {} started", subscription.id());
        while let Some(event) = subscription.recv().await {
            self.dispatch(&event);
        }
        debug!("dispatch loop {} ended", subscription.id());
    }

    /// Drop every cache and the selection.
    pub fn sign_out(&self) {
        self.inner.store.clear();
        self.inner.pager.reset();
        self.inner.indicator.cancel();
        *self.inner.view.lock() = ViewState::default();
        self.refresh();
        info!("{} signed out", self.inner.local_user);
    }

    pub fn send_chat(
        &self,
        content: impl Into<String>,
        media: Vec<MediaDescriptor>,
        reply: Option<ReplyRef>,
    ) -> Result<(), SyncError> {
        let selection = self.selection().ok_or(SyncError::NoSelection)?;
        let kind = if media.is_empty() { KIND_TEXT } else { KIND_FILE };
        self.send(ClientCommand::Chat(OutgoingChat {
            sender_id: self.inner.local_user.clone(),
            receiver_id: selection.peer_id.clone(),
            group_id: selection.effective_group().map(str::to_string),
            content: content.into(),
            media_ids: media,
            kind: kind.to_string(),
            reply,
        }))
    }

    /// Acknowledge the peer's messages up to `last_seen` in the open direct
    /// conversation.
    pub fn send_seen(&self, last_seen: MessageId) -> Result<(), SyncError> {
        let selection = self.selection().ok_or(SyncError::NoSelection)?;
        let peer = selection.peer_id.clone().ok_or(SyncError::NoSelection)?;
        self.inner
            .view
            .lock()
            .acked
            .insert(selection.key(), last_seen.clone());
        self.send(ClientCommand::Seen(SeenUpdate {
            last_seen_message_id: last_seen,
            sender_id: self.inner.local_user.clone(),
            receiver_id: peer,
        }))
    }

    /// Hide messages for the local user on every device. Applied locally
    /// right away; the server echo is then a no-op.
    pub fn send_delete_for_me(&self, message_ids: Vec<MessageId>) -> Result<(), SyncError> {
        let delete = DeleteForMe {
            user_id: self.inner.local_user.clone(),
            message_ids,
        };
        self.dispatch(&ServerEvent::DeleteForMe(delete.clone()));
        self.send(ClientCommand::DeleteForMe(delete))
    }

    pub fn send_recall(&self, message_id: MessageId) -> Result<(), SyncError> {
        let selection = self.selection().ok_or(SyncError::NoSelection)?;
        self.send(ClientCommand::Recall(RecallNotice {
            id: message_id,
            sender_id: self.inner.local_user.clone(),
            receiver_id: selection.peer_id.clone(),
            group_id: selection.effective_group().map(str::to_string),
            recalled_by: self.inner.local_user.clone(),
            recalled_at: None,
        }))
    }

    pub fn send_pin(&self, message: &Message) -> Result<(), SyncError> {
        let selection = self.selection().ok_or(SyncError::NoSelection)?;
        let pinned = PinnedMessage {
            message_id: message.id.clone(),
            content: message.content.clone(),
            sender_id: message.sender_id.clone(),
            pinned_by_id: self.inner.local_user.clone(),
            message_type: message.kind.clone(),
            created_at: Some(message.created_at),
            ..Default::default()
        };
        self.send(ClientCommand::Pin(PinNotice {
            sender_id: self.inner.local_user.clone(),
            receiver_id: selection.peer_id.clone(),
            group_id: selection.effective_group().map(str::to_string),
            pinned: PinnedPayload::Single(pinned),
        }))
    }

    pub fn send_unpin(&self, message_id: MessageId, pin_id: Option<String>) -> Result<(), SyncError> {
        let selection = self.selection().ok_or(SyncError::NoSelection)?;
        self.send(ClientCommand::Unpin(UnpinNotice {
            sender_id: self.inner.local_user.clone(),
            receiver_id: selection.peer_id.clone(),
            group_id: selection.effective_group().map(str::to_string),
            message_id,
            pin_id,
            conversation_id: None,
        }))
    }

    fn send(&self, command: ClientCommand) -> Result<(), SyncError> {
        self.inner.outbox.send(command).map_err(|_| {
            warn!("outbound queue closed, command dropped");
            SyncError::Disconnected
        })
    }

    fn report(&self, error: &SyncError) {
        let notice = match error {
            SyncError::NotFound(_) => {
                Notice::warning("That message was deleted or is no longer available.")
            }
            SyncError::Transient(e) => Notice::error(format!("Could not load messages: {e}")),
            SyncError::Disconnected => Notice::error("Not connected to the chat server."),
            SyncError::NoSelection => Notice::warning("Open a conversation first."),
        };
        self.inner.collaborators.notifier.notify(notice);
    }

    /// Rebuild the timeline from the store and publish it.
    fn refresh(&self) {
        let (timeline, peer) = {
            let view = self.inner.view.lock();
            let peer = view
                .selection
                .as_ref()
                .filter(|s| !s.is_group())
                .and_then(|s| s.peer_id.clone());
            (self.snapshot(&view), peer)
        };
        let last = timeline.messages.last().cloned();
        let key = timeline.key.clone();
        let source = timeline.source;
        self.inner.timeline.send_replace(timeline);

        // Acknowledge when the newest history message came from the peer. A
        // search window ends wherever the jump landed, not at the newest.
        if source != TimelineSource::History {
            return;
        }
        if let (Some(peer), Some(key), Some(last)) = (peer, key, last) {
            let already = self.inner.view.lock().acked.get(&key) == Some(&last.id);
            if last.sender_id == peer && !already {
                debug!("{}: acknowledging {}", key, last.id);
                if let Err(e) = self.send_seen(last.id) {
                    debug!("{}: seen not sent: {}", key, e);
                }
            }
        }
    }

    fn snapshot(&self, view: &ViewState) -> Timeline {
        let Some(selection) = &view.selection else {
            return Timeline::default();
        };
        let key = selection.key();
        let state = self.inner.pager.state(&key);
        let (source, messages) = match self.inner.store.search().get(&key) {
            Some(window) => (TimelineSource::SearchContext, window),
            None => match self.inner.store.history().get(&key) {
                Some(bucket) => (TimelineSource::History, bucket),
                None => (TimelineSource::Empty, Bucket::default()),
            },
        };
        Timeline {
            source,
            messages,
            has_more: state.has_more,
            has_newer: source == TimelineSource::SearchContext && state.has_newer,
            loading_older: state.loading_older,
            highlight: view.highlight.clone(),
            left_group: view.left_group,
            pinned: self.inner.store.pins(&key),
            key: Some(key),
        }
    }
}
