//! History paging for each conversation: first page, older pages, newer
//! pages inside a search window, and id lookups.

use std::collections::HashMap;
use std::sync::Arc;

use chatsync_types::models::{ConversationKey, MessageId, PinnedMessage, Selection};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::collaborators::HistoryApi;
use crate::error::{FetchError, SyncError};
use crate::store::SyncStore;
use crate::timeline;

/// Paging flags for one conversation key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageState {
    /// The last older page was full, so more history may exist.
    pub has_more: bool,
    /// The last newer page of the search window was full.
    pub has_newer: bool,
    pub loading_older: bool,
    pub loading_newer: bool,
    /// Id lookups still waiting on the server. Lookups are not exclusive, so
    /// this counts them.
    pub lookups_in_flight: usize,
}

impl PageState {
    pub fn lookup_pending(&self) -> bool {
        self.lookups_in_flight > 0
    }
}

/// Where `load_initial` found its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialLoad {
    SearchContext,
    Cached,
    Fetched { count: usize },
}

/// Where `load_by_id` found the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    InSearchContext,
    InHistory,
    Fetched { count: usize },
}

#[derive(Clone, Copy)]
enum Flag {
    Older,
    Newer,
    Lookup,
}

impl Flag {
    /// Take the flag. Older and newer pages are exclusive per key; lookups
    /// stack.
    fn acquire(self, state: &mut PageState) -> bool {
        let slot = match self {
            Flag::Older => &mut state.loading_older,
            Flag::Newer => &mut state.loading_newer,
            Flag::Lookup => {
                state.lookups_in_flight += 1;
                return true;
            }
        };
        if *slot {
            return false;
        }
        *slot = true;
        true
    }

    fn release(self, state: &mut PageState) {
        match self {
            Flag::Older => state.loading_older = false,
            Flag::Newer => state.loading_newer = false,
            Flag::Lookup => state.lookups_in_flight = state.lookups_in_flight.saturating_sub(1),
        }
    }
}

type Pages = Arc<Mutex<HashMap<ConversationKey, PageState>>>;

/// Clears an in-flight flag when the fetch finishes or its future is dropped.
struct InFlight {
    pages: Pages,
    key: ConversationKey,
    flag: Flag,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(state) = self.pages.lock().get_mut(&self.key) {
            self.flag.release(state);
        }
    }
}

pub struct PaginationController {
    api: Arc<dyn HistoryApi>,
    store: Arc<SyncStore>,
    limit: usize,
    pages: Pages,
}

impl PaginationController {
    pub fn new(api: Arc<dyn HistoryApi>, store: Arc<SyncStore>, limit: usize) -> Self {
        Self {
            api,
            store,
            limit: limit.max(1),
            pages: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn state(&self, key: &ConversationKey) -> PageState {
        self.pages.lock().get(key).copied().unwrap_or_default()
    }

    pub fn reset(&self) {
        self.pages.lock().clear();
    }

    /// Claim `flag` for `key`. `None` if it is already held or `allowed`
    /// rejects the current state.
    fn claim(
        &self,
        key: &ConversationKey,
        flag: Flag,
        allowed: impl FnOnce(&PageState) -> bool,
    ) -> Option<InFlight> {
        let mut pages = self.pages.lock();
        let state = pages.entry(key.clone()).or_default();
        if !allowed(state) || !flag.acquire(state) {
            return None;
        }
        Some(InFlight {
            pages: self.pages.clone(),
            key: key.clone(),
            flag,
        })
    }

    fn with_state(&self, key: &ConversationKey, update: impl FnOnce(&mut PageState)) {
        update(self.pages.lock().entry(key.clone()).or_default());
    }

    /// Show the search window or cached bucket for the selection, or fetch the
    /// newest page and flush parked real-time messages into it.
    pub async fn load_initial(&self, selection: &Selection) -> Result<InitialLoad, SyncError> {
        let key = selection.key();
        let lookup_pending = self.state(&key).lookup_pending();
        if self.store.search().has_window(&key) && !lookup_pending {
            debug!("{}: showing search context", key);
            return Ok(InitialLoad::SearchContext);
        }
        if self
            .store
            .history()
            .get(&key)
            .is_some_and(|bucket| !bucket.is_empty())
        {
            debug!("{}: history cache hit", key);
            return Ok(InitialLoad::Cached);
        }

        debug!("{}: fetching newest {} messages", key, self.limit);
        let page = self
            .api
            .fetch_history(selection, self.limit, None)
            .await
            .inspect_err(|e| warn!("{}: initial fetch failed: {}", key, e))?;
        let count = page.len();
        let bucket = self.store.install_initial(&key, page);
        self.with_state(&key, |state| state.has_more = count >= self.limit);
        info!("{}: loaded {} messages ({} cached)", key, count, bucket.len());
        Ok(InitialLoad::Fetched { count })
    }

    /// Fetch the page before the earliest cached message. `Ok(None)` when
    /// skipped: a search window is on display, a fetch is already running,
    /// history is exhausted, or nothing is cached to page back from.
    pub async fn load_older(&self, selection: &Selection) -> Result<Option<usize>, SyncError> {
        let key = selection.key();
        if self.store.search().has_window(&key) {
            debug!("{}: search window shown, older page skipped", key);
            return Ok(None);
        }
        let Some(cursor) = self
            .store
            .history()
            .get(&key)
            .and_then(|bucket| timeline::earliest(&bucket))
        else {
            return Ok(None);
        };
        let Some(_guard) = self.claim(&key, Flag::Older, |state| state.has_more) else {
            debug!("{}: older page skipped", key);
            return Ok(None);
        };

        debug!("{}: fetching before {}", key, cursor);
        let page = self
            .api
            .fetch_history(selection, self.limit, Some(cursor))
            .await
            .inspect_err(|e| warn!("{}: older fetch failed: {}", key, e))?;
        let count = page.len();
        // Merge against the bucket as it is now, not as it was at the cursor read.
        self.store.history().prepend(&key, page);
        self.with_state(&key, |state| state.has_more = count >= self.limit);
        debug!("{}: {} older messages", key, count);
        Ok(Some(count))
    }

    /// Fetch the page after the newest message of the search window.
    /// `Ok(None)` when there is no window or a fetch is already running.
    pub async fn load_newer(&self, selection: &Selection) -> Result<Option<usize>, SyncError> {
        let key = selection.key();
        let Some(cursor) = self
            .store
            .search()
            .get(&key)
            .and_then(|window| timeline::latest(&window))
        else {
            return Ok(None);
        };
        let Some(_guard) = self.claim(&key, Flag::Newer, |state| state.has_newer) else {
            debug!("{}: newer page skipped", key);
            return Ok(None);
        };

        let page = self
            .api
            .fetch_newer(selection, self.limit, cursor)
            .await
            .inspect_err(|e| warn!("{}: newer fetch failed: {}", key, e))?;
        let count = page.len();
        if self.store.search().append(&key, page).is_none() {
            debug!("{}: search window cleared during newer fetch", key);
        }
        self.with_state(&key, |state| state.has_newer = count >= self.limit);
        Ok(Some(count))
    }

    /// Locate `target`: in the search window, then in history, then by
    /// fetching a window around it into the search context. A miss leaves
    /// every cache untouched.
    pub async fn load_by_id(
        &self,
        selection: &Selection,
        target: &MessageId,
    ) -> Result<Located, SyncError> {
        let key = selection.key();
        if self.store.search().contains_message(&key, target) {
            return Ok(Located::InSearchContext);
        }
        if self.store.history().contains_message(&key, target) {
            if self.store.search().remove(&key) {
                debug!("{}: dropped search window, {} is in history", key, target);
            }
            return Ok(Located::InHistory);
        }

        let _lookup = self.claim(&key, Flag::Lookup, |_| true);
        debug!("{}: looking up {}", key, target);
        let page = match self.api.fetch_by_id(selection, target).await {
            Ok(page) => page,
            Err(FetchError::NotFound) => Vec::new(),
            Err(e) => {
                warn!("{}: lookup of {} failed: {}", key, target, e);
                return Err(e.into());
            }
        };
        if page.is_empty() {
            info!("{}: {} not found", key, target);
            return Err(SyncError::NotFound(target.clone()));
        }
        let count = page.len();
        self.store.search().put(&key, page);
        // A window is centred on the target, so assume newer messages exist.
        self.with_state(&key, |state| state.has_newer = true);
        Ok(Located::Fetched { count })
    }

    pub async fn load_pinned(&self, selection: &Selection) -> Result<Vec<PinnedMessage>, SyncError> {
        let key = selection.key();
        let pins = self
            .api
            .fetch_pinned(selection)
            .await
            .inspect_err(|e| warn!("{}: pinned fetch failed: {}", key, e))?;
        debug!("{}: {} pinned messages", key, pins.len());
        Ok(self.store.update_pins(&key, |set| {
            set.replace_all(pins);
            set.entries().to_vec()
        }))
    }
}
