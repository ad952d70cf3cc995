use std::time::Duration;

/// Messages requested per history page.
pub const DEFAULT_PAGE_LIMIT: usize = 30;

/// Shortest time the initial-load indicator stays up once shown.
pub const DEFAULT_MIN_LOADING_DISPLAY: Duration = Duration::from_millis(1000);

/// Real-time messages parked per conversation before the oldest is dropped.
pub const DEFAULT_PENDING_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub page_limit: usize,
    pub min_loading_display: Duration,
    pub pending_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            min_loading_display: DEFAULT_MIN_LOADING_DISPLAY,
            pending_limit: DEFAULT_PENDING_LIMIT,
        }
    }
}
