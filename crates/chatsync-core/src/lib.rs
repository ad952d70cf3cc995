//! Client-side message synchronization: per-conversation history caches,
//! search windows, real-time event routing, and the session that ties them
//! to a single open conversation.

pub mod bus;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod indicator;
pub mod pagination;
pub mod pending;
pub mod pins;
pub mod router;
pub mod seen;
pub mod session;
pub mod store;
pub mod timeline;

pub use bus::{EventBus, Subscription};
pub use collaborators::{Collaborators, HistoryApi, Notice, NoticeLevel, Notifier};
pub use config::SyncConfig;
pub use error::{FetchError, SyncError};
pub use session::{ChatSession, Timeline, TimelineSource};
