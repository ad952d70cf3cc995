//! Network collaborators for `chatsync-core`: the REST history client and
//! the chat socket loop.

pub mod config;
pub mod http;
pub mod socket;

pub use config::ClientConfig;
pub use http::RestHistoryApi;
pub use socket::run_socket;
