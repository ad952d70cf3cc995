/// Shared chatsync types.
///
/// `models` holds the domain records cached by the sync engine, `events` the
/// real-time socket envelopes in both directions, and `api` the REST shapes
/// used for history fetches.
pub mod api;
pub mod events;
pub mod models;
