use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Initial-load spinner with a minimum on-screen time.
///
/// Data is published as soon as it arrives; only the hide is deferred, by a
/// scheduled task that a new `begin` cancels. Only the latest `begin` may
/// hide the spinner, so a slow earlier load cannot clear a newer one.
#[derive(Clone)]
pub struct LoadingIndicator {
    min_display: Duration,
    tx: watch::Sender<bool>,
    state: Arc<Mutex<Schedule>>,
}

/// Handed out by [`LoadingIndicator::begin`], redeemed by `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingTicket(u64);

#[derive(Default)]
struct Schedule {
    generation: u64,
    shown_at: Option<Instant>,
    pending_hide: Option<JoinHandle<()>>,
}

impl LoadingIndicator {
    pub fn new(min_display: Duration) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            min_display,
            tx,
            state: Arc::new(Mutex::new(Schedule::default())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Show the spinner. The minimum display time counts from this call.
    pub fn begin(&self) -> LoadingTicket {
        let mut state = self.state.lock();
        if let Some(hide) = state.pending_hide.take() {
            hide.abort();
        }
        state.generation += 1;
        state.shown_at = Some(Instant::now());
        self.tx.send_replace(true);
        LoadingTicket(state.generation)
    }

    /// Hide once the minimum display time has passed since `begin`. Stale
    /// tickets are ignored.
    pub fn finish(&self, ticket: LoadingTicket) {
        let mut state = self.state.lock();
        if ticket.0 != state.generation {
            return;
        }
        let Some(shown_at) = state.shown_at else {
            return;
        };
        let remaining = self.min_display.saturating_sub(shown_at.elapsed());
        if remaining.is_zero() {
            state.shown_at = None;
            self.tx.send_replace(false);
            return;
        }
        if let Some(hide) = state.pending_hide.take() {
            hide.abort();
        }
        let tx = self.tx.clone();
        let schedule = self.state.clone();
        let generation = state.generation;
        state.pending_hide = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let mut state = schedule.lock();
            if state.generation != generation {
                return;
            }
            state.shown_at = None;
            state.pending_hide = None;
            tx.send_replace(false);
        }));
    }

    /// Hide immediately, dropping any scheduled hide and outstanding tickets.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(hide) = state.pending_hide.take() {
            hide.abort();
        }
        state.generation += 1;
        state.shown_at = None;
        self.tx.send_replace(false);
    }
}
