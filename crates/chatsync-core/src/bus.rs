use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chatsync_types::events::{EventKind, ServerEvent};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

/// Fans inbound socket events out to typed subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Default)]
struct EventBusInner {
    /// subscription id -> (kinds, sender). An empty kind set means everything.
    subscribers: RwLock<HashMap<Uuid, (HashSet<EventKind>, mpsc::UnboundedSender<ServerEvent>)>>,
}

/// Receiving end of a bus registration.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once unsubscribed or the bus is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for `kinds` (all kinds when empty).
    pub async fn subscribe(&self, kinds: impl IntoIterator<Item = EventKind>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let kinds: HashSet<EventKind> = kinds.into_iter().collect();
        self.inner.subscribers.write().await.insert(id, (kinds, tx));
        Subscription { id, rx }
    }

    pub async fn subscribe_all(&self) -> Subscription {
        self.subscribe(Vec::<EventKind>::new()).await
    }

    /// Returns whether the id was registered.
    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        self.inner.subscribers.write().await.remove(&id).is_some()
    }

    /// Deliver to every matching subscriber. Returns the number of deliveries;
    /// subscribers whose receiver is gone are dropped.
    pub async fn publish(&self, event: ServerEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let subscribers = self.inner.subscribers.read().await;
            for (id, (kinds, tx)) in subscribers.iter() {
                if !kinds.is_empty() && !kinds.contains(&kind) {
                    continue;
                }
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut subscribers = self.inner.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
                debug!("pruned closed subscriber {}", id);
            }
        }
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }
}
