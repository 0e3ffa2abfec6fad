use model::events::MigrationEvent;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

/// A subscription handle that can be used to unsubscribe from events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    subscriber_id: u64,
}

/// Fan-out of [`MigrationEvent`]s to any number of subscribers.
///
/// Publishing never waits on a subscriber: a full channel drops the event for
/// that subscriber only, so a slow consumer cannot stall the workers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<u64, mpsc::Sender<Arc<MigrationEvent>>>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, sender: mpsc::Sender<Arc<MigrationEvent>>) -> Subscription {
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(subscriber_id, sender);

        debug!(subscriber_id = subscriber_id, "Subscribed to migration events");

        Subscription { subscriber_id }
    }

    pub async fn publish(&self, event: MigrationEvent) {
        let event = Arc::new(event);
        let mut closed = Vec::new();

        {
            let subscribers = self.subscribers.read().await;
            if subscribers.is_empty() {
                return;
            }

            for (subscriber_id, sender) in subscribers.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            event_type = event.event_type(),
                            subscriber_id = subscriber_id,
                            "Dropped event for slow subscriber (channel full)"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*subscriber_id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for subscriber_id in closed {
                subscribers.remove(&subscriber_id);
                debug!(subscriber_id = subscriber_id, "Removed closed subscriber");
            }
        }
    }

    pub async fn unsubscribe(&self, subscription: Subscription) {
        if self
            .subscribers
            .write()
            .await
            .remove(&subscription.subscriber_id)
            .is_some()
        {
            debug!(
                subscriber_id = subscription.subscriber_id,
                "Unsubscribed from migration events"
            );
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
