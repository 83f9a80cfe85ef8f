//! In-memory event source for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use tracing::debug;

use crate::query::EventQuery;
use crate::record::BlockEvents;
use crate::source::{BlockCallback, EventSource, EventSourceError, SubscriptionHandle, SubscriptionId};

#[derive(Debug)]
struct Subscriber {
    query: EventQuery,
    tx: mpsc::Sender<Arc<BlockEvents>>,
}

#[derive(Debug, Default)]
struct State {
    subscribers: HashMap<SubscriptionId, Subscriber>,
    unavailable: Option<String>,
}

/// In-memory block event source.
///
/// - No IO
/// - One delivery thread per subscription, so a blocked callback only stalls
///   its own subscription
/// - Unsubscribing drops the delivery queue; the thread exits once its
///   current callback returns
#[derive(Debug, Default)]
pub struct InMemoryEventSource {
    state: Mutex<State>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Deliver a block to every subscription whose query matches it.
    ///
    /// Returns the number of subscriptions the block was queued for.
    pub fn publish(&self, block: BlockEvents) -> Result<usize, EventSourceError> {
        let block = Arc::new(block);
        let mut state = self.state.lock().map_err(|_| EventSourceError::Poisoned)?;

        let mut delivered = 0;
        // Drop any subscribers whose delivery thread is gone.
        state.subscribers.retain(|_, sub| {
            if !sub.query.matches(&block) {
                return true;
            }
            let alive = sub.tx.send(Arc::clone(&block)).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });

        Ok(delivered)
    }

    /// Make subsequent `subscribe` calls fail (simulated outage), or restore.
    pub fn set_unavailable(&self, reason: Option<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = reason;
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().map(|s| s.subscribers.len()).unwrap_or(0)
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.state
            .lock()
            .map(|s| s.subscribers.contains_key(&id))
            .unwrap_or(false)
    }
}

impl EventSource for InMemoryEventSource {
    fn subscribe(
        &self,
        query: EventQuery,
        mut on_block: BlockCallback,
    ) -> Result<SubscriptionHandle, EventSourceError> {
        let mut state = self.state.lock().map_err(|_| EventSourceError::Poisoned)?;
        if let Some(reason) = &state.unavailable {
            return Err(EventSourceError::Unavailable(reason.clone()));
        }

        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel::<Arc<BlockEvents>>();

        thread::Builder::new()
            .name(format!("reqwatch-delivery-{id}"))
            .spawn(move || {
                while let Ok(block) = rx.recv() {
                    on_block(block.as_ref());
                }
                debug!(subscription_id = %id, "delivery thread stopped");
            })
            .map_err(|e| EventSourceError::Transport(e.to_string()))?;

        state.subscribers.insert(id, Subscriber { query: query.clone(), tx });
        Ok(SubscriptionHandle::new(id, query))
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), EventSourceError> {
        let mut state = self.state.lock().map_err(|_| EventSourceError::Poisoned)?;
        state
            .subscribers
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(EventSourceError::UnknownSubscription(handle.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::record::RawEvent;
    use crate::query::Condition;

    fn forwarding_callback(tx: mpsc::Sender<u64>) -> BlockCallback {
        Box::new(move |block: &BlockEvents| {
            let _ = tx.send(block.height);
        })
    }

    #[test]
    fn delivers_only_matching_blocks() {
        let source = InMemoryEventSource::new();
        let (tx, rx) = mpsc::channel();
        let query = EventQuery::new().and(Condition::equals("transfer", "to", "alice"));
        source.subscribe(query, forwarding_callback(tx)).unwrap();

        let hit = BlockEvents::new(1, vec![RawEvent::new("transfer").with_attribute("to", "alice")]);
        let miss = BlockEvents::new(2, vec![RawEvent::new("transfer").with_attribute("to", "bob")]);

        assert_eq!(source.publish(miss).unwrap(), 0);
        assert_eq!(source.publish(hit).unwrap(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let source = InMemoryEventSource::new();
        let (tx, rx) = mpsc::channel();
        let handle = source.subscribe(EventQuery::new(), forwarding_callback(tx)).unwrap();

        assert!(source.is_subscribed(handle.id()));
        source.unsubscribe(&handle).unwrap();
        assert_eq!(source.subscription_count(), 0);

        source.publish(BlockEvents::new(3, Vec::new())).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        assert_eq!(
            source.unsubscribe(&handle),
            Err(EventSourceError::UnknownSubscription(handle.id()))
        );
    }

    #[test]
    fn outage_rejects_subscriptions() {
        let source = InMemoryEventSource::new();
        source.set_unavailable(Some("node offline".to_string()));

        let (tx, _rx) = mpsc::channel();
        let err = source.subscribe(EventQuery::new(), forwarding_callback(tx)).unwrap_err();
        assert!(matches!(err, EventSourceError::Unavailable(_)));

        source.set_unavailable(None);
        let (tx, _rx) = mpsc::channel();
        assert!(source.subscribe(EventQuery::new(), forwarding_callback(tx)).is_ok());
    }
}
