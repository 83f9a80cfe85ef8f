//! Event-source contract (mechanics only).
//!
//! An event source delivers the events of every new block to the callbacks of
//! its open subscriptions. The tracker depends only on this trait; the wire
//! protocol (websocket RPC, gRPC stream, in-memory fan-out) is owned by the
//! implementation.
//!
//! ## Delivery
//!
//! - The callback is invoked once per block whose events satisfy the
//!   subscription's [`EventQuery`], on a thread owned by the source.
//! - Blocks are delivered in the order the source observed them.
//! - A callback may block (backpressure). Implementations must make sure a slow
//!   callback only delays its own subscription.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::query::EventQuery;
use crate::record::BlockEvents;

/// Identifier of one open subscription.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Opaque token for an open subscription.
///
/// Only used to unsubscribe. Cheap to clone; clones refer to the same
/// subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    query: EventQuery,
}

impl SubscriptionHandle {
    pub fn new(id: SubscriptionId, query: EventQuery) -> Self {
        Self { id, query }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The filter this subscription was opened with.
    pub fn query(&self) -> &EventQuery {
        &self.query
    }
}

/// Per-block callback.
pub type BlockCallback = Box<dyn FnMut(&BlockEvents) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventSourceError {
    #[error("event source unavailable: {0}")]
    Unavailable(String),
    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("event source state poisoned")]
    Poisoned,
}

/// Source of block events.
///
/// The trait requires `Send + Sync`: the tracker subscribes from the caller's
/// thread and unsubscribes from worker threads.
pub trait EventSource: Send + Sync {
    /// Open a subscription delivering blocks that match `query` to `on_block`.
    fn subscribe(&self, query: EventQuery, on_block: BlockCallback)
    -> Result<SubscriptionHandle, EventSourceError>;

    /// Close a subscription. Best-effort: callers log failures.
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), EventSourceError>;
}

impl<S> EventSource for Arc<S>
where
    S: EventSource + ?Sized,
{
    fn subscribe(
        &self,
        query: EventQuery,
        on_block: BlockCallback,
    ) -> Result<SubscriptionHandle, EventSourceError> {
        (**self).subscribe(query, on_block)
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), EventSourceError> {
        (**self).unsubscribe(handle)
    }
}
