//! Block events, subscription filters and the event-source contract.

pub mod in_memory_source;
pub mod matcher;
pub mod query;
pub mod record;
pub mod source;

pub use in_memory_source::InMemoryEventSource;
pub use matcher::{EventMatcher, match_requests};
pub use query::{Condition, EventQuery};
pub use record::{
    BlockEvents, EventAttribute, NEW_BATCH_REQUEST, NEW_BATCH_REQUEST_PROVIDER, ProviderRequestRecord,
    RawEvent, RequestIds,
};
pub use source::{BlockCallback, EventSource, EventSourceError, SubscriptionHandle, SubscriptionId};
