//! Infrastructure layer: collaborator contracts, in-memory adapters and the
//! subscription tracker that ties them together.

pub mod config;
pub mod error;
pub mod jobs;
pub mod resolver;
pub mod runs;
pub mod subscriptions;


pub use config::{ConfigError, TrackerConfig};
pub use error::TrackerError;
pub use jobs::{InMemoryJobStore, JobStore, JobStoreError};
pub use resolver::{
    InMemoryRequestLookup, LookupError, RequestDetail, RequestDetailLookup, RequestResolver, ResolvedRequest,
};
pub use runs::{
    InMemoryRequestMemory, InMemoryRunTrigger, RequestMemory, RunRequest, RunTrigger, RunTriggerError, TriggeredRun,
};
pub use subscriptions::{
    CancelToken, RegisteredSubscription, RegistryError, ShutdownSignal, SubscriptionRegistry, SubscriptionTracker,
    SubscriptionWorker, TrackerDeps, WorkerHandle, WorkerState, WorkerStats,
};
