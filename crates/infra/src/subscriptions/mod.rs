//! Service-request subscriptions.
//!
//! ## Components
//!
//! - `ShutdownSignal`: one-shot broadcast cancellation (global and per worker)
//! - `SubscriptionRegistry`: job id -> open subscriptions, with a live gauge
//! - `SubscriptionWorker`: one thread per (job, interest)
//! - `SubscriptionTracker`: start/stop and job add/remove

pub mod registry;
pub mod shutdown;
pub mod tracker;
pub mod worker;

pub use registry::{RegisteredSubscription, RegistryError, SubscriptionRegistry};
pub use shutdown::{CancelToken, ShutdownSignal};
pub use tracker::{SubscriptionTracker, TrackerDeps};
pub use worker::{SubscriptionWorker, WorkerHandle, WorkerState, WorkerStats};
