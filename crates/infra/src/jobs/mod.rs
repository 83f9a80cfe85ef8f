//! Job storage as seen by the tracker.
//!
//! The tracker only enumerates jobs at start-up (by initiator kind); job
//! creation and deletion are owned by the caller, who forwards them to
//! `SubscriptionTracker::add_job` / `remove_job`.

pub mod store;

pub use store::{InMemoryJobStore, JobStore, JobStoreError};
