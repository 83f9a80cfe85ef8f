//! Tracker error model.

use reqwatch_core::{Interest, JobId};
use reqwatch_events::EventSourceError;

use crate::jobs::JobStoreError;

/// Errors reported by [`SubscriptionTracker`](crate::SubscriptionTracker).
///
/// None of these stop the tracker; callers decide whether a failed job is
/// fatal for them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("subscription tracker already started")]
    AlreadyStarted,

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("failed to subscribe job {job_id} to {interest}: {source}")]
    Subscribe {
        job_id: JobId,
        interest: Interest,
        #[source]
        source: EventSourceError,
    },

    #[error("failed to spawn worker for job {job_id}: {reason}")]
    Spawn { job_id: JobId, reason: String },

    #[error("job store error: {0}")]
    JobStore(#[from] JobStoreError),

    /// `start` could not bring up every stored job; the others are running.
    #[error("{} job(s) failed to start", failures.len())]
    Startup { failures: Vec<TrackerError> },
}

impl TrackerError {
    /// Job the error is about, when there is exactly one.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            TrackerError::NotFound(id)
            | TrackerError::Subscribe { job_id: id, .. }
            | TrackerError::Spawn { job_id: id, .. } => Some(*id),
            _ => None,
        }
    }
}
