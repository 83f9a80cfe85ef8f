//! Run trigger and request-memory side-store contracts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reqwatch_core::{Interest, JobId, RunId};

use crate::resolver::ResolvedRequest;

/// Payload handed to the run trigger. Runs started by service requests carry
/// an empty request; the request detail travels through [`RequestMemory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunTriggerError {
    #[error("job not runnable: {0}")]
    Rejected(String),
    #[error("run manager unavailable: {0}")]
    Unavailable(String),
}

/// Starts job executions ("run manager").
pub trait RunTrigger: Send + Sync {
    fn create(
        &self,
        job_id: JobId,
        interest: &Interest,
        parent: Option<RunId>,
        request: RunRequest,
    ) -> Result<RunId, RunTriggerError>;
}

impl<T> RunTrigger for Arc<T>
where
    T: RunTrigger + ?Sized,
{
    fn create(
        &self,
        job_id: JobId,
        interest: &Interest,
        parent: Option<RunId>,
        request: RunRequest,
    ) -> Result<RunId, RunTriggerError> {
        (**self).create(job_id, interest, parent, request)
    }
}

/// Side-store of request details keyed by the run they triggered.
///
/// Writes are fire-and-forget; the job-run pipeline reads them later.
pub trait RequestMemory: Send + Sync {
    fn put(&self, run_id: RunId, request: ResolvedRequest);
}

impl<M> RequestMemory for Arc<M>
where
    M: RequestMemory + ?Sized,
{
    fn put(&self, run_id: RunId, request: ResolvedRequest) {
        (**self).put(run_id, request)
    }
}

/// Record of one `create` call accepted by [`InMemoryRunTrigger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggeredRun {
    pub run_id: RunId,
    pub job_id: JobId,
    pub interest: Interest,
    pub parent: Option<RunId>,
    pub request: RunRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TriggerState {
    runs: Vec<TriggeredRun>,
    attempts: usize,
    failure: Option<RunTriggerError>,
}

/// In-memory run trigger for tests/dev: records every call.
#[derive(Debug, Default)]
pub struct InMemoryRunTrigger {
    state: Mutex<TriggerState>,
}

impl InMemoryRunTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create` fail with `error` (or succeed again).
    pub fn fail_with(&self, error: Option<RunTriggerError>) {
        self.lock().failure = error;
    }

    /// Runs created so far.
    pub fn runs(&self) -> Vec<TriggeredRun> {
        self.lock().runs.clone()
    }

    pub fn runs_for(&self, job_id: JobId) -> Vec<TriggeredRun> {
        self.lock()
            .runs
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect()
    }

    /// All `create` calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunTrigger for InMemoryRunTrigger {
    fn create(
        &self,
        job_id: JobId,
        interest: &Interest,
        parent: Option<RunId>,
        request: RunRequest,
    ) -> Result<RunId, RunTriggerError> {
        let mut state = self.lock();
        state.attempts += 1;
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }

        let run_id = RunId::new();
        state.runs.push(TriggeredRun {
            run_id,
            job_id,
            interest: interest.clone(),
            parent,
            request,
            created_at: Utc::now(),
        });
        Ok(run_id)
    }
}

/// In-memory request side-store.
#[derive(Debug, Default)]
pub struct InMemoryRequestMemory {
    entries: Mutex<HashMap<RunId, ResolvedRequest>>,
}

impl InMemoryRequestMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, run_id: RunId) -> Option<ResolvedRequest> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&run_id)
            .cloned()
    }

    /// Remove and return the entry for `run_id` (consumed once by the run).
    pub fn take(&self, run_id: RunId) -> Option<ResolvedRequest> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&run_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestMemory for InMemoryRequestMemory {
    fn put(&self, run_id: RunId, request: ResolvedRequest) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run_id, request);
    }
}
