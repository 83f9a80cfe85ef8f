//! Subscription tracker: owns the registry, the workers and the global
//! shutdown signal.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, error, info, warn};

use reqwatch_core::{InitiatorKind, Job, JobId};
use reqwatch_events::EventSource;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::jobs::JobStore;
use crate::resolver::RequestDetailLookup;
use crate::runs::{RequestMemory, RunTrigger};

use super::registry::{RegistryError, SubscriptionRegistry};
use super::shutdown::ShutdownSignal;
use super::worker::{SubscriptionWorker, WorkerHandle, unsubscribe};

/// Collaborators handed to every worker.
#[derive(Clone)]
pub struct TrackerDeps {
    pub source: Arc<dyn EventSource>,
    pub lookup: Arc<dyn RequestDetailLookup>,
    pub trigger: Arc<dyn RunTrigger>,
    pub memory: Arc<dyn RequestMemory>,
    pub jobs: Arc<dyn JobStore>,
}

#[derive(Debug, Default)]
struct TrackerState {
    started: bool,
    shutdown: Option<ShutdownSignal>,
}

/// Keeps one subscription per (job, interest) open while started.
///
/// All methods take `&self`; the tracker is meant to be shared behind an
/// `Arc` between the job-management side and whoever owns the lifecycle.
pub struct SubscriptionTracker {
    deps: TrackerDeps,
    config: TrackerConfig,
    registry: Arc<SubscriptionRegistry>,
    state: RwLock<TrackerState>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl SubscriptionTracker {
    pub fn new(deps: TrackerDeps, config: TrackerConfig) -> Self {
        Self {
            deps,
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            state: RwLock::new(TrackerState::default()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Arm a fresh shutdown signal and subscribe every stored
    /// service-request job.
    ///
    /// Jobs that fail to start are reported together in
    /// [`TrackerError::Startup`]; the tracker stays started either way.
    pub fn start(&self) -> Result<(), TrackerError> {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.started {
                return Err(TrackerError::AlreadyStarted);
            }
            state.started = true;
            state.shutdown = Some(ShutdownSignal::new());
        }
        info!("subscription tracker starting");

        let mut jobs = Vec::new();
        self.deps
            .jobs
            .for_each_job(InitiatorKind::ServiceRequest, &mut |job: &Job| {
                jobs.push(job.clone());
                true
            })?;

        let mut failures = Vec::new();
        let mut started = 0;
        for job in &jobs {
            match self.add_job(job) {
                Ok(n) => started += n,
                Err(err) => {
                    error!(job_id = %job.id, error = %err, "failed to start job subscriptions");
                    failures.push(err);
                }
            }
        }

        info!(
            jobs = jobs.len(),
            workers = started,
            failed = failures.len(),
            "subscription tracker started"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::Startup { failures })
        }
    }

    /// Fire the shutdown signal, close every subscription and wait for the
    /// workers. No-op when not started.
    pub fn stop(&self) {
        let shutdown = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if !state.started {
                return;
            }
            state.started = false;
            state.shutdown.take()
        };
        if let Some(signal) = shutdown {
            signal.fire();
        }

        let drained = self.registry.drain();
        let closed = drained.len();
        for (job_id, sub) in drained {
            debug!(job_id = %job_id, subscription_id = %sub.handle.id(), "closing subscription");
            sub.cancel.fire();
            unsubscribe(self.deps.source.as_ref(), &sub.handle);
        }

        let workers = std::mem::take(&mut *self.workers());
        let count = workers.len();
        if self.config.join_workers_on_stop {
            for worker in workers {
                worker.join();
            }
        }

        info!(subscriptions = closed, workers = count, "subscription tracker stopped");
    }

    /// Start one worker per declared interest of `job`.
    ///
    /// Returns the number of workers started; `Ok(0)` when the tracker is not
    /// started or the job declares no interest. Re-adding a job replaces its
    /// subscriptions.
    ///
    /// All or nothing: if any interest fails to subscribe, every subscription
    /// of the job is closed again and the first error is returned.
    pub fn add_job(&self, job: &Job) -> Result<usize, TrackerError> {
        let Some(shutdown) = self.current_shutdown() else {
            debug!(job_id = %job.id, "tracker not started, ignoring job");
            return Ok(0);
        };
        self.reap_finished();

        let mut started = 0;
        for interest in job.interests() {
            let worker = SubscriptionWorker::new(
                job.clone(),
                interest.clone(),
                self.deps.clone(),
                Arc::clone(&self.registry),
            );
            match worker.start(&shutdown, &self.config) {
                Ok(handle) => {
                    self.adopt(handle);
                    started += 1;
                }
                Err(err) => {
                    let closed = self.unsubscribe_job(job.id).unwrap_or(0);
                    warn!(
                        job_id = %job.id,
                        interest = %interest,
                        closed,
                        error = %err,
                        "subscribe failed, job left unsubscribed"
                    );
                    return Err(err);
                }
            }
        }

        if started > 0 {
            info!(job_id = %job.id, workers = started, "job subscribed");
        }
        Ok(started)
    }

    /// Close every subscription of `job_id` and cancel its workers.
    pub fn remove_job(&self, job_id: JobId) -> Result<(), TrackerError> {
        let closed = self.unsubscribe_job(job_id)?;
        info!(job_id = %job_id, subscriptions = closed, "job unsubscribed");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).started
    }

    /// Number of jobs with at least one open subscription.
    pub fn subscription_count(&self) -> usize {
        self.registry.size()
    }

    /// Number of worker threads still running.
    pub fn worker_count(&self) -> usize {
        self.workers().iter().filter(|w| !w.is_finished()).count()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    fn current_shutdown(&self) -> Option<ShutdownSignal> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.started { state.shutdown.clone() } else { None }
    }

    /// Remove the job's entries, cancel their workers and unsubscribe.
    fn unsubscribe_job(&self, job_id: JobId) -> Result<usize, TrackerError> {
        let removed = self.registry.remove(job_id).map_err(|e| match e {
            RegistryError::NotFound(id) => TrackerError::NotFound(id),
        })?;

        for sub in &removed {
            sub.cancel.fire();
            unsubscribe(self.deps.source.as_ref(), &sub.handle);
        }
        Ok(removed.len())
    }

    /// Keep `handle` for `stop` to join. A handle that shows up after `stop`
    /// took the list belongs to a worker that already saw the fired signal,
    /// so it is joined here instead.
    fn adopt(&self, handle: WorkerHandle) {
        let mut workers = self.workers();
        if self.is_started() {
            workers.push(handle);
            return;
        }
        drop(workers);

        debug!(job_id = %handle.job_id(), "tracker stopped while starting worker");
        if self.config.join_workers_on_stop {
            handle.join();
        }
    }

    fn reap_finished(&self) {
        let mut workers = self.workers();
        let (finished, running): (Vec<_>, Vec<_>) = workers.drain(..).partition(WorkerHandle::is_finished);
        *workers = running;
        drop(workers);

        for worker in finished {
            worker.join();
        }
    }

    fn workers(&self) -> MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SubscriptionTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
