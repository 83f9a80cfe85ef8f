//! Subscription worker: one thread per (job, interest).
//!
//! Lifecycle: `Initializing -> Running -> Draining -> Stopped`.
//!
//! - **Initializing** runs on the caller's thread: build the filter, open the
//!   subscription, register it. Failures are returned, nothing is left behind.
//! - **Running** consumes resolved requests and triggers one run per request.
//!   A trigger failure is logged and the loop continues.
//! - **Draining** happens on shutdown, cancellation, activity-window exit or
//!   when the source drops the subscription. Whoever takes the entry out of
//!   the registry unsubscribes it, so each handle is closed exactly once.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use reqwatch_core::{Interest, Job, JobId};
use reqwatch_events::{
    BlockCallback, BlockEvents, EventMatcher, EventQuery, EventSource, SubscriptionHandle, SubscriptionId,
};
use reqwatch_observability::metrics;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::resolver::{RequestResolver, ResolvedRequest};
use crate::runs::RunRequest;

use super::registry::{RegisteredSubscription, SubscriptionRegistry};
use super::shutdown::{CancelToken, ShutdownSignal, is_disconnected};
use super::tracker::TrackerDeps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// Per-worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub requests_received: u64,
    pub runs_triggered: u64,
    pub trigger_failures: u64,
    /// Requests dropped because the worker was stopping.
    pub requests_discarded: u64,
}

/// Handle to observe and join a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    job_id: JobId,
    interest: Interest,
    subscription_id: SubscriptionId,
    state: Arc<Mutex<WorkerState>>,
    stats: Arc<Mutex<WorkerStats>>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread to exit.
    pub fn join(mut self) {
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                error!(job_id = %self.job_id, interest = %self.interest, "subscription worker panicked");
            }
        }
    }
}

enum Step {
    Request(ResolvedRequest),
    SourceClosed,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum Exit {
    Shutdown,
    WindowClosed,
    SourceClosed,
}

/// Worker for one (job, interest) pair.
pub struct SubscriptionWorker {
    job: Job,
    interest: Interest,
    deps: TrackerDeps,
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionWorker {
    pub fn new(job: Job, interest: Interest, deps: TrackerDeps, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            job,
            interest,
            deps,
            registry,
        }
    }

    /// Open the subscription, register it and spawn the worker thread.
    pub fn start(self, shutdown: &ShutdownSignal, config: &TrackerConfig) -> Result<WorkerHandle, TrackerError> {
        let job_id = self.job.id;
        let interest = self.interest.clone();
        let state = Arc::new(Mutex::new(WorkerState::Initializing));
        let stats = Arc::new(Mutex::new(WorkerStats::default()));

        let (tx, rx) = bounded::<ResolvedRequest>(config.request_channel_capacity);
        let query = EventQuery::for_interest(&interest);
        debug!(job_id = %job_id, query = %query, "opening subscription");

        let handle = self
            .deps
            .source
            .subscribe(query, self.on_block(tx))
            .map_err(|source| TrackerError::Subscribe {
                job_id,
                interest: interest.clone(),
                source,
            })?;

        let cancel = CancelToken::new();
        let registered = RegisteredSubscription {
            handle: handle.clone(),
            cancel: cancel.clone(),
        };
        if let Some(replaced) = self.registry.register(job_id, interest.clone(), registered) {
            debug!(job_id = %job_id, subscription_id = %replaced.handle.id(), "replacing subscription");
            replaced.cancel.fire();
            unsubscribe(self.deps.source.as_ref(), &replaced.handle);
        }

        let registry = Arc::clone(&self.registry);
        let source = Arc::clone(&self.deps.source);
        let shutdown_rx = shutdown.listener();
        let cancel_rx = cancel.listener();
        let thread_handle = handle.clone();
        let thread_state = Arc::clone(&state);
        let thread_stats = Arc::clone(&stats);

        let spawned = thread::Builder::new()
            .name(format!("{}-{}", config.worker_name_prefix, job_id))
            .spawn(move || self.run(thread_handle, rx, shutdown_rx, cancel_rx, thread_state, thread_stats));

        match spawned {
            Ok(join) => Ok(WorkerHandle {
                job_id,
                interest,
                subscription_id: handle.id(),
                state,
                stats,
                join: Some(join),
            }),
            Err(e) => {
                if let Some(own) = registry.remove_if_current(job_id, &interest, handle.id()) {
                    unsubscribe(source.as_ref(), &own.handle);
                }
                set_state(&state, WorkerState::Stopped);
                Err(TrackerError::Spawn {
                    job_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Callback run by the event source for every matching block: match,
    /// resolve, then forward into the worker's channel (may block).
    fn on_block(&self, tx: Sender<ResolvedRequest>) -> BlockCallback {
        let job_id = self.job.id;
        let matcher = EventMatcher::new(self.interest.clone());
        let resolver = RequestResolver::new(Arc::clone(&self.deps.lookup));

        Box::new(move |block: &BlockEvents| {
            let ids = matcher.match_block(block);
            if ids.is_empty() {
                return;
            }
            debug!(job_id = %job_id, height = block.height, matched = ids.len(), "matched service requests");

            for request in resolver.resolve(&ids, matcher.interest().provider()) {
                if tx.send(request).is_err() {
                    debug!(job_id = %job_id, height = block.height, "worker gone, dropping remaining requests");
                    break;
                }
            }
        })
    }

    fn run(
        self,
        handle: SubscriptionHandle,
        requests: Receiver<ResolvedRequest>,
        shutdown: Receiver<()>,
        cancel: Receiver<()>,
        state: Arc<Mutex<WorkerState>>,
        stats: Arc<Mutex<WorkerStats>>,
    ) {
        set_state(&state, WorkerState::Running);
        info!(
            job_id = %self.job.id,
            interest = %self.interest,
            subscription_id = %handle.id(),
            "subscription worker running"
        );

        let stopping = || is_disconnected(&shutdown) || is_disconnected(&cancel);

        let exit = loop {
            if stopping() {
                break Exit::Shutdown;
            }

            let step = select! {
                recv(requests) -> msg => match msg {
                    Ok(request) => Step::Request(request),
                    Err(_) => Step::SourceClosed,
                },
                recv(shutdown) -> _ => Step::Shutdown,
                recv(cancel) -> _ => Step::Shutdown,
            };

            let request = match step {
                Step::Request(request) => request,
                Step::SourceClosed => break Exit::SourceClosed,
                Step::Shutdown => break Exit::Shutdown,
            };
            update(&stats, |s| s.requests_received += 1);

            // Shutdown wins over a request that arrived at the same time.
            if stopping() {
                update(&stats, |s| s.requests_discarded += 1);
                break Exit::Shutdown;
            }

            if !self.job.is_active(Utc::now()) {
                let pending = requests.len() as u64;
                update(&stats, |s| s.requests_discarded += 1 + pending);
                break Exit::WindowClosed;
            }

            self.trigger_run(request, &stats);
        };

        set_state(&state, WorkerState::Draining);
        if let Some(own) = self.registry.remove_if_current(self.job.id, &self.interest, handle.id()) {
            own.cancel.fire();
            unsubscribe(self.deps.source.as_ref(), &own.handle);
        }
        drop(requests);
        set_state(&state, WorkerState::Stopped);

        info!(
            job_id = %self.job.id,
            interest = %self.interest,
            reason = ?exit,
            "subscription worker stopped"
        );
    }

    fn trigger_run(&self, request: ResolvedRequest, stats: &Mutex<WorkerStats>) {
        let request_id = request.detail.id.clone();

        match self
            .deps
            .trigger
            .create(self.job.id, &self.interest, None, RunRequest::default())
        {
            Ok(run_id) => {
                metrics::inc_runs_triggered();
                update(stats, |s| s.runs_triggered += 1);
                debug!(job_id = %self.job.id, run_id = %run_id, request_id = %request_id, "run triggered");
                self.deps.memory.put(run_id, request);
            }
            Err(err) => {
                metrics::inc_run_trigger_failures();
                update(stats, |s| s.trigger_failures += 1);
                error!(
                    job_id = %self.job.id,
                    request_id = %request_id,
                    error = %err,
                    "failed to create run for service request"
                );
            }
        }
    }
}

/// Best-effort unsubscribe; failures are logged.
pub(crate) fn unsubscribe(source: &dyn EventSource, handle: &SubscriptionHandle) {
    if let Err(err) = source.unsubscribe(handle) {
        warn!(subscription_id = %handle.id(), error = %err, "unsubscribe failed");
    }
}

fn set_state(state: &Mutex<WorkerState>, next: WorkerState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

fn update(stats: &Mutex<WorkerStats>, f: impl FnOnce(&mut WorkerStats)) {
    f(&mut stats.lock().unwrap_or_else(PoisonError::into_inner));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobStore;
    use crate::resolver::{InMemoryRequestLookup, RequestDetail};
    use crate::runs::{InMemoryRequestMemory, InMemoryRunTrigger};
    use reqwatch_events::{InMemoryEventSource, NEW_BATCH_REQUEST, ProviderRequestRecord, RawEvent};
    use std::time::{Duration, Instant};

    fn deps(source: &Arc<InMemoryEventSource>, trigger: &Arc<InMemoryRunTrigger>) -> TrackerDeps {
        let lookup = InMemoryRequestLookup::new();
        lookup.insert(RequestDetail::new("req-1", "svcA", "p1"));
        TrackerDeps {
            source: source.clone(),
            lookup: Arc::new(lookup),
            trigger: trigger.clone(),
            memory: Arc::new(InMemoryRequestMemory::new()),
            jobs: InMemoryJobStore::arc(),
        }
    }

    fn interest() -> Interest {
        Interest::new("p1", "svcA").unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn shutdown_drains_and_stops() {
        let source = InMemoryEventSource::arc();
        let trigger = Arc::new(InMemoryRunTrigger::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let shutdown = ShutdownSignal::new();
        let job = Job::new("oracle").with_interest(interest());

        let handle = SubscriptionWorker::new(job.clone(), interest(), deps(&source, &trigger), Arc::clone(&registry))
            .start(&shutdown, &TrackerConfig::default())
            .unwrap();
        assert!(wait_until(|| handle.state() == WorkerState::Running));
        assert!(registry.contains(job.id));

        shutdown.fire();
        assert!(wait_until(|| handle.is_finished()));

        assert_eq!(handle.state(), WorkerState::Stopped);
        assert!(!registry.contains(job.id));
        assert!(!source.is_subscribed(handle.subscription_id()));
        handle.join();
    }

    #[test]
    fn counts_triggered_runs() {
        let source = InMemoryEventSource::arc();
        let trigger = Arc::new(InMemoryRunTrigger::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let shutdown = ShutdownSignal::new();
        let job = Job::new("oracle").with_interest(interest());

        let handle = SubscriptionWorker::new(job, interest(), deps(&source, &trigger), registry)
            .start(&shutdown, &TrackerConfig::default())
            .unwrap();

        let block = BlockEvents::new(
            1,
            vec![
                RawEvent::new(NEW_BATCH_REQUEST).with_attribute("service_name", "svcA"),
                ProviderRequestRecord::to_raw("svcA", "p1", r#"["req-1"]"#),
            ],
        );
        source.publish(block).unwrap();

        assert!(wait_until(|| handle.stats().runs_triggered == 1));
        assert_eq!(handle.stats().requests_received, 1);
        assert_eq!(handle.stats().trigger_failures, 0);

        shutdown.fire();
        handle.join();
    }

    #[test]
    fn replaced_worker_is_cancelled() {
        let source = InMemoryEventSource::arc();
        let trigger = Arc::new(InMemoryRunTrigger::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let shutdown = ShutdownSignal::new();
        let job = Job::new("oracle").with_interest(interest());
        let config = TrackerConfig::default();

        let first = SubscriptionWorker::new(job.clone(), interest(), deps(&source, &trigger), Arc::clone(&registry))
            .start(&shutdown, &config)
            .unwrap();
        let second = SubscriptionWorker::new(job.clone(), interest(), deps(&source, &trigger), Arc::clone(&registry))
            .start(&shutdown, &config)
            .unwrap();

        assert!(wait_until(|| first.is_finished()));
        assert!(!source.is_subscribed(first.subscription_id()));
        assert!(source.is_subscribed(second.subscription_id()));
        assert_eq!(registry.subscriptions_for(job.id), 1);
        assert!(!second.is_finished());

        shutdown.fire();
        first.join();
        second.join();
    }
}
