//! Registry of open subscriptions, keyed by job.
//!
//! Concurrency contract: a single `RwLock` guards the map. `register`,
//! `remove`, `remove_if_current` and `drain` take it exclusively and only for
//! the map update; `size`, `contains` and `gauge_value` take it shared. No
//! collaborator is ever called while the lock is held, so callers issue the
//! actual unsubscribe with the entries these methods hand back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwatch_core::{Interest, JobId};
use reqwatch_events::{SubscriptionHandle, SubscriptionId};

use super::shutdown::CancelToken;

/// An open subscription and the token that cancels its worker.
#[derive(Debug, Clone)]
pub struct RegisteredSubscription {
    pub handle: SubscriptionHandle,
    pub cancel: CancelToken,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no subscription registered for job {0}")]
    NotFound(JobId),
}

type JobEntries = HashMap<Interest, RegisteredSubscription>;

/// Job id -> one subscription per declared interest.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    jobs: RwLock<HashMap<JobId, JobEntries>>,
    gauge: AtomicUsize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the subscription for (`job_id`, `interest`).
    ///
    /// Returns the replaced entry; the caller must cancel and unsubscribe it.
    pub fn register(
        &self,
        job_id: JobId,
        interest: Interest,
        subscription: RegisteredSubscription,
    ) -> Option<RegisteredSubscription> {
        let mut jobs = self.write();
        let replaced = jobs.entry(job_id).or_default().insert(interest, subscription);
        self.publish_size(jobs.len());
        replaced
    }

    /// Remove every subscription of `job_id`.
    pub fn remove(&self, job_id: JobId) -> Result<Vec<RegisteredSubscription>, RegistryError> {
        let mut jobs = self.write();
        let entries = jobs.remove(&job_id).ok_or(RegistryError::NotFound(job_id))?;
        self.publish_size(jobs.len());
        Ok(entries.into_values().collect())
    }

    /// Remove the (`job_id`, `interest`) entry only if it still holds the
    /// subscription `id`. A worker tearing itself down uses this so it never
    /// removes the entry of the worker that replaced it.
    pub fn remove_if_current(
        &self,
        job_id: JobId,
        interest: &Interest,
        id: SubscriptionId,
    ) -> Option<RegisteredSubscription> {
        let mut jobs = self.write();
        let entries = jobs.get_mut(&job_id)?;
        if entries.get(interest).map(|s| s.handle.id()) != Some(id) {
            return None;
        }

        let removed = entries.remove(interest);
        if entries.is_empty() {
            jobs.remove(&job_id);
        }
        self.publish_size(jobs.len());
        removed
    }

    /// Remove everything (tracker stop).
    pub fn drain(&self) -> Vec<(JobId, RegisteredSubscription)> {
        let mut jobs = self.write();
        let drained = jobs
            .drain()
            .flat_map(|(job_id, entries)| entries.into_values().map(move |s| (job_id, s)))
            .collect();
        self.publish_size(0);
        drained
    }

    /// Number of jobs with at least one live subscription.
    pub fn size(&self) -> usize {
        self.read().len()
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.read().contains_key(&job_id)
    }

    /// Subscriptions registered for `job_id` (one per interest).
    pub fn subscriptions_for(&self, job_id: JobId) -> usize {
        self.read().get(&job_id).map_or(0, HashMap::len)
    }

    /// Last value published to the active-subscriptions gauge.
    pub fn gauge_value(&self) -> usize {
        self.gauge.load(Ordering::SeqCst)
    }

    // Called with the write lock held so the gauge never lags the map.
    fn publish_size(&self, size: usize) {
        self.gauge.store(size, Ordering::SeqCst);
        reqwatch_observability::metrics::set_active_subscriptions(size);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, JobEntries>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, JobEntries>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwatch_events::EventQuery;

    fn interest(service: &str) -> Interest {
        Interest::new("p1", service).unwrap()
    }

    fn subscription() -> RegisteredSubscription {
        RegisteredSubscription {
            handle: SubscriptionHandle::new(SubscriptionId::new(), EventQuery::new()),
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn register_replaces_instead_of_accumulating() {
        let registry = SubscriptionRegistry::new();
        let job_id = JobId::new();
        let first = subscription();

        assert!(registry.register(job_id, interest("svcA"), first.clone()).is_none());
        let replaced = registry.register(job_id, interest("svcA"), subscription()).unwrap();

        assert_eq!(replaced.handle, first.handle);
        assert_eq!(registry.size(), 1);
        assert_eq!(registry.subscriptions_for(job_id), 1);
        assert_eq!(registry.gauge_value(), 1);
    }

    #[test]
    fn interests_of_one_job_count_once() {
        let registry = SubscriptionRegistry::new();
        let job_id = JobId::new();
        registry.register(job_id, interest("svcA"), subscription());
        registry.register(job_id, interest("svcB"), subscription());

        assert_eq!(registry.size(), 1);
        assert_eq!(registry.subscriptions_for(job_id), 2);
        assert_eq!(registry.remove(job_id).unwrap().len(), 2);
        assert_eq!(registry.gauge_value(), 0);
    }

    #[test]
    fn remove_unknown_job_leaves_size_alone() {
        let registry = SubscriptionRegistry::new();
        registry.register(JobId::new(), interest("svcA"), subscription());

        let missing = JobId::new();
        assert_eq!(registry.remove(missing).unwrap_err(), RegistryError::NotFound(missing));
        assert_eq!(registry.size(), 1);
    }

    #[test]
    fn remove_if_current_ignores_replaced_handles() {
        let registry = SubscriptionRegistry::new();
        let job_id = JobId::new();
        let old = subscription();
        let new = subscription();
        registry.register(job_id, interest("svcA"), old.clone());
        registry.register(job_id, interest("svcA"), new.clone());

        assert!(registry.remove_if_current(job_id, &interest("svcA"), old.handle.id()).is_none());
        assert!(registry.contains(job_id));

        assert!(registry.remove_if_current(job_id, &interest("svcA"), new.handle.id()).is_some());
        assert!(!registry.contains(job_id));
        assert_eq!(registry.gauge_value(), 0);
    }

    #[test]
    fn drain_empties_everything() {
        let registry = SubscriptionRegistry::new();
        for _ in 0..3 {
            registry.register(JobId::new(), interest("svcA"), subscription());
        }

        assert_eq!(registry.drain().len(), 3);
        assert_eq!(registry.size(), 0);
        assert_eq!(registry.gauge_value(), 0);
    }
}
