//! Job storage implementations.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use reqwatch_core::{InitiatorKind, Job, JobId};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Store a new job.
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Delete a job, returning it.
    fn remove(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Visit every job that has an initiator of `kind`, oldest first.
    /// Enumeration stops early when the visitor returns `false`.
    fn for_each_job(
        &self,
        kind: InitiatorKind,
        visitor: &mut dyn FnMut(&Job) -> bool,
    ) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn remove(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).remove(job_id)
    }

    fn for_each_job(
        &self,
        kind: InitiatorKind,
        visitor: &mut dyn FnMut(&Job) -> bool,
    ) -> Result<(), JobStoreError> {
        (**self).for_each_job(kind, visitor)
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(&job_id).cloned())
    }

    fn remove(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))
    }

    fn for_each_job(
        &self,
        kind: InitiatorKind,
        visitor: &mut dyn FnMut(&Job) -> bool,
    ) -> Result<(), JobStoreError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);

        // Sort by created_at to visit oldest first; ids break ties.
        let mut matching: Vec<&Job> = jobs.values().filter(|j| j.has_initiator(kind)).collect();
        matching.sort_by_key(|j| (j.created_at, j.id));

        for job in matching {
            if !visitor(job) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwatch_core::{Initiator, Interest};

    fn service_job(name: &str) -> Job {
        Job::new(name).with_interest(Interest::new("p1", "svcA").unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let store = InMemoryJobStore::new();
        let job = service_job("a");
        let id = store.insert(job.clone()).unwrap();

        assert_eq!(store.get(id).unwrap(), Some(job.clone()));
        assert_eq!(store.insert(job), Err(JobStoreError::AlreadyExists(id)));

        store.remove(id).unwrap();
        assert!(store.get(id).unwrap().is_none());
        assert_eq!(store.remove(id), Err(JobStoreError::NotFound(id)));
        assert!(store.is_empty());
    }

    #[test]
    fn enumerates_by_initiator_kind() {
        let store = InMemoryJobStore::new();
        store.insert(service_job("a")).unwrap();
        store.insert(Job::new("web-only").with_initiator(Initiator::Web)).unwrap();
        store.insert(service_job("b")).unwrap();

        let mut names = Vec::new();
        store
            .for_each_job(InitiatorKind::ServiceRequest, &mut |job| {
                names.push(job.name.clone());
                true
            })
            .unwrap();

        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn visitor_can_stop_early() {
        let store = InMemoryJobStore::new();
        for i in 0..5 {
            store.insert(service_job(&format!("job-{i}"))).unwrap();
        }

        let mut visited = 0;
        store
            .for_each_job(InitiatorKind::ServiceRequest, &mut |_| {
                visited += 1;
                visited < 2
            })
            .unwrap();

        assert_eq!(visited, 2);
    }
}
