//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;

use crate::error::JobStoreError;
use crate::types::{FailedJob, JobId, QueuedJob};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Add a job to its queue.
    fn push(&self, job: QueuedJob) -> Result<JobId, JobStoreError>;

    /// Get a queued job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<QueuedJob>, JobStoreError>;

    /// Reserve the oldest available job on `queue`, counting an attempt.
    /// Returns None if no jobs are available.
    fn reserve_next(&self, queue: &str) -> Result<Option<QueuedJob>, JobStoreError>;

    /// Put a reserved job back, available again after `delay`.
    fn release(&self, job_id: JobId, delay: Duration) -> Result<(), JobStoreError>;

    /// Remove a job from the queue.
    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// Move a job to the failed list.
    fn fail(&self, job_id: JobId, error: String) -> Result<(), JobStoreError>;

    /// Get a failed job by ID.
    fn failed(&self, job_id: JobId) -> Result<Option<FailedJob>, JobStoreError>;

    /// List failed jobs, most recent first.
    fn list_failed(&self, limit: usize) -> Result<Vec<FailedJob>, JobStoreError>;

    /// Drop a job from the failed list.
    fn forget_failed(&self, job_id: JobId) -> Result<Option<FailedJob>, JobStoreError>;

    /// Number of jobs on `queue` (reserved or not).
    fn size(&self, queue: &str) -> Result<usize, JobStoreError>;
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn push(&self, job: QueuedJob) -> Result<JobId, JobStoreError> {
        (**self).push(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<QueuedJob>, JobStoreError> {
        (**self).get(job_id)
    }

    fn reserve_next(&self, queue: &str) -> Result<Option<QueuedJob>, JobStoreError> {
        (**self).reserve_next(queue)
    }

    fn release(&self, job_id: JobId, delay: Duration) -> Result<(), JobStoreError> {
        (**self).release(job_id, delay)
    }

    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete(job_id)
    }

    fn fail(&self, job_id: JobId, error: String) -> Result<(), JobStoreError> {
        (**self).fail(job_id, error)
    }

    fn failed(&self, job_id: JobId) -> Result<Option<FailedJob>, JobStoreError> {
        (**self).failed(job_id)
    }

    fn list_failed(&self, limit: usize) -> Result<Vec<FailedJob>, JobStoreError> {
        (**self).list_failed(limit)
    }

    fn forget_failed(&self, job_id: JobId) -> Result<Option<FailedJob>, JobStoreError> {
        (**self).forget_failed(job_id)
    }

    fn size(&self, queue: &str) -> Result<usize, JobStoreError> {
        (**self).size(queue)
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, QueuedJob>>,
    failed: RwLock<HashMap<JobId, FailedJob>>,
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("lock poisoned".into())
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, QueuedJob>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, QueuedJob>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn failed_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, FailedJob>>, JobStoreError> {
        self.failed.write().map_err(|_| poisoned())
    }
}

impl JobStore for InMemoryJobStore {
    fn push(&self, job: QueuedJob) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<QueuedJob>, JobStoreError> {
        Ok(self.jobs()?.get(&job_id).cloned())
    }

    fn reserve_next(&self, queue: &str) -> Result<Option<QueuedJob>, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let now = Utc::now();

        // Oldest available job first (FIFO)
        let next = jobs
            .values()
            .filter(|j| j.queue == queue && j.is_available(now))
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.reserve();
                job.clone()
            })
        }))
    }

    fn release(&self, job_id: JobId, delay: Duration) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        job.release(delay);
        Ok(())
    }

    fn delete(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.jobs_mut()?
            .remove(&job_id)
            .map(|_| ())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn fail(&self, job_id: JobId, error: String) -> Result<(), JobStoreError> {
        let job = self
            .jobs_mut()?
            .remove(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        self.failed_mut()?.insert(job_id, FailedJob::new(job, error));
        Ok(())
    }

    fn failed(&self, job_id: JobId) -> Result<Option<FailedJob>, JobStoreError> {
        Ok(self.failed.read().map_err(|_| poisoned())?.get(&job_id).cloned())
    }

    fn list_failed(&self, limit: usize) -> Result<Vec<FailedJob>, JobStoreError> {
        let failed = self.failed.read().map_err(|_| poisoned())?;
        let mut entries: Vec<_> = failed.values().cloned().collect();
        entries.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        entries.truncate(limit);
        Ok(entries)
    }

    fn forget_failed(&self, job_id: JobId) -> Result<Option<FailedJob>, JobStoreError> {
        Ok(self.failed_mut()?.remove(&job_id))
    }

    fn size(&self, queue: &str) -> Result<usize, JobStoreError> {
        Ok(self.jobs()?.values().filter(|j| j.queue == queue).count())
    }
}
