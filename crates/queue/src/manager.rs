//! Queue manager: builds payloads, stores jobs, owns hooks and listeners.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use tenantry_core::current;

use crate::error::{ListenerError, QueueError};
use crate::events::{
    JobEvent, JobExceptionOccurred, JobProcessing, JobRetryRequested, Listeners,
};
use crate::job::{Job, JobRegistry, Queueable};
use crate::payload::JobPayload;
use crate::store::JobStore;
use crate::types::{JobId, QueuedJob};

/// What a payload hook gets to look at while a job is being queued.
pub struct PayloadContext<'a> {
    pub connection: &'a str,
    pub queue: &'a str,
    pub job: &'a dyn Queueable,
    /// The payload built so far (queue keys plus earlier hooks' fields)
    pub payload: &'a JobPayload,
}

/// Returns extra fields to merge into an outgoing payload.
pub type PayloadHook = Box<dyn Fn(&PayloadContext<'_>) -> Map<String, Value> + Send + Sync>;

/// Front door of a queue connection.
///
/// Configure it (register job types, hooks, listeners) before sharing it with
/// workers; after that it is only used through `&self`.
pub struct QueueManager<S: JobStore> {
    connection: String,
    store: S,
    registry: JobRegistry,
    payload_hooks: Vec<PayloadHook>,
    listeners: Listeners,
}

impl<S: JobStore> QueueManager<S> {
    pub fn new(connection: impl Into<String>, store: S) -> Self {
        Self {
            connection: connection.into(),
            store,
            registry: JobRegistry::new(),
            payload_hooks: Vec::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Make `J` decodable by workers.
    pub fn register<J: Job>(&mut self) -> &mut Self {
        self.registry.register::<J>();
        self
    }

    /// Add a hook whose fields are merged into every payload created from now on.
    pub fn create_payload_using<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&PayloadContext<'_>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.payload_hooks.push(Box::new(hook));
        self
    }

    pub fn on_job_processing<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&mut JobProcessing) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners.on_processing(Box::new(listener));
        self
    }

    pub fn on_job_retry_requested<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&mut JobRetryRequested) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listeners.on_retry_requested(Box::new(listener));
        self
    }

    /// Failure-reporting channel: called for every failed attempt.
    pub fn on_job_exception<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&JobExceptionOccurred) + Send + Sync + 'static,
    {
        self.listeners.on_exception(Box::new(listener));
        self
    }

    /// Serialize `job` and run the payload hooks over it.
    pub fn create_payload(
        &self,
        queue: &str,
        job: &dyn Queueable,
    ) -> Result<(JobId, JobPayload), QueueError> {
        let id = JobId::new();
        let mut payload = JobPayload::for_command(
            id,
            job.type_name(),
            &job.display_name(),
            job.serialize_command()?,
        );

        for hook in &self.payload_hooks {
            let extra = hook(&PayloadContext {
                connection: &self.connection,
                queue,
                job,
                payload: &payload,
            });
            payload.merge(extra);
        }

        Ok((id, payload))
    }

    /// Queue a job.
    pub fn push<J: Job>(&self, queue: &str, job: &J) -> Result<JobId, QueueError> {
        self.push_queueable(queue, job)
    }

    pub fn push_queueable(&self, queue: &str, job: &dyn Queueable) -> Result<JobId, QueueError> {
        if !self.registry.is_registered(job.type_name()) {
            warn!(
                job_type = job.type_name(),
                "queueing a job type workers cannot decode"
            );
        }
        let (id, payload) = self.create_payload(queue, job)?;
        self.push_raw(id, queue, &payload)
    }

    /// Store an already-built payload as is. Payload hooks are not run.
    pub fn push_raw(
        &self,
        id: JobId,
        queue: &str,
        payload: &JobPayload,
    ) -> Result<JobId, QueueError> {
        let job = QueuedJob::new(id, self.connection.as_str(), queue, payload)?;
        let id = self.store.push(job)?;
        debug!(job_id = %id, queue, "job queued");
        Ok(id)
    }

    /// Push a failed job back onto its queue.
    ///
    /// Retry-requested listeners run first; if one fails the job stays out of
    /// the queue, and if it also deleted the job, the failed record is dropped.
    /// The caller's current tenant is the same afterwards.
    pub fn retry(&self, failed_id: JobId) -> Result<JobId, QueueError> {
        let _isolation = current::isolate();
        let failed = self
            .store
            .failed(failed_id)?
            .ok_or(QueueError::FailedJobNotFound(failed_id))?;
        let payload = failed.decode_payload()?;

        let mut event = JobRetryRequested::new(failed.clone(), payload);
        if let Err(source) = self.listeners.retry_requested(&mut event) {
            let deleted = event.is_deleted();
            if deleted {
                self.store.forget_failed(failed_id)?;
            }
            self.listeners.exception(&JobExceptionOccurred {
                connection: failed.connection.clone(),
                job_id: failed_id,
                display_name: event.display_name().to_string(),
                error: source.to_string(),
                deleted,
            });
            return Err(QueueError::RetryRejected {
                id: failed_id,
                source,
            });
        }

        let job = QueuedJob::new(failed.id, failed.connection, failed.queue, event.payload())?;
        let id = self.store.push(job)?;
        self.store.forget_failed(failed_id)?;
        debug!(job_id = %id, "failed job pushed back for retry");
        Ok(id)
    }
}

impl<S: JobStore + std::fmt::Debug> std::fmt::Debug for QueueManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("connection", &self.connection)
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("payload_hooks", &self.payload_hooks.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
