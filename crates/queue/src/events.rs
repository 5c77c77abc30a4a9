//! Job lifecycle events and their listeners.
//!
//! Listeners run synchronously on the thread that processes the job. A
//! listener can `delete()` the job (it will not be released or retried) and
//! can `hold()` a guard that stays alive until the job body has finished.

use std::any::Any;
use std::fmt;

use crate::error::ListenerError;
use crate::payload::JobPayload;
use crate::types::{FailedJob, JobId, QueuedJob};

/// Which lifecycle event a listener is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventKind {
    /// About to run the job body
    Processing,
    /// A failed job is being pushed back onto the queue
    RetryRequested,
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobEventKind::Processing => f.write_str("job processing"),
            JobEventKind::RetryRequested => f.write_str("job retry requested"),
        }
    }
}

/// Common view over the events that carry a job payload.
pub trait JobEvent {
    fn kind(&self) -> JobEventKind;

    fn connection(&self) -> &str;

    fn job_id(&self) -> JobId;

    fn display_name(&self) -> &str;

    fn payload(&self) -> &JobPayload;

    /// Remove the job for good. It will not be released, failed, or retried.
    fn delete(&mut self);

    fn is_deleted(&self) -> bool;

    /// Keep `guard` alive until the job this event belongs to is finished.
    fn hold(&mut self, guard: Box<dyn Any>);
}

fn display_name_of(payload: &JobPayload, id: JobId) -> String {
    payload
        .display_name()
        .map(str::to_string)
        .unwrap_or_else(|| id.to_string())
}

/// Held guards are released newest first, so nested scopes unwind in order.
fn release_held(held: &mut Vec<Box<dyn Any>>) {
    while let Some(guard) = held.pop() {
        drop(guard);
    }
}

/// Fired right before a reserved job's body runs.
pub struct JobProcessing {
    job: QueuedJob,
    payload: JobPayload,
    display_name: String,
    deleted: bool,
    held: Vec<Box<dyn Any>>,
}

impl JobProcessing {
    pub fn new(job: QueuedJob, payload: JobPayload) -> Self {
        let display_name = display_name_of(&payload, job.id);
        Self {
            job,
            payload,
            display_name,
            deleted: false,
            held: Vec::new(),
        }
    }

    pub fn job(&self) -> &QueuedJob {
        &self.job
    }

    pub fn attempts(&self) -> u32 {
        self.job.attempts
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl JobEvent for JobProcessing {
    fn kind(&self) -> JobEventKind {
        JobEventKind::Processing
    }

    fn connection(&self) -> &str {
        &self.job.connection
    }

    fn job_id(&self) -> JobId {
        self.job.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn payload(&self) -> &JobPayload {
        &self.payload
    }

    fn delete(&mut self) {
        self.deleted = true;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn hold(&mut self, guard: Box<dyn Any>) {
        self.held.push(guard);
    }
}

impl Drop for JobProcessing {
    fn drop(&mut self) {
        release_held(&mut self.held);
    }
}

impl fmt::Debug for JobProcessing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProcessing")
            .field("job_id", &self.job.id)
            .field("display_name", &self.display_name)
            .field("deleted", &self.deleted)
            .field("held", &self.held.len())
            .finish()
    }
}

/// Fired when a failed job is about to be pushed back onto the queue.
pub struct JobRetryRequested {
    failed: FailedJob,
    payload: JobPayload,
    display_name: String,
    deleted: bool,
    held: Vec<Box<dyn Any>>,
}

impl JobRetryRequested {
    pub fn new(failed: FailedJob, payload: JobPayload) -> Self {
        let display_name = display_name_of(&payload, failed.id);
        Self {
            failed,
            payload,
            display_name,
            deleted: false,
            held: Vec::new(),
        }
    }

    pub fn failed_job(&self) -> &FailedJob {
        &self.failed
    }
}

impl JobEvent for JobRetryRequested {
    fn kind(&self) -> JobEventKind {
        JobEventKind::RetryRequested
    }

    fn connection(&self) -> &str {
        &self.failed.connection
    }

    fn job_id(&self) -> JobId {
        self.failed.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn payload(&self) -> &JobPayload {
        &self.payload
    }

    fn delete(&mut self) {
        self.deleted = true;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn hold(&mut self, guard: Box<dyn Any>) {
        self.held.push(guard);
    }
}

impl Drop for JobRetryRequested {
    fn drop(&mut self) {
        release_held(&mut self.held);
    }
}

impl fmt::Debug for JobRetryRequested {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRetryRequested")
            .field("job_id", &self.failed.id)
            .field("display_name", &self.display_name)
            .field("deleted", &self.deleted)
            .finish()
    }
}

/// Fired when a job attempt ends in an error, whatever happens to it next.
#[derive(Debug, Clone)]
pub struct JobExceptionOccurred {
    pub connection: String,
    pub job_id: JobId,
    pub display_name: String,
    pub error: String,
    /// The job was deleted and will not run again
    pub deleted: bool,
}

pub type ProcessingListener =
    Box<dyn Fn(&mut JobProcessing) -> Result<(), ListenerError> + Send + Sync>;
pub type RetryRequestedListener =
    Box<dyn Fn(&mut JobRetryRequested) -> Result<(), ListenerError> + Send + Sync>;
pub type ExceptionListener = Box<dyn Fn(&JobExceptionOccurred) + Send + Sync>;

/// Registered listeners, called in registration order.
#[derive(Default)]
pub struct Listeners {
    processing: Vec<ProcessingListener>,
    retry_requested: Vec<RetryRequestedListener>,
    exception: Vec<ExceptionListener>,
}

impl Listeners {
    pub fn on_processing(&mut self, listener: ProcessingListener) {
        self.processing.push(listener);
    }

    pub fn on_retry_requested(&mut self, listener: RetryRequestedListener) {
        self.retry_requested.push(listener);
    }

    pub fn on_exception(&mut self, listener: ExceptionListener) {
        self.exception.push(listener);
    }

    /// Stops at the first listener that fails.
    pub fn processing(&self, event: &mut JobProcessing) -> Result<(), ListenerError> {
        for listener in &self.processing {
            listener(event)?;
        }
        Ok(())
    }

    /// Stops at the first listener that fails.
    pub fn retry_requested(&self, event: &mut JobRetryRequested) -> Result<(), ListenerError> {
        for listener in &self.retry_requested {
            listener(event)?;
        }
        Ok(())
    }

    pub fn exception(&self, event: &JobExceptionOccurred) {
        for listener in &self.exception {
            listener(event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("processing", &self.processing.len())
            .field("retry_requested", &self.retry_requested.len())
            .field("exception", &self.exception.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use tenantry_core::{Tenant, TenantId, current};

    use super::*;

    fn processing_event() -> JobProcessing {
        let id = JobId::new();
        let payload = JobPayload::for_command(id, "tests.Noop", "Noop", serde_json::json!({}));
        let job = QueuedJob::new(id, "memory", "default", &payload).unwrap();
        JobProcessing::new(job, payload)
    }

    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn listeners_stop_at_first_error() {
        let mut listeners = Listeners::default();
        listeners.on_processing(Box::new(|event| {
            event.delete();
            Err("nope".into())
        }));
        listeners.on_processing(Box::new(|_| panic!("second listener must not run")));

        let mut event = processing_event();
        let err = listeners.processing(&mut event).unwrap_err();

        assert_eq!(err.to_string(), "nope");
        assert!(event.is_deleted());
    }

    #[test]
    fn held_guards_live_as_long_as_the_event() {
        let dropped = Rc::new(Cell::new(false));
        let mut event = processing_event();
        event.hold(Box::new(DropFlag(dropped.clone())));

        assert_eq!(event.held_count(), 1);
        assert!(!dropped.get());
        drop(event);
        assert!(dropped.get());
    }

    #[test]
    fn held_scopes_unwind_newest_first() {
        let _isolation = current::isolate();
        current::forget();
        let first = Tenant::new(TenantId::new(), "first").unwrap();
        let second = Tenant::new(TenantId::new(), "second").unwrap();

        let mut event = processing_event();
        event.hold(Box::new(current::bind(first)));
        event.hold(Box::new(current::bind(second.clone())));
        assert_eq!(current::current_id(), Some(second.id()));

        drop(event);
        assert!(current::current().is_none());
    }

    #[test]
    fn retry_event_releases_held_scopes_newest_first() {
        let _isolation = current::isolate();
        let before = Tenant::new(TenantId::new(), "before").unwrap();
        let _outer = current::bind(before.clone());

        let id = JobId::new();
        let payload = JobPayload::for_command(id, "tests.Noop", "Noop", serde_json::json!({}));
        let job = QueuedJob::new(id, "memory", "default", &payload).unwrap();
        let mut event = JobRetryRequested::new(FailedJob::new(job, "failed"), payload);
        assert_eq!(event.failed_job().id, id);
        for name in ["a", "b", "c"] {
            event.hold(Box::new(current::bind(Tenant::new(TenantId::new(), name).unwrap())));
        }

        drop(event);
        assert_eq!(current::current_id(), Some(before.id()));
    }

    #[test]
    fn display_name_comes_from_the_payload() {
        let event = processing_event();
        assert_eq!(event.display_name(), "Noop");
        assert_eq!(event.kind(), JobEventKind::Processing);
        assert_eq!(event.connection(), "memory");
        assert_eq!(event.job_id(), event.job().id);
        assert_eq!(event.attempts(), 0);
    }
}
