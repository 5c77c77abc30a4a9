//! `tenantry-queue`: in-process job queue.
//!
//! ## Design
//!
//! - Jobs are serialized into JSON payloads at enqueue time
//! - Payload hooks can add fields to every outgoing payload
//! - Listeners run before a job body executes and before a failed job is retried
//! - Failed attempts are released with backoff; exhausted jobs go to a failed list
//!
//! ## Components
//!
//! - `Job` / `Queueable`: job abstraction (typed and object-safe views)
//! - `JobPayload`: the serialized form a worker sees
//! - `QueueManager`: push, payload hooks, listeners, retry of failed jobs
//! - `JobStore`: persistence for queued and failed jobs
//! - `Worker`: reserves and runs jobs

pub mod error;
pub mod events;
pub mod job;
pub mod manager;
pub mod payload;
pub mod store;
pub mod types;
pub mod worker;

pub use error::{JobStoreError, ListenerError, QueueError};
pub use events::{
    JobEvent, JobEventKind, JobExceptionOccurred, JobProcessing, JobRetryRequested, Listeners,
};
pub use job::{Job, JobRegistry, Queueable};
pub use manager::{PayloadContext, PayloadHook, QueueManager};
pub use payload::JobPayload;
pub use store::{InMemoryJobStore, JobStore};
pub use types::{BackoffStrategy, FailedJob, JobId, JobOutcome, QueuedJob, RetryPolicy};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerStats};
