//! Queue errors.

use crate::types::JobId;

/// Error returned by event listeners.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors surfaced by the queue manager and worker.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] JobStoreError),

    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("payload is missing `{0}`")]
    MalformedPayload(&'static str),

    #[error("no job type registered as `{0}`")]
    UnknownJobType(String),

    #[error("failed job not found: {0}")]
    FailedJobNotFound(JobId),

    /// A retry-requested listener refused the retry.
    #[error("retry of job {id} rejected: {source}")]
    RetryRejected {
        id: JobId,
        #[source]
        source: ListenerError,
    },
}
