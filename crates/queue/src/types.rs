//! Queue records and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::payload::JobPayload;

/// Unique job identifier (also written to the payload `uuid` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

tenantry_core::impl_uuid_newtype!(JobId, "JobId");

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// base * 2^(attempt-1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
}

/// How many times a job is tried and how long to wait in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, first one included (1 = never retried)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, failures go straight to the failed list.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before the attempt following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Whether a job that has made `attempts` attempts may run again.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// A job sitting in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub connection: String,
    pub queue: String,
    /// Serialized [`JobPayload`]
    pub payload: String,
    /// Attempts made so far (incremented on reservation)
    pub attempts: u32,
    pub reserved: bool,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(
        id: JobId,
        connection: impl Into<String>,
        queue: impl Into<String>,
        payload: &JobPayload,
    ) -> Result<Self, QueueError> {
        let now = Utc::now();
        Ok(Self {
            id,
            connection: connection.into(),
            queue: queue.into(),
            payload: payload.to_json()?,
            attempts: 0,
            reserved: false,
            available_at: now,
            created_at: now,
        })
    }

    /// Decode the stored payload.
    pub fn decode_payload(&self) -> Result<JobPayload, QueueError> {
        Ok(JobPayload::from_json(&self.payload)?)
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.reserved && self.available_at <= now
    }

    pub(crate) fn reserve(&mut self) {
        self.reserved = true;
        self.attempts += 1;
    }

    pub(crate) fn release(&mut self, delay: Duration) {
        self.reserved = false;
        self.available_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
    }
}

/// A job that exhausted its attempts (or failed permanently).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub id: JobId,
    pub connection: String,
    pub queue: String,
    pub payload: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedJob {
    pub fn new(job: QueuedJob, error: impl Into<String>) -> Self {
        Self {
            id: job.id,
            connection: job.connection,
            queue: job.queue,
            payload: job.payload,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }

    pub fn decode_payload(&self) -> Result<JobPayload, QueueError> {
        Ok(JobPayload::from_json(&self.payload)?)
    }
}

/// What happened to a job the worker picked up.
#[derive(Debug)]
pub enum JobOutcome {
    /// Body ran to completion, job removed
    Completed(JobId),
    /// Attempt failed, job back in the queue after `delay`
    Released { id: JobId, attempt: u32, delay: Duration },
    /// Attempts exhausted, moved to the failed list
    Failed { id: JobId, error: String },
    /// A listener or the body deleted the job; it will not run again
    Deleted { id: JobId, error: Option<String> },
}

impl JobOutcome {
    pub fn id(&self) -> JobId {
        match self {
            JobOutcome::Completed(id) => *id,
            JobOutcome::Released { id, .. }
            | JobOutcome::Failed { id, .. }
            | JobOutcome::Deleted { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobOutcome::Released { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            strategy: BackoffStrategy::Exponential,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
    }

    #[test]
    fn linear_and_fixed_backoff() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(300));

        let fixed = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(fixed.delay_for_attempt(1), fixed.delay_for_attempt(3));
    }

    #[test]
    fn should_retry_counts_the_first_attempt() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };

        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn reservation_counts_attempts() {
        let payload = JobPayload::new();
        let mut job = QueuedJob::new(JobId::new(), "memory", "default", &payload).unwrap();
        assert!(job.is_available(Utc::now()));

        job.reserve();
        assert_eq!(job.attempts, 1);
        assert!(!job.is_available(Utc::now()));

        job.release(Duration::ZERO);
        assert!(job.is_available(Utc::now()));
    }
}
