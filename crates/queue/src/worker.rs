//! Queue worker: reserves jobs, fires listeners, runs bodies, retries.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use tenantry_core::current;

use crate::error::QueueError;
use crate::events::{JobEvent, JobExceptionOccurred, JobProcessing};
use crate::manager::QueueManager;
use crate::store::JobStore;
use crate::types::{JobOutcome, QueuedJob, RetryPolicy};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to consume
    pub queue: String,
    /// How often to poll when the queue is empty
    pub poll_interval: Duration,
    /// Name for logging (and the thread name)
    pub name: String,
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "default".to_string(),
            poll_interval: Duration::from_millis(100),
            name: "queue-worker".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_released: u64,
    pub jobs_failed: u64,
    pub jobs_deleted: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: &JobOutcome) {
        self.jobs_processed += 1;
        match outcome {
            JobOutcome::Completed(_) => self.jobs_completed += 1,
            JobOutcome::Released { .. } => self.jobs_released += 1,
            JobOutcome::Failed { .. } => self.jobs_failed += 1,
            JobOutcome::Deleted { .. } => self.jobs_deleted += 1,
        }
    }
}

/// Handle to control a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the current job to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(Err(payload)) = self.join.take().map(|j| j.join()) {
            error!(panic = %panic_message(&*payload), "queue worker thread panicked");
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Processes jobs from one queue, one at a time.
///
/// Every job runs inside a tenant isolation scope: whatever a listener or the
/// job body binds as current tenant is undone once the job is finished.
pub struct Worker<S: JobStore> {
    manager: Arc<QueueManager<S>>,
    config: WorkerConfig,
}

impl<S: JobStore + 'static> Worker<S> {
    pub fn new(manager: Arc<QueueManager<S>>, config: WorkerConfig) -> Self {
        Self { manager, config }
    }

    /// Process the next available job, if any (`queue:work --once`).
    pub fn run_next(&self) -> Result<Option<JobOutcome>, QueueError> {
        match self.manager.store().reserve_next(&self.config.queue)? {
            Some(job) => self.process(job).map(Some),
            None => Ok(None),
        }
    }

    /// Process jobs until the queue is empty. Jobs released with a delay are
    /// not waited for.
    pub fn run_until_empty(&self) -> Result<Vec<JobOutcome>, QueueError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next()? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Spawn the worker loop on its own thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || worker_loop(self, shutdown_rx, stats_clone))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    fn process(&self, job: QueuedJob) -> Result<JobOutcome, QueueError> {
        let _isolation = current::isolate();
        let store = self.manager.store();

        let payload = match job.decode_payload() {
            Ok(payload) => payload,
            Err(e) => {
                // Undecodable payloads never get better; fail without retrying.
                let error = e.to_string();
                store.fail(job.id, error.clone())?;
                return Ok(JobOutcome::Failed { id: job.id, error });
            }
        };

        let mut event = JobProcessing::new(job.clone(), payload);
        if let Err(e) = self.manager.listeners().processing(&mut event) {
            let deleted = event.is_deleted();
            return self.handle_failure(&job, event.display_name(), deleted, e.to_string());
        }
        if event.is_deleted() {
            store.delete(job.id)?;
            return Ok(JobOutcome::Deleted {
                id: job.id,
                error: None,
            });
        }

        let command = match self.manager.registry().decode(event.payload()) {
            Ok(command) => command,
            Err(e) => {
                let error = e.to_string();
                error!(job_id = %job.id, error = %error, "cannot decode job");
                store.fail(job.id, error.clone())?;
                return Ok(JobOutcome::Failed { id: job.id, error });
            }
        };

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| command.handle())).unwrap_or_else(
            |payload| Err(anyhow::anyhow!("job panicked: {}", panic_message(&*payload))),
        );
        let display_name = event.display_name().to_string();
        // Guards held by listeners end with the job body.
        drop(event);

        match result {
            Ok(()) => {
                store.delete(job.id)?;
                debug!(
                    job_id = %job.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                Ok(JobOutcome::Completed(job.id))
            }
            Err(e) => self.handle_failure(&job, &display_name, false, format!("{e:#}")),
        }
    }

    fn handle_failure(
        &self,
        job: &QueuedJob,
        display_name: &str,
        deleted: bool,
        error: String,
    ) -> Result<JobOutcome, QueueError> {
        let store = self.manager.store();
        self.manager.listeners().exception(&JobExceptionOccurred {
            connection: job.connection.clone(),
            job_id: job.id,
            display_name: display_name.to_string(),
            error: error.clone(),
            deleted,
        });

        if deleted {
            error!(
                job_id = %job.id,
                job = display_name,
                error = %error,
                "job deleted after failure"
            );
            store.delete(job.id)?;
            return Ok(JobOutcome::Deleted {
                id: job.id,
                error: Some(error),
            });
        }

        let policy = &self.config.retry_policy;
        if policy.should_retry(job.attempts) {
            let delay = policy.delay_for_attempt(job.attempts);
            warn!(
                job_id = %job.id,
                attempt = job.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "job attempt failed; releasing"
            );
            store.release(job.id, delay)?;
            Ok(JobOutcome::Released {
                id: job.id,
                attempt: job.attempts,
                delay,
            })
        } else {
            error!(job_id = %job.id, attempts = job.attempts, error = %error, "job failed");
            store.fail(job.id, error.clone())?;
            Ok(JobOutcome::Failed { id: job.id, error })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn worker_loop<S: JobStore + 'static>(
    worker: Worker<S>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    let name = worker.config.name.clone();
    info!(worker = %name, queue = %worker.config.queue, "queue worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match worker.run_next() {
            Ok(Some(outcome)) => {
                if let Ok(mut s) = stats.lock() {
                    s.record(&outcome);
                }
            }
            Ok(None) => thread::sleep(worker.config.poll_interval),
            Err(e) => {
                error!(worker = %name, error = %e, "failed to process job");
                thread::sleep(worker.config.poll_interval);
            }
        }
    }

    info!(worker = %name, "queue worker stopped");
}
