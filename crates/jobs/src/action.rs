//! Wires tenant propagation into a queue.

use std::sync::Arc;

use tracing::info;

use tenantry_core::TenantDirectory;
use tenantry_queue::{JobStore, QueueManager};

use crate::classifier::JobClassifier;
use crate::config::TenancyConfig;
use crate::enricher::PayloadEnricher;
use crate::restorer::ContextRestorer;

/// Makes every job on a queue carry and restore its dispatching tenant.
///
/// ```ignore
/// let mut queue = QueueManager::new("memory", InMemoryJobStore::arc());
/// MakeQueueTenantAware::new(TenancyConfig::from_env()?, directory).execute(&mut queue);
/// let queue = Arc::new(queue);
/// ```
#[derive(Debug, Clone)]
pub struct MakeQueueTenantAware<D> {
    config: TenancyConfig,
    directory: D,
}

impl<D> MakeQueueTenantAware<D>
where
    D: TenantDirectory + Clone + 'static,
{
    pub fn new(config: TenancyConfig, directory: D) -> Self {
        Self { config, directory }
    }

    /// Install the payload hook and both restoration listeners.
    pub fn execute<S: JobStore>(self, queue: &mut QueueManager<S>) {
        self.listen_for_jobs_being_queued(queue)
            .listen_for_jobs_being_processed(queue)
            .listen_for_jobs_retry_requested(queue);

        info!(
            connection = queue.connection(),
            default_tenant_aware = self.config.queues_are_tenant_aware_by_default,
            "queue made tenant aware"
        );
    }

    fn listen_for_jobs_being_queued<S: JobStore>(&self, queue: &mut QueueManager<S>) -> &Self {
        let enricher = Arc::new(PayloadEnricher::new(
            JobClassifier::new(&self.config),
            self.directory.clone(),
        ));
        queue.create_payload_using(move |context| enricher.extra_fields(context));
        self
    }

    fn listen_for_jobs_being_processed<S: JobStore>(&self, queue: &mut QueueManager<S>) -> &Self {
        let restorer = ContextRestorer::new(self.directory.clone());
        queue.on_job_processing(move |event| {
            restorer.bind_or_forget(event)?;
            Ok(())
        });
        self
    }

    fn listen_for_jobs_retry_requested<S: JobStore>(&self, queue: &mut QueueManager<S>) -> &Self {
        let restorer = ContextRestorer::new(self.directory.clone());
        queue.on_job_retry_requested(move |event| {
            restorer.bind_or_forget(event)?;
            Ok(())
        });
        self
    }
}
