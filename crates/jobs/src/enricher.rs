//! Records the dispatching tenant in outgoing payloads.

use serde_json::{Map, Value};
use tracing::debug;

use tenantry_core::TenantDirectory;
use tenantry_queue::PayloadContext;

use crate::classifier::JobClassifier;

/// Reserved payload key holding the dispatching tenant's id.
///
/// Present means the job was tenant-aware when it was queued, even when the
/// value is `null` because no tenant was current at the time.
pub const TENANT_ID_KEY: &str = "tenantId";

/// Payload hook: `{ "tenantId": <current id or null> }` for tenant-aware jobs,
/// nothing for the rest.
#[derive(Debug, Clone)]
pub struct PayloadEnricher<D> {
    classifier: JobClassifier,
    directory: D,
}

impl<D: TenantDirectory> PayloadEnricher<D> {
    pub fn new(classifier: JobClassifier, directory: D) -> Self {
        Self {
            classifier,
            directory,
        }
    }

    pub fn extra_fields(&self, context: &PayloadContext<'_>) -> Map<String, Value> {
        let mut extra = Map::new();
        if !self.classifier.is_tenant_aware(context.job) {
            return extra;
        }

        let tenant_id = self.directory.current().map(|t| t.id());
        debug!(
            job_type = context.job.type_name(),
            queue = context.queue,
            tenant_id = ?tenant_id,
            "recording dispatching tenant"
        );
        extra.insert(
            TENANT_ID_KEY.to_string(),
            tenant_id.map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        extra
    }
}
