//! Decides which queued jobs need the dispatching tenant.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use tenantry_core::TenantAwareness;
use tenantry_queue::Queueable;

use crate::config::TenancyConfig;

/// Why a job was (or was not) classified as tenant-aware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantAwarenessClassification {
    ExplicitlyAware,
    ExplicitlyNotAware,
    ListedAware,
    ListedNotAware,
    DefaultPolicy(bool),
}

impl TenantAwarenessClassification {
    pub fn is_tenant_aware(self) -> bool {
        match self {
            Self::ExplicitlyAware | Self::ListedAware => true,
            Self::ExplicitlyNotAware | Self::ListedNotAware => false,
            Self::DefaultPolicy(aware) => aware,
        }
    }
}

/// Classify a job body. First matching rule wins:
/// explicit marker, then the aware list, then the not-aware list, then the default.
pub fn classify_body(
    awareness: TenantAwareness,
    in_aware_list: bool,
    in_not_aware_list: bool,
    default_policy: bool,
) -> TenantAwarenessClassification {
    use TenantAwarenessClassification::*;

    match awareness {
        TenantAwareness::Aware => ExplicitlyAware,
        TenantAwareness::NotAware => ExplicitlyNotAware,
        TenantAwareness::Unmarked if in_aware_list => ListedAware,
        TenantAwareness::Unmarked if in_not_aware_list => ListedNotAware,
        TenantAwareness::Unmarked => DefaultPolicy(default_policy),
    }
}

/// Classifier built from a [`TenancyConfig`].
#[derive(Debug, Clone)]
pub struct JobClassifier {
    tenant_aware_jobs: HashSet<String>,
    not_tenant_aware_jobs: HashSet<String>,
    default_policy: bool,
    queueable_to_job: HashMap<String, String>,
}

impl JobClassifier {
    pub fn new(config: &TenancyConfig) -> Self {
        Self {
            tenant_aware_jobs: config.tenant_aware_jobs.iter().cloned().collect(),
            not_tenant_aware_jobs: config.not_tenant_aware_jobs.iter().cloned().collect(),
            default_policy: config.queues_are_tenant_aware_by_default,
            queueable_to_job: config.queueable_to_job.clone(),
        }
    }

    /// The object classification rules apply to.
    ///
    /// Envelopes listed in `queueable_to_job` are unwrapped through the named
    /// member; everything else is its own job body.
    pub fn resolve_job<'a>(&self, queueable: &'a dyn Queueable) -> &'a dyn Queueable {
        let Some(member) = self.queueable_to_job.get(queueable.type_name()) else {
            return queueable;
        };

        match queueable.member(member) {
            Some(job) => job,
            None => {
                warn!(
                    envelope = queueable.type_name(),
                    member = %member,
                    "envelope does not expose the configured member; classifying the envelope"
                );
                queueable
            }
        }
    }

    pub fn classify(&self, queueable: &dyn Queueable) -> TenantAwarenessClassification {
        let job = self.resolve_job(queueable);
        let type_name = job.type_name();

        let classification = classify_body(
            job.tenant_awareness(),
            self.tenant_aware_jobs.contains(type_name),
            self.not_tenant_aware_jobs.contains(type_name),
            self.default_policy,
        );
        debug!(job_type = type_name, ?classification, "classified job");
        classification
    }

    pub fn is_tenant_aware(&self, queueable: &dyn Queueable) -> bool {
        self.classify(queueable).is_tenant_aware()
    }
}
