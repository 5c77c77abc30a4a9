//! `tenantry-jobs`: carries the current tenant across queued jobs.
//!
//! At enqueue time tenant-aware jobs get the dispatching tenant's id in their
//! payload (`tenantId`). Before the job runs, and before a failed job is
//! retried, that id is read back and the tenant is bound again. Jobs queued
//! without the key run with no tenant bound. A key that names no tenant
//! deletes the job and raises
//! [`CurrentTenantCouldNotBeDeterminedInTenantAwareJob`].

pub mod action;
pub mod classifier;
pub mod config;
pub mod enricher;
pub mod error;
pub mod restorer;

pub use action::MakeQueueTenantAware;
pub use classifier::{JobClassifier, TenantAwarenessClassification, classify_body};
pub use config::{ConfigError, TenancyConfig};
pub use enricher::{PayloadEnricher, TENANT_ID_KEY};
pub use error::{CurrentTenantCouldNotBeDeterminedInTenantAwareJob, RestoreError};
pub use restorer::{ContextRestorer, Restoration};
