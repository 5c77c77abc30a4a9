//! Restoration failures.

use tenantry_core::DirectoryError;
use tenantry_queue::{JobEvent, JobEventKind, JobId};

/// A tenant-aware job whose tenant cannot be restored.
///
/// Both variants are fatal for the job: it is deleted before this is raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CurrentTenantCouldNotBeDeterminedInTenantAwareJob {
    #[error(
        "the current tenant could not be determined in job `{display_name}` ({job_id}) on {event}: the payload has no tenant id"
    )]
    NoIdSet {
        event: JobEventKind,
        job_id: JobId,
        display_name: String,
    },

    #[error(
        "the current tenant could not be determined in job `{display_name}` ({job_id}) on {event}: no tenant found for id `{tenant_id}`"
    )]
    NoTenantFound {
        event: JobEventKind,
        job_id: JobId,
        display_name: String,
        tenant_id: String,
    },
}

impl CurrentTenantCouldNotBeDeterminedInTenantAwareJob {
    pub fn no_id_set<E: JobEvent + ?Sized>(event: &E) -> Self {
        Self::NoIdSet {
            event: event.kind(),
            job_id: event.job_id(),
            display_name: event.display_name().to_string(),
        }
    }

    pub fn no_tenant_found<E: JobEvent + ?Sized>(event: &E, tenant_id: impl Into<String>) -> Self {
        Self::NoTenantFound {
            event: event.kind(),
            job_id: event.job_id(),
            display_name: event.display_name().to_string(),
            tenant_id: tenant_id.into(),
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            Self::NoIdSet { job_id, .. } | Self::NoTenantFound { job_id, .. } => *job_id,
        }
    }
}

/// Error returned by the restoration hooks.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error(transparent)]
    Undetermined(#[from] CurrentTenantCouldNotBeDeterminedInTenantAwareJob),

    /// The directory could not answer. The job is left to the normal retry path.
    #[error("tenant lookup failed for job {job_id}: {source}")]
    Directory {
        job_id: JobId,
        #[source]
        source: DirectoryError,
    },
}

impl RestoreError {
    /// Whether the job was deleted because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RestoreError::Undetermined(_))
    }
}
