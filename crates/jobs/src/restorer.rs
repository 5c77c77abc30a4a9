//! Restores the dispatching tenant before a job runs or is retried.

use serde_json::Value;
use tracing::{debug, error};

use tenantry_core::{Tenant, TenantDirectory, TenantId};
use tenantry_queue::JobEvent;

use crate::enricher::TENANT_ID_KEY;
use crate::error::{
    CurrentTenantCouldNotBeDeterminedInTenantAwareJob as Undetermined, RestoreError,
};

/// What the restorer did with the current tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restoration {
    /// The payload's tenant is current until the job finishes.
    Bound(TenantId),
    /// The job was not tenant-aware when queued; no tenant is current.
    Forgotten,
}

/// Listener body for the job-processing and retry-requested events.
#[derive(Debug, Clone)]
pub struct ContextRestorer<D> {
    directory: D,
}

/// Falsy ids mean "no id": `null`, `false`, zero, `"0"`, blank strings and
/// empty arrays.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s == "0"
        }
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

impl<D: TenantDirectory> ContextRestorer<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Bind the payload's tenant, or forget the current one if the payload
    /// carries no tenant key.
    ///
    /// The binding is handed to the event, so it lasts until the job body has
    /// finished. On an unresolvable tenant the job is deleted and no tenant is
    /// left current.
    pub fn bind_or_forget<E: JobEvent + ?Sized>(
        &self,
        event: &mut E,
    ) -> Result<Restoration, RestoreError> {
        if !event.payload().contains_key(TENANT_ID_KEY) {
            self.directory.forget_current();
            debug!(
                job_id = %event.job_id(),
                event = %event.kind(),
                "job not tenant-aware; current tenant forgotten"
            );
            return Ok(Restoration::Forgotten);
        }

        let tenant = match self.find_tenant(event) {
            Ok(tenant) => tenant,
            Err(e) => {
                self.directory.forget_current();
                return Err(e);
            }
        };

        let tenant_id = tenant.id();
        let scope = self.directory.make_current(tenant);
        event.hold(Box::new(scope));
        debug!(
            job_id = %event.job_id(),
            event = %event.kind(),
            tenant_id = %tenant_id,
            "tenant restored"
        );
        Ok(Restoration::Bound(tenant_id))
    }

    /// Resolve the tenant named by the payload, deleting the job if there is none.
    pub fn find_tenant<E: JobEvent + ?Sized>(&self, event: &mut E) -> Result<Tenant, RestoreError> {
        let value = event
            .payload()
            .get(TENANT_ID_KEY)
            .cloned()
            .unwrap_or(Value::Null);

        if is_unset(&value) {
            event.delete();
            let err = Undetermined::no_id_set(&*event);
            error!(job_id = %event.job_id(), error = %err, "tenant-aware job deleted");
            return Err(err.into());
        }

        let found = match TenantId::from_payload_value(&value) {
            Ok(id) => self
                .directory
                .find(&id)
                .map_err(|source| RestoreError::Directory {
                    job_id: event.job_id(),
                    source,
                })?,
            // An id that does not parse cannot name a tenant.
            Err(_) => None,
        };

        match found {
            Some(tenant) => Ok(tenant),
            None => {
                event.delete();
                let raw = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                let err = Undetermined::no_tenant_found(&*event, raw);
                error!(job_id = %event.job_id(), error = %err, "tenant-aware job deleted");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use tenantry_core::{DirectoryError, InMemoryTenantDirectory, current};
    use tenantry_queue::{
        FailedJob, JobId, JobPayload, JobProcessing, JobRetryRequested, QueuedJob,
    };

    struct Fixture {
        directory: Arc<InMemoryTenantDirectory>,
        restorer: ContextRestorer<Arc<InMemoryTenantDirectory>>,
        acme: Tenant,
    }

    fn fixture() -> Fixture {
        let directory = InMemoryTenantDirectory::arc();
        let acme = Tenant::new(TenantId::new(), "acme").unwrap();
        directory.insert(acme.clone()).unwrap();
        Fixture {
            restorer: ContextRestorer::new(directory.clone()),
            directory,
            acme,
        }
    }

    fn payload(tenant_id: Option<Value>) -> JobPayload {
        let mut payload = JobPayload::for_command(JobId::new(), "app.Report", "Report", json!({}));
        if let Some(value) = tenant_id {
            payload.insert(TENANT_ID_KEY, value);
        }
        payload
    }

    fn processing(payload: JobPayload) -> JobProcessing {
        let job = QueuedJob::new(JobId::new(), "memory", "default", &payload).unwrap();
        JobProcessing::new(job, payload)
    }

    fn retry_requested(payload: JobPayload) -> JobRetryRequested {
        let job = QueuedJob::new(JobId::new(), "memory", "default", &payload).unwrap();
        JobRetryRequested::new(FailedJob::new(job, "earlier failure"), payload)
    }

    #[test]
    fn binds_the_payload_tenant_for_the_life_of_the_event() {
        let f = fixture();
        let _isolation = current::isolate();
        current::forget();

        let mut event = processing(payload(Some(json!(f.acme.id().to_string()))));
        let restored = f.restorer.bind_or_forget(&mut event).unwrap();

        assert_eq!(restored, Restoration::Bound(f.acme.id()));
        assert_eq!(current::current_id(), Some(f.acme.id()));
        assert!(!event.is_deleted());

        drop(event);
        assert!(current::current().is_none());
    }

    #[test]
    fn forgets_the_current_tenant_when_the_key_is_absent() {
        let f = fixture();
        let _isolation = current::isolate();
        let _scope = current::bind(f.acme.clone());

        let mut event = processing(payload(None));
        let restored = f.restorer.bind_or_forget(&mut event).unwrap();

        assert_eq!(restored, Restoration::Forgotten);
        assert!(current::current().is_none());
        assert!(!event.is_deleted());
    }

    #[test]
    fn null_id_deletes_the_job() {
        let f = fixture();
        let _isolation = current::isolate();
        let _scope = current::bind(f.acme.clone());

        let mut event = processing(payload(Some(Value::Null)));
        let err = f.restorer.bind_or_forget(&mut event).unwrap_err();

        assert!(matches!(
            err,
            RestoreError::Undetermined(Undetermined::NoIdSet { .. })
        ));
        assert!(err.is_fatal());
        assert!(event.is_deleted());
        assert!(current::current().is_none());
    }

    #[test]
    fn falsy_ids_count_as_unset() {
        let f = fixture();
        let _isolation = current::isolate();

        for value in [
            json!(""),
            json!("  "),
            json!(false),
            json!(0),
            json!(0.0),
            json!("0"),
            json!([]),
        ] {
            let mut event = processing(payload(Some(value)));
            let err = f.restorer.bind_or_forget(&mut event).unwrap_err();
            assert!(matches!(
                err,
                RestoreError::Undetermined(Undetermined::NoIdSet { .. })
            ));
        }
    }

    #[test]
    fn unknown_id_deletes_the_job() {
        let f = fixture();
        let _isolation = current::isolate();
        let missing = TenantId::new();

        let mut event = processing(payload(Some(json!(missing.to_string()))));
        let err = f.restorer.bind_or_forget(&mut event).unwrap_err();

        match err {
            RestoreError::Undetermined(Undetermined::NoTenantFound {
                tenant_id,
                event: kind,
                ..
            }) => {
                assert_eq!(tenant_id, missing.to_string());
                assert_eq!(kind, tenantry_queue::JobEventKind::Processing);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(event.is_deleted());
    }

    #[test]
    fn truthy_non_ids_are_reported_as_not_found() {
        let f = fixture();
        let _isolation = current::isolate();

        for (value, raw) in [(json!(7), "7"), (json!(true), "true"), (json!("00"), "00")] {
            let mut event = processing(payload(Some(value)));
            let err = f.restorer.bind_or_forget(&mut event).unwrap_err();
            assert!(matches!(
                err,
                RestoreError::Undetermined(Undetermined::NoTenantFound { ref tenant_id, .. })
                    if tenant_id == raw
            ));
            assert!(event.is_deleted());
        }
    }

    #[test]
    fn malformed_id_is_reported_as_not_found() {
        let f = fixture();
        let _isolation = current::isolate();

        let mut event = processing(payload(Some(json!("unknown-id"))));
        let err = f.restorer.bind_or_forget(&mut event).unwrap_err();

        assert!(matches!(
            err,
            RestoreError::Undetermined(Undetermined::NoTenantFound { ref tenant_id, .. })
                if tenant_id == "unknown-id"
        ));
        assert!(event.is_deleted());
    }

    #[test]
    fn retry_requested_is_handled_the_same_way() {
        let f = fixture();
        let _isolation = current::isolate();
        current::forget();

        let mut event = retry_requested(payload(Some(json!(f.acme.id().to_string()))));
        assert_eq!(
            f.restorer.bind_or_forget(&mut event).unwrap(),
            Restoration::Bound(f.acme.id())
        );

        let mut event = retry_requested(payload(Some(Value::Null)));
        let err = f.restorer.bind_or_forget(&mut event).unwrap_err();
        assert!(matches!(
            err,
            RestoreError::Undetermined(Undetermined::NoIdSet {
                event: tenantry_queue::JobEventKind::RetryRequested,
                ..
            })
        ));
    }

    #[test]
    fn restoring_twice_gives_the_same_answer() {
        let f = fixture();
        let _isolation = current::isolate();
        let bound = payload(Some(json!(f.acme.id().to_string())));
        let broken = payload(Some(json!(TenantId::new().to_string())));

        for _ in 0..2 {
            let mut event = processing(bound.clone());
            assert_eq!(
                f.restorer.bind_or_forget(&mut event).unwrap(),
                Restoration::Bound(f.acme.id())
            );
        }

        let first = f.restorer.bind_or_forget(&mut processing(broken.clone())).unwrap_err();
        let second = f.restorer.bind_or_forget(&mut processing(broken)).unwrap_err();
        match (first, second) {
            (RestoreError::Undetermined(a), RestoreError::Undetermined(b)) => {
                assert!(matches!(a, Undetermined::NoTenantFound { .. }));
                assert!(matches!(b, Undetermined::NoTenantFound { .. }));
            }
            other => panic!("unexpected errors: {other:?}"),
        }
    }

    #[test]
    fn directory_outage_does_not_delete_the_job() {
        struct Down;

        impl TenantDirectory for Down {
            fn find(&self, _id: &TenantId) -> Result<Option<Tenant>, DirectoryError> {
                Err(DirectoryError::Unavailable("connection refused".into()))
            }
        }

        let _isolation = current::isolate();
        let restorer = ContextRestorer::new(Down);
        let mut event = processing(payload(Some(json!(TenantId::new().to_string()))));

        let err = restorer.bind_or_forget(&mut event).unwrap_err();

        assert!(matches!(err, RestoreError::Directory { .. }));
        assert!(!err.is_fatal());
        assert!(!event.is_deleted());
    }

    #[test]
    fn removed_tenants_are_not_restored() {
        let f = fixture();
        let _isolation = current::isolate();
        let payload = payload(Some(json!(f.acme.id().to_string())));
        f.directory.remove(&f.acme.id()).unwrap();

        let mut event = processing(payload);
        assert!(f.restorer.bind_or_forget(&mut event).is_err());
        assert!(event.is_deleted());
    }
}
