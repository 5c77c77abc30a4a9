//! The current-tenant slot.
//!
//! One slot per thread. Workers run one job at a time per thread, so a job
//! only ever observes the tenant bound for it. Binding returns a
//! [`TenantBindingScope`] guard that puts the previous value back when dropped,
//! including during unwinding.

use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::debug;

use crate::id::TenantId;
use crate::tenant::Tenant;

thread_local! {
    static CURRENT_TENANT: RefCell<Option<Tenant>> = const { RefCell::new(None) };
}

fn replace(next: Option<Tenant>) -> Option<Tenant> {
    CURRENT_TENANT.with(|slot| slot.replace(next))
}

/// The tenant bound to this thread, if any.
pub fn current() -> Option<Tenant> {
    CURRENT_TENANT.with(|slot| slot.borrow().clone())
}

/// Id of the tenant bound to this thread, if any.
pub fn current_id() -> Option<TenantId> {
    CURRENT_TENANT.with(|slot| slot.borrow().as_ref().map(Tenant::id))
}

/// Whether any tenant is bound to this thread.
pub fn is_bound() -> bool {
    CURRENT_TENANT.with(|slot| slot.borrow().is_some())
}

/// Bind `tenant` as current until the returned scope is dropped.
pub fn bind(tenant: Tenant) -> TenantBindingScope {
    debug!(tenant_id = %tenant.id(), "binding current tenant");
    let previous = replace(Some(tenant));
    TenantBindingScope::restoring(previous)
}

/// Clear the slot unconditionally. Returns whatever was bound.
pub fn forget() -> Option<Tenant> {
    let previous = replace(None);
    if let Some(tenant) = &previous {
        debug!(tenant_id = %tenant.id(), "forgot current tenant");
    }
    previous
}

/// Snapshot the slot; the returned scope restores the snapshot on drop.
///
/// Anything bound or forgotten while the scope is alive is undone when it
/// ends, so a worker can wrap each job in one.
pub fn isolate() -> TenantBindingScope {
    TenantBindingScope::restoring(current())
}

/// Run `f` with `tenant` bound, then restore the previous binding.
pub fn execute<R>(tenant: &Tenant, f: impl FnOnce(&Tenant) -> R) -> R {
    let _scope = bind(tenant.clone());
    f(tenant)
}

/// Guard returned by [`bind`] and [`isolate`].
///
/// Not `Send`: the slot it restores belongs to the thread that created it.
#[must_use = "dropping the scope immediately restores the previous tenant"]
#[derive(Debug)]
pub struct TenantBindingScope {
    previous: Option<Tenant>,
    _thread_bound: PhantomData<*const ()>,
}

impl TenantBindingScope {
    fn restoring(previous: Option<Tenant>) -> Self {
        Self {
            previous,
            _thread_bound: PhantomData,
        }
    }

    /// The binding that will be restored when this scope ends.
    pub fn previous(&self) -> Option<&Tenant> {
        self.previous.as_ref()
    }
}

impl Drop for TenantBindingScope {
    fn drop(&mut self) {
        // try_with: the thread-local may already be gone during thread teardown.
        let previous = self.previous.take();
        let _ = CURRENT_TENANT.try_with(|slot| slot.replace(previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(name: &str) -> Tenant {
        Tenant::new(TenantId::new(), name).unwrap()
    }

    #[test]
    fn slot_starts_empty() {
        std::thread::spawn(|| {
            assert!(current().is_none());
            assert!(!is_bound());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn bind_sets_and_drop_restores() {
        let _isolation = isolate();
        forget();

        let acme = tenant("acme");
        {
            let _scope = bind(acme.clone());
            assert_eq!(current_id(), Some(acme.id()));
        }
        assert!(current().is_none());
    }

    #[test]
    fn nested_binds_unwind_in_order() {
        let _isolation = isolate();
        forget();

        let outer = tenant("outer");
        let inner = tenant("inner");

        let outer_scope = bind(outer.clone());
        {
            let inner_scope = bind(inner.clone());
            assert_eq!(inner_scope.previous().map(Tenant::id), Some(outer.id()));
            assert_eq!(current_id(), Some(inner.id()));
        }
        assert_eq!(current_id(), Some(outer.id()));
        drop(outer_scope);
        assert!(current().is_none());
    }

    #[test]
    fn forget_clears_and_returns_previous() {
        let _isolation = isolate();
        let acme = tenant("acme");
        let _scope = bind(acme.clone());

        assert_eq!(forget().map(|t| t.id()), Some(acme.id()));
        assert!(!is_bound());
        assert!(forget().is_none());
    }

    #[test]
    fn isolate_undoes_changes_made_inside() {
        let _outer = isolate();
        let acme = tenant("acme");
        let _bound = bind(acme.clone());

        {
            let _job = isolate();
            forget();
            let other = tenant("other");
            std::mem::forget(bind(other));
        }

        assert_eq!(current_id(), Some(acme.id()));
    }

    #[test]
    fn execute_binds_only_for_the_closure() {
        let _isolation = isolate();
        forget();
        let acme = tenant("acme");

        let seen = execute(&acme, |t| {
            assert_eq!(current_id(), Some(t.id()));
            t.name().to_string()
        });

        assert_eq!(seen, "acme");
        assert!(current().is_none());
    }

    #[test]
    fn scope_restores_on_panic() {
        let _isolation = isolate();
        forget();
        let acme = tenant("acme");

        let result = std::panic::catch_unwind(|| {
            let _scope = bind(acme.clone());
            panic!("job blew up");
        });

        assert!(result.is_err());
        assert!(current().is_none());
    }

    #[test]
    fn slots_are_per_thread() {
        let _isolation = isolate();
        let acme = tenant("acme");
        let _scope = bind(acme);

        std::thread::spawn(|| assert!(current().is_none()))
            .join()
            .unwrap();
    }
}
