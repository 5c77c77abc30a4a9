//! Tenant directory: lookup by id plus access to the current tenant.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::current::{self, TenantBindingScope};
use crate::id::TenantId;
use crate::tenant::Tenant;

/// Directory lookup error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    #[error("tenant already exists: {0}")]
    AlreadyExists(TenantId),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Resolves tenant ids to tenant records.
///
/// Only `find` must be provided. The current-tenant operations default to the
/// thread-local slot in [`crate::current`].
pub trait TenantDirectory: Send + Sync {
    /// Look a tenant up by id. `Ok(None)` means the tenant does not exist.
    fn find(&self, id: &TenantId) -> Result<Option<Tenant>, DirectoryError>;

    /// The tenant bound to the calling thread.
    fn current(&self) -> Option<Tenant> {
        current::current()
    }

    /// Bind `tenant` as current until the returned scope is dropped.
    fn make_current(&self, tenant: Tenant) -> TenantBindingScope {
        current::bind(tenant)
    }

    /// Clear the current tenant of the calling thread.
    fn forget_current(&self) {
        current::forget();
    }
}

impl<D: TenantDirectory + ?Sized> TenantDirectory for Arc<D> {
    fn find(&self, id: &TenantId) -> Result<Option<Tenant>, DirectoryError> {
        (**self).find(id)
    }

    fn current(&self) -> Option<Tenant> {
        (**self).current()
    }

    fn make_current(&self, tenant: Tenant) -> TenantBindingScope {
        (**self).make_current(tenant)
    }

    fn forget_current(&self) {
        (**self).forget_current()
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a tenant. Fails if the id is taken.
    pub fn insert(&self, tenant: Tenant) -> Result<(), DirectoryError> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| DirectoryError::Unavailable("tenant map lock poisoned".into()))?;
        if tenants.contains_key(&tenant.id()) {
            return Err(DirectoryError::AlreadyExists(tenant.id()));
        }
        tenants.insert(tenant.id(), tenant);
        Ok(())
    }

    /// Remove a tenant, returning it if it existed.
    pub fn remove(&self, id: &TenantId) -> Result<Option<Tenant>, DirectoryError> {
        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| DirectoryError::Unavailable("tenant map lock poisoned".into()))?;
        Ok(tenants.remove(id))
    }

    pub fn len(&self) -> usize {
        self.tenants.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TenantDirectory for InMemoryTenantDirectory {
    fn find(&self, id: &TenantId) -> Result<Option<Tenant>, DirectoryError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| DirectoryError::Unavailable("tenant map lock poisoned".into()))?;
        Ok(tenants.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_registered_tenants() {
        let directory = InMemoryTenantDirectory::new();
        let acme = Tenant::new(TenantId::new(), "acme").unwrap();
        directory.insert(acme.clone()).unwrap();

        assert_eq!(directory.find(&acme.id()).unwrap(), Some(acme));
        assert_eq!(directory.find(&TenantId::new()).unwrap(), None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let directory = InMemoryTenantDirectory::new();
        let acme = Tenant::new(TenantId::new(), "acme").unwrap();
        directory.insert(acme.clone()).unwrap();

        assert!(matches!(
            directory.insert(acme.clone()),
            Err(DirectoryError::AlreadyExists(id)) if id == acme.id()
        ));
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn removed_tenants_are_no_longer_found() {
        let directory = InMemoryTenantDirectory::new();
        let acme = Tenant::new(TenantId::new(), "acme").unwrap();
        directory.insert(acme.clone()).unwrap();

        assert!(directory.remove(&acme.id()).unwrap().is_some());
        assert!(directory.find(&acme.id()).unwrap().is_none());
        assert!(directory.is_empty());
    }

    #[test]
    fn current_tenant_goes_through_the_thread_slot() {
        let directory = InMemoryTenantDirectory::arc();
        let acme = Tenant::new(TenantId::new(), "acme").unwrap();
        let _isolation = current::isolate();

        let scope = directory.make_current(acme.clone());
        assert_eq!(directory.current().map(|t| t.id()), Some(acme.id()));

        directory.forget_current();
        assert!(directory.current().is_none());
        drop(scope);
    }
}
