//! Tenant record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};
use crate::id::TenantId;

/// A tenant: an isolated customer/organization context.
///
/// Owned by a [`TenantDirectory`](crate::TenantDirectory); the current-tenant
/// slot only ever holds a clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    id: TenantId,
    name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes: Map<String, Value>,
}

impl Tenant {
    pub fn new(id: TenantId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("tenant name must not be empty"));
        }
        Ok(Self {
            id,
            name,
            attributes: Map::new(),
        })
    }

    /// Attach a descriptive attribute (domain, database name, plan, ...).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> TenantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Same tenant, regardless of descriptive attributes.
    pub fn same_identity_as(&self, other: &Tenant) -> bool {
        self.id == other.id
    }
}
