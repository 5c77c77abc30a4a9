//! `tenantry-core`: tenant identity and the current-tenant slot.
//!
//! This crate contains **pure tenancy** primitives (no queue concerns).

pub mod awareness;
pub mod current;
pub mod directory;
pub mod error;
pub mod id;
pub mod tenant;

pub use awareness::TenantAwareness;
pub use current::TenantBindingScope;
pub use directory::{DirectoryError, InMemoryTenantDirectory, TenantDirectory};
pub use error::{DomainError, DomainResult};
pub use id::TenantId;
pub use tenant::Tenant;
