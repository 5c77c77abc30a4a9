//! Declared tenant awareness of a job body.

use serde::{Deserialize, Serialize};

/// What a job body says about itself.
///
/// `Aware` and `NotAware` are explicit markers and take precedence over any
/// configured job lists or default policy. `Unmarked` defers to configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantAwareness {
    /// Must run with the dispatching tenant bound.
    Aware,
    /// Must run with no tenant bound.
    NotAware,
    #[default]
    Unmarked,
}
