//! Request-scoped feature settings.

use serde::{Deserialize, Serialize};

/// Feature toggles read by deprovisioner predicates.
///
/// Passed explicitly into every predicate call so that a cycle sees one
/// consistent set of values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Allow removing nodes the drift detector has marked.
    pub drift_enabled: bool,
}
