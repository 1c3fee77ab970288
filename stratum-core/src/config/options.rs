//! Walk Options
//!
//! Tunables for a single walk. Every field has a default, so partial JSON
//! documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the walk driver does when a vertex fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Skip every transitive dependent of a failed vertex; keep walking
    /// independent subtrees.
    #[default]
    Propagate,
    /// Treat a failed vertex as finished; its dependents still run.
    Continue,
    /// Stop dispatching new vertices after the first failure.
    FailFast,
}

/// Configuration for a walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkOptions {
    /// Maximum number of vertices evaluated at once.
    pub parallelism: usize,
    pub error_policy: ErrorPolicy,
    /// Build graphs in partial mode: unresolved references are recorded
    /// as diagnostics instead of failing the build.
    pub validate_only: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            parallelism: 10,
            error_policy: ErrorPolicy::Propagate,
            validate_only: false,
        }
    }
}

impl WalkOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Effective parallelism; never zero.
    pub fn parallelism(&self) -> usize {
        self.parallelism.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let options = WalkOptions::from_json(r#"{"error_policy": "fail_fast"}"#).unwrap();
        assert_eq!(options.error_policy, ErrorPolicy::FailFast);
        assert_eq!(options.parallelism, 10);
        assert!(!options.validate_only);
    }

    #[test]
    fn zero_parallelism_is_clamped() {
        let options = WalkOptions {
            parallelism: 0,
            ..WalkOptions::default()
        };
        assert_eq!(options.parallelism(), 1);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            WalkOptions::from_json("{"),
            Err(ConfigError::Options(_))
        ));
    }
}
