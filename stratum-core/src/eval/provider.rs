//! Provider Interface
//!
//! Providers perform the actual side effects of a walk. The engine treats
//! them as opaque: every call is keyed by resource type and receives plain
//! values. Calls are synchronous; the walk driver runs each vertex on the
//! blocking pool so provider latency never stalls the dispatcher.

use std::sync::Arc;

use serde_json::Value;

use crate::config::is_unknown;
use crate::error::ProviderError;

use super::state::{AttributeDiff, ResourceDiff, ResourceState};

/// A resource provider.
pub trait ResourceProvider: Send + Sync {
    /// Check a provider configuration before it is interpolated.
    fn validate(&self, _config: &Value) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource configuration before it is interpolated.
    fn validate_resource(&self, _kind: &str, _config: &Value) -> Result<(), ProviderError> {
        Ok(())
    }

    fn configure(&self, config: &Value) -> Result<(), ProviderError>;

    /// Read the live state of a resource; `None` means it no longer exists.
    fn refresh(
        &self,
        kind: &str,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError>;

    /// Compare recorded state with interpolated configuration.
    fn diff(
        &self,
        _kind: &str,
        state: Option<&ResourceState>,
        config: &Value,
    ) -> Result<ResourceDiff, ProviderError> {
        Ok(diff_attributes(state, config))
    }

    /// Apply a diff; `None` means the resource was destroyed.
    fn apply(
        &self,
        kind: &str,
        state: Option<&ResourceState>,
        diff: &ResourceDiff,
    ) -> Result<Option<ResourceState>, ProviderError>;
}

/// Creates a fresh provider instance for each provider vertex.
pub type ProviderFactory =
    Arc<dyn Fn() -> Result<Arc<dyn ResourceProvider>, ProviderError> + Send + Sync>;

/// Attribute-by-attribute diff of an object configuration against state.
///
/// A resource without state gets a computed `id`. Unknown configuration
/// values produce computed attribute diffs.
pub fn diff_attributes(state: Option<&ResourceState>, config: &Value) -> ResourceDiff {
    let mut diff = ResourceDiff::default();

    if let Value::Object(map) = config {
        for (name, new) in map {
            let old = state.and_then(|s| s.attributes.get(name)).cloned();
            if old.as_ref() == Some(new) {
                continue;
            }
            let computed = is_unknown(new);
            diff.attributes.insert(
                name.clone(),
                AttributeDiff {
                    old,
                    new: if computed { None } else { Some(new.clone()) },
                    computed,
                },
            );
        }
    }

    if state.is_none() {
        diff.attributes.insert(
            "id".to_string(),
            AttributeDiff {
                old: None,
                new: None,
                computed: true,
            },
        );
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::unknown;
    use serde_json::json;

    #[test]
    fn new_resource_has_computed_id() {
        let diff = diff_attributes(None, &json!({"ami": "ami-1"}));
        assert!(diff.is_computed("id"));
        assert_eq!(diff.attributes["ami"].new, Some(json!("ami-1")));
    }

    #[test]
    fn unchanged_attributes_are_omitted() {
        let state = ResourceState::new("i-1").with_attribute("ami", "ami-1");
        let diff = diff_attributes(Some(&state), &json!({"ami": "ami-1"}));
        assert!(diff.is_empty());
    }

    #[test]
    fn unknown_config_values_are_computed() {
        let state = ResourceState::new("i-1").with_attribute("subnet", "s-1");
        let diff = diff_attributes(Some(&state), &json!({"subnet": unknown()}));
        assert!(diff.is_computed("subnet"));
        assert_eq!(diff.attributes["subnet"].old, Some(json!("s-1")));
    }
}
