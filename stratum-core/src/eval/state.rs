//! State and Diff Values
//!
//! Plain data exchanged with providers and extracted from a walk. How these
//! values are persisted is up to the caller.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::ModulePath;

/// Key of a resource, output, or provider within the module hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub path: ModulePath,
    pub name: String,
}

impl Address {
    pub fn new(path: ModulePath, name: impl Into<String>) -> Self {
        Self {
            path,
            name: name.into(),
        }
    }

    pub fn root(name: impl Into<String>) -> Self {
        Self::new(ModulePath::root(), name)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.qualify(&self.name))
    }
}

/// Recorded state of one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
    /// Dependency names recorded when the resource was last applied.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = names.into_iter().map(Into::into).collect();
        self
    }

    /// Look up an attribute; `id` falls back to the resource id.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match self.attributes.get(name) {
            Some(value) => Some(value.clone()),
            None if name == "id" => Some(Value::String(self.id.clone())),
            None => None,
        }
    }
}

/// Change to a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDiff {
    pub old: Option<Value>,
    pub new: Option<Value>,
    /// The new value is only known after apply.
    #[serde(default)]
    pub computed: bool,
}

/// Pending change to one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDiff {
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeDiff>,
    #[serde(default)]
    pub destroy: bool,
}

impl ResourceDiff {
    /// A diff that removes the resource.
    pub fn destroy() -> Self {
        Self {
            attributes: IndexMap::new(),
            destroy: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && !self.destroy
    }

    pub fn is_computed(&self, attribute: &str) -> bool {
        self.attributes
            .get(attribute)
            .map(|diff| diff.computed)
            .unwrap_or(false)
    }
}

/// State of one module instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub path: ModulePath,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceState>,
    #[serde(default)]
    pub outputs: IndexMap<String, Value>,
}

impl ModuleState {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

/// Recorded state of every module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub modules: Vec<ModuleState>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, path: &ModulePath) -> Option<&ModuleState> {
        self.modules.iter().find(|m| &m.path == path)
    }

    fn module_mut(&mut self, path: &ModulePath) -> &mut ModuleState {
        match self.modules.iter().position(|m| &m.path == path) {
            Some(index) => &mut self.modules[index],
            None => {
                self.modules.push(ModuleState {
                    path: path.clone(),
                    ..ModuleState::default()
                });
                let last = self.modules.len() - 1;
                &mut self.modules[last]
            }
        }
    }

    pub fn resource(&self, address: &Address) -> Option<&ResourceState> {
        self.module(&address.path)?.resources.get(&address.name)
    }

    pub fn set_resource(&mut self, address: &Address, state: ResourceState) {
        self.module_mut(&address.path)
            .resources
            .insert(address.name.clone(), state);
    }

    pub fn with_resource(mut self, address: &Address, state: ResourceState) -> Self {
        self.set_resource(address, state);
        self
    }

    pub fn output(&self, path: &ModulePath, name: &str) -> Option<&Value> {
        self.module(path)?.outputs.get(name)
    }

    pub fn set_output(&mut self, address: &Address, value: Value) {
        self.module_mut(&address.path)
            .outputs
            .insert(address.name.clone(), value);
    }

    /// Every recorded resource with its address.
    pub fn resources(&self) -> impl Iterator<Item = (Address, &ResourceState)> + '_ {
        self.modules.iter().flat_map(|module| {
            module
                .resources
                .iter()
                .map(move |(name, state)| (Address::new(module.path.clone(), name.clone()), state))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.modules.iter().all(ModuleState::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_attribute_falls_back_to_resource_id() {
        let state = ResourceState::new("i-123").with_attribute("ami", "ami-1");
        assert_eq!(state.attribute("id"), Some(json!("i-123")));
        assert_eq!(state.attribute("ami"), Some(json!("ami-1")));
        assert_eq!(state.attribute("missing"), None);
    }

    #[test]
    fn state_groups_resources_by_module() {
        let nested = ModulePath::root().child("module.net");
        let state = State::new()
            .with_resource(&Address::root("aws_vpc.main"), ResourceState::new("vpc-1"))
            .with_resource(
                &Address::new(nested.clone(), "aws_subnet.a"),
                ResourceState::new("subnet-1"),
            );

        assert_eq!(state.modules.len(), 2);
        assert_eq!(
            state
                .resource(&Address::new(nested, "aws_subnet.a"))
                .map(|r| r.id.as_str()),
            Some("subnet-1")
        );
        assert_eq!(state.resources().count(), 2);
    }

    #[test]
    fn empty_diff_has_no_changes() {
        assert!(ResourceDiff::default().is_empty());
        assert!(!ResourceDiff::destroy().is_empty());
    }
}
