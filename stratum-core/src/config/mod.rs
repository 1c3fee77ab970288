//! Configuration Declarations
//!
//! Already-parsed declarations the graph is built from. The engine only
//! needs each declaration's name and the references embedded in its raw
//! configuration; everything else is carried through to evaluation.
//!
//! All declarations deserialize with `serde`, so a module tree can be loaded
//! from JSON:
//!
//! ```rust,ignore
//! let module: Module = serde_json::from_str(r#"{
//!     "variables": [{"name": "region", "default": "us-east-1"}],
//!     "outputs": [{"name": "region", "value": "${var.region}"}]
//! }"#)?;
//! ```

mod options;
mod raw;

pub use options::{ErrorPolicy, WalkOptions};
pub use raw::{is_unknown, unknown, RawConfig, Reference, UNKNOWN_VALUE};

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A module: the unit of configuration the graph is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Module {
    pub variables: Vec<Variable>,
    pub providers: Vec<ProviderConfig>,
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
    pub modules: Vec<ModuleCall>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_module(mut self, call: ModuleCall) -> Self {
        self.modules.push(call);
        self
    }

    /// Defaults of every variable that declares one.
    pub fn variable_defaults(&self) -> IndexMap<String, Value> {
        self.variables
            .iter()
            .filter_map(|v| v.default.clone().map(|d| (v.name.clone(), d)))
            .collect()
    }
}

/// An input variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// A variable without a default must be supplied.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A provider configuration block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub config: RawConfig,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, config: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            config: RawConfig::new(config),
        }
    }
}

/// A managed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub config: RawConfig,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Explicit provider name; derived from the type prefix when absent.
    #[serde(default)]
    pub provider: Option<String>,
}

impl Resource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, config: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            config: RawConfig::new(config),
            depends_on: Vec::new(),
            provider: None,
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// `TYPE.NAME`
    pub fn id(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    pub fn provider_name(&self) -> String {
        match &self.provider {
            Some(name) => name.clone(),
            None => provider_for_type(&self.kind),
        }
    }
}

/// Provider name implied by a resource type: the text before the first `_`.
pub fn provider_for_type(kind: &str) -> String {
    match kind.split_once('_') {
        Some((prefix, _)) => prefix.to_string(),
        None => kind.to_string(),
    }
}

/// A module output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    #[serde(default)]
    pub value: RawConfig,
}

impl Output {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: RawConfig::new(value),
        }
    }
}

/// A call to a nested module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCall {
    pub name: String,
    pub source: Arc<Module>,
    /// Values for the module's variables, evaluated in the calling module.
    #[serde(default)]
    pub arguments: IndexMap<String, RawConfig>,
}

impl ModuleCall {
    pub fn new(name: impl Into<String>, source: Module) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source),
            arguments: IndexMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), RawConfig::new(value));
        self
    }

    /// `module.NAME`
    pub fn id(&self) -> String {
        format!("module.{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_name_comes_from_type_prefix() {
        let resource = Resource::new("aws_instance", "web", json!({}));
        assert_eq!(resource.id(), "aws_instance.web");
        assert_eq!(resource.provider_name(), "aws");
        assert_eq!(provider_for_type("null"), "null");
    }

    #[test]
    fn module_deserializes_from_json() {
        let module: Module = serde_json::from_value(json!({
            "variables": [{"name": "region", "default": "us-east-1"}],
            "resources": [{"type": "aws_vpc", "name": "main", "config": {"cidr": "10.0.0.0/16"}}],
            "outputs": [{"name": "vpc", "value": "${aws_vpc.main.id}"}],
            "modules": [{"name": "net", "source": {}, "arguments": {"region": "${var.region}"}}]
        }))
        .unwrap();

        assert_eq!(module.variables[0].default, Some(json!("us-east-1")));
        assert_eq!(module.resources[0].id(), "aws_vpc.main");
        assert_eq!(module.outputs[0].value.dependency_names(), vec!["aws_vpc.main"]);
        assert_eq!(module.modules[0].id(), "module.net");
        assert_eq!(
            module.variable_defaults().get("region"),
            Some(&json!("us-east-1"))
        );
    }
}
