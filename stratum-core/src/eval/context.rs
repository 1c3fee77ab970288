//! Evaluation Context
//!
//! The shared, mutable state of one walk. Many vertices evaluate at once, so
//! every collection is a sharded concurrent map: writes to the same key are
//! serialized, writes to distinct keys proceed in parallel.
//!
//! Steps that read a resource, call a provider, and write the result back
//! hold the per-address lock from [`EvalContext::lock`] for the whole
//! sequence. The map shards themselves are never held across provider calls.
//!
//! # Lookups
//!
//! Interpolation resolves references relative to the module path of the
//! vertex being evaluated:
//!
//! - `var.x` reads root inputs, or for a nested module evaluates the
//!   caller's argument expression in the caller's scope, falling back to the
//!   declared default.
//! - `TYPE.NAME.ATTR` reads resource state (or, while planning, the pending
//!   diff).
//! - `module.M.OUT` reads the output value of the child module instance.
//!
//! Outside of apply, values that do not exist yet resolve to the unknown
//! sentinel instead of failing.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::{unknown, RawConfig, Reference};
use crate::error::EvalError;
use crate::graph::{ModulePath, ScopeTable};

use super::provider::{ProviderFactory, ResourceProvider};
use super::state::{Address, ResourceDiff, ResourceState, State};
use super::WalkOperation;

/// Shared state of a single walk.
pub struct EvalContext {
    operation: WalkOperation,
    variables: IndexMap<String, Value>,
    scopes: ScopeTable,
    factories: IndexMap<String, ProviderFactory>,
    providers: DashMap<Address, Arc<dyn ResourceProvider>>,
    provider_configs: DashMap<Address, Value>,
    states: DashMap<Address, ResourceState>,
    diffs: DashMap<Address, ResourceDiff>,
    outputs: DashMap<Address, Value>,
    locks: DashMap<Address, Arc<Mutex<()>>>,
}

impl EvalContext {
    /// Create an empty context for `operation` over the given module scopes.
    pub fn new(operation: WalkOperation, scopes: ScopeTable) -> Self {
        Self {
            operation,
            variables: IndexMap::new(),
            scopes,
            factories: IndexMap::new(),
            providers: DashMap::new(),
            provider_configs: DashMap::new(),
            states: DashMap::new(),
            diffs: DashMap::new(),
            outputs: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Set root input variables.
    pub fn with_variables(mut self, variables: IndexMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Seed resource states and outputs from a prior state.
    pub fn with_state(self, state: &State) -> Self {
        for module in &state.modules {
            for (name, resource) in &module.resources {
                self.states
                    .insert(Address::new(module.path.clone(), name.clone()), resource.clone());
            }
            for (name, value) in &module.outputs {
                self.outputs
                    .insert(Address::new(module.path.clone(), name.clone()), value.clone());
            }
        }
        self
    }

    /// Register a provider factory under a provider name.
    pub fn with_provider(mut self, name: impl Into<String>, factory: ProviderFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn with_providers(mut self, factories: IndexMap<String, ProviderFactory>) -> Self {
        self.factories.extend(factories);
        self
    }

    pub fn operation(&self) -> WalkOperation {
        self.operation
    }

    pub fn scopes(&self) -> &ScopeTable {
        &self.scopes
    }

    // Variables and interpolation

    /// Value of variable `name` in the module at `path`.
    pub fn variable(&self, path: &ModulePath, name: &str) -> Result<Value, EvalError> {
        if path.is_root() {
            if let Some(value) = self.variables.get(name) {
                return Ok(value.clone());
            }
        }

        if let Some(scope) = self.scopes.get(path) {
            if let (Some(argument), Some(parent)) = (scope.arguments.get(name), path.parent()) {
                return self.interpolate(&parent, argument);
            }
            if let Some(default) = scope.defaults.get(name) {
                return Ok(default.clone());
            }
        }

        Err(EvalError::MissingVariable {
            path: path.clone(),
            name: name.to_string(),
        })
    }

    /// Interpolate `raw` as seen from the module at `path`.
    pub fn interpolate(&self, path: &ModulePath, raw: &RawConfig) -> Result<Value, EvalError> {
        raw.interpolate(|reference| self.lookup(path, reference))
    }

    fn allows_unknown(&self) -> bool {
        self.operation != WalkOperation::Apply
    }

    fn lookup(&self, path: &ModulePath, reference: &Reference) -> Result<Value, EvalError> {
        let bad = |reason: &str| EvalError::BadReference {
            path: path.clone(),
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        match reference {
            Reference::Variable { name } => self.variable(path, name),
            Reference::Resource {
                kind,
                name,
                attribute,
            } => {
                let address = Address::new(path.clone(), format!("{kind}.{name}"));
                self.resource_attribute(&address, attribute)
                    .ok_or_else(|| bad("attribute is not available"))
            }
            Reference::Module { module, output } => {
                let address = Address::new(path.child(format!("module.{module}")), output.clone());
                match self.outputs.get(&address) {
                    Some(value) => Ok(value.clone()),
                    None if self.allows_unknown() => Ok(unknown()),
                    None => Err(bad("module output has not been computed")),
                }
            }
            Reference::Count { field } if field == "index" => Ok(Value::from(0)),
            Reference::Path { field } if field == "module" => Ok(Value::String(path.prefix())),
            Reference::Path { field } if field == "root" || field == "cwd" => {
                Ok(Value::String(".".to_string()))
            }
            Reference::SelfAttr { .. } => Err(bad("self is only valid inside provisioners")),
            _ => Err(bad("unsupported reference")),
        }
    }

    fn resource_attribute(&self, address: &Address, attribute: &str) -> Option<Value> {
        let planned = || {
            let diff = self.diffs.get(address)?;
            let change = diff.attributes.get(attribute)?;
            if change.computed {
                Some(unknown())
            } else {
                change.new.clone()
            }
        };

        if self.operation == WalkOperation::Plan {
            if let Some(value) = planned() {
                return Some(value);
            }
        }
        let recorded = self
            .states
            .get(address)
            .and_then(|state| state.attribute(attribute));
        if recorded.is_some() {
            return recorded;
        }
        if let Some(value) = planned() {
            return Some(value);
        }
        self.allows_unknown().then(unknown)
    }

    // Providers

    /// Instantiate the provider at `address` from the factory registered
    /// for `name`, or return the existing instance.
    pub fn init_provider(
        &self,
        address: &Address,
        name: &str,
    ) -> Result<Arc<dyn ResourceProvider>, EvalError> {
        if let Some(existing) = self.providers.get(address) {
            return Ok(Arc::clone(existing.value()));
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EvalError::UnknownProvider {
                name: name.to_string(),
            })?;
        let provider = factory().map_err(|source| EvalError::Provider {
            provider: name.to_string(),
            address: address.to_string(),
            source,
        })?;

        let handle = self.providers.entry(address.clone()).or_insert(provider);
        Ok(Arc::clone(handle.value()))
    }

    /// The initialized provider at `address`.
    pub fn provider(&self, address: &Address) -> Result<Arc<dyn ResourceProvider>, EvalError> {
        self.providers
            .get(address)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EvalError::ProviderNotInitialized {
                address: address.to_string(),
            })
    }

    pub fn set_provider_config(&self, address: &Address, config: Value) {
        self.provider_configs.insert(address.clone(), config);
    }

    pub fn provider_config(&self, address: &Address) -> Option<Value> {
        self.provider_configs.get(address).map(|entry| entry.value().clone())
    }

    // Resources

    /// Per-address lock serializing read-modify-write sequences.
    pub fn lock(&self, address: &Address) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(address.clone()).or_default().value())
    }

    pub fn resource_state(&self, address: &Address) -> Option<ResourceState> {
        self.states.get(address).map(|entry| entry.value().clone())
    }

    pub fn set_resource_state(&self, address: &Address, state: Option<ResourceState>) {
        match state {
            Some(state) => {
                self.states.insert(address.clone(), state);
            }
            None => {
                self.states.remove(address);
            }
        }
    }

    pub fn diff(&self, address: &Address) -> Option<ResourceDiff> {
        self.diffs.get(address).map(|entry| entry.value().clone())
    }

    pub fn set_diff(&self, address: &Address, diff: Option<ResourceDiff>) {
        match diff {
            Some(diff) => {
                self.diffs.insert(address.clone(), diff);
            }
            None => {
                self.diffs.remove(address);
            }
        }
    }

    // Outputs

    pub fn output(&self, path: &ModulePath, name: &str) -> Option<Value> {
        self.outputs
            .get(&Address::new(path.clone(), name))
            .map(|entry| entry.value().clone())
    }

    pub fn set_output(&self, address: &Address, value: Value) {
        self.outputs.insert(address.clone(), value);
    }

    pub fn remove_output(&self, address: &Address) {
        self.outputs.remove(address);
    }

    /// Output values of the module at `path`, sorted by name.
    pub fn outputs(&self, path: &ModulePath) -> IndexMap<String, Value> {
        let mut outputs: IndexMap<String, Value> = self
            .outputs
            .iter()
            .filter(|entry| &entry.key().path == path)
            .map(|entry| (entry.key().name.clone(), entry.value().clone()))
            .collect();
        outputs.sort_keys();
        outputs
    }

    // Extraction

    /// Snapshot of resource states and outputs, sorted by address.
    pub fn state(&self) -> State {
        let mut resources: Vec<(Address, ResourceState)> = self
            .states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        resources.sort_by(|a, b| a.0.cmp(&b.0));

        let mut outputs: Vec<(Address, Value)> = self
            .outputs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        outputs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut state = State::new();
        for (address, resource) in resources {
            state.set_resource(&address, resource);
        }
        for (address, value) in outputs {
            state.set_output(&address, value);
        }
        state
    }

    /// Pending diffs, sorted by address.
    pub fn diffs(&self) -> IndexMap<Address, ResourceDiff> {
        let mut diffs: IndexMap<Address, ResourceDiff> = self
            .diffs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        diffs.sort_keys();
        diffs
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("operation", &self.operation)
            .field("variables", &self.variables)
            .field("providers", &self.providers.len())
            .field("resources", &self.states.len())
            .field("diffs", &self.diffs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::is_unknown;
    use crate::eval::AttributeDiff;
    use crate::graph::ModuleScope;
    use serde_json::json;

    fn nested_scopes() -> (ScopeTable, ModulePath) {
        let child = ModulePath::root().child("module.web");
        let mut scopes = ScopeTable::new();
        scopes.insert(
            ModulePath::root(),
            ModuleScope {
                arguments: IndexMap::new(),
                defaults: IndexMap::from([("region".to_string(), json!("us-east-1"))]),
            },
        );
        scopes.insert(
            child.clone(),
            ModuleScope {
                arguments: IndexMap::from([(
                    "zone".to_string(),
                    RawConfig::new(json!("${var.region}a")),
                )]),
                defaults: IndexMap::from([("size".to_string(), json!("small"))]),
            },
        );
        (scopes, child)
    }

    #[test]
    fn module_variables_evaluate_in_parent_scope() {
        let (scopes, child) = nested_scopes();
        let ctx = EvalContext::new(WalkOperation::Apply, scopes);

        assert_eq!(ctx.variable(&child, "zone").unwrap(), json!("us-east-1a"));
        assert_eq!(ctx.variable(&child, "size").unwrap(), json!("small"));
        assert!(matches!(
            ctx.variable(&child, "missing"),
            Err(EvalError::MissingVariable { .. })
        ));
    }

    #[test]
    fn root_inputs_override_defaults() {
        let (scopes, child) = nested_scopes();
        let ctx = EvalContext::new(WalkOperation::Apply, scopes).with_variable("region", "eu-west-1");
        assert_eq!(ctx.variable(&child, "zone").unwrap(), json!("eu-west-1a"));
    }

    #[test]
    fn missing_resources_are_unknown_while_planning() {
        let raw = RawConfig::new(json!("${aws_instance.web.id}"));

        let plan = EvalContext::new(WalkOperation::Plan, ScopeTable::new());
        assert!(is_unknown(&plan.interpolate(&ModulePath::root(), &raw).unwrap()));

        let apply = EvalContext::new(WalkOperation::Apply, ScopeTable::new());
        assert!(matches!(
            apply.interpolate(&ModulePath::root(), &raw),
            Err(EvalError::BadReference { .. })
        ));
    }

    #[test]
    fn planned_values_are_visible_during_plan() {
        let address = Address::root("aws_instance.web");
        let ctx = EvalContext::new(WalkOperation::Plan, ScopeTable::new());
        let mut diff = ResourceDiff::default();
        diff.attributes.insert(
            "ami".to_string(),
            AttributeDiff {
                old: None,
                new: Some(json!("ami-2")),
                computed: false,
            },
        );
        ctx.set_resource_state(
            &address,
            Some(ResourceState::new("i-1").with_attribute("ami", "ami-1")),
        );
        ctx.set_diff(&address, Some(diff));

        let raw = RawConfig::new(json!("${aws_instance.web.ami}"));
        assert_eq!(
            ctx.interpolate(&ModulePath::root(), &raw).unwrap(),
            json!("ami-2")
        );
    }

    #[test]
    fn state_round_trips_through_context() {
        let address = Address::root("aws_vpc.main");
        let state = State::new().with_resource(&address, ResourceState::new("vpc-1"));
        let ctx = EvalContext::new(WalkOperation::Refresh, ScopeTable::new()).with_state(&state);

        assert_eq!(ctx.resource_state(&address).map(|r| r.id), Some("vpc-1".to_string()));
        assert_eq!(ctx.state(), state);
    }

    #[test]
    fn locks_are_shared_per_address() {
        let ctx = EvalContext::new(WalkOperation::Apply, ScopeTable::new());
        let a = ctx.lock(&Address::root("a.a"));
        let again = ctx.lock(&Address::root("a.a"));
        let b = ctx.lock(&Address::root("b.b"));
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
