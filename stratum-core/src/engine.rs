//! Engine Facade
//!
//! Ties graph building and walking together. An [`Engine`] holds a root
//! module plus everything a walk needs (input variables, prior state,
//! provider factories, options) and exposes one entry point per operation.
//!
//! Every entry point builds a fresh graph, so the engine can be reused
//! across operations:
//!
//! ```rust,ignore
//! let engine = Engine::new(module)
//!     .with_variable("region", "us-east-1")
//!     .with_provider("aws", aws_factory);
//!
//! let plan = engine.plan().await?;
//! let applied = engine.apply().await?.into_result()?;
//! let state = applied.state();
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{Module, WalkOptions};
use crate::error::GraphResult;
use crate::eval::{EvalContext, ProviderFactory, State, WalkOperation};
use crate::graph::{Graph, GraphBuilder, ResolveMode};
use crate::walk::{WalkResult, Walker};

/// Entry point for running operations over a module tree.
pub struct Engine {
    module: Module,
    variables: IndexMap<String, Value>,
    state: State,
    providers: IndexMap<String, ProviderFactory>,
    options: WalkOptions,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(module: Module) -> Self {
        Self {
            module,
            variables: IndexMap::new(),
            state: State::new(),
            providers: IndexMap::new(),
            options: WalkOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: IndexMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Prior state; resources in it but not in configuration are orphans.
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Register the factory for provider `name` (the resource type prefix).
    pub fn with_provider(mut self, name: impl Into<String>, factory: ProviderFactory) -> Self {
        self.providers.insert(name.into(), factory);
        self
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Cancels every walk this engine runs from now on.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the flat graph used for `op`.
    ///
    /// Validation, and any walk with `validate_only` set, builds in partial
    /// mode so unresolved references show up as diagnostics.
    pub fn graph(&self, op: WalkOperation) -> GraphResult<Graph> {
        let mode = if op == WalkOperation::Validate || self.options.validate_only {
            ResolveMode::Partial
        } else {
            ResolveMode::Strict
        };
        GraphBuilder::new(&self.module)
            .with_state(&self.state)
            .with_mode(mode)
            .build()
    }

    pub async fn validate(&self) -> GraphResult<WalkResult> {
        self.run(WalkOperation::Validate).await
    }

    pub async fn refresh(&self) -> GraphResult<WalkResult> {
        self.run(WalkOperation::Refresh).await
    }

    pub async fn plan(&self) -> GraphResult<WalkResult> {
        self.run(WalkOperation::Plan).await
    }

    pub async fn apply(&self) -> GraphResult<WalkResult> {
        self.run(WalkOperation::Apply).await
    }

    pub async fn destroy(&self) -> GraphResult<WalkResult> {
        self.run(WalkOperation::Destroy).await
    }

    /// Build the graph for `op` and walk it.
    pub async fn run(&self, op: WalkOperation) -> GraphResult<WalkResult> {
        let graph = self.graph(op)?;
        for reference in graph.diagnostics() {
            tracing::warn!(%reference, operation = %op, "walking with unresolved reference");
        }

        let ctx = EvalContext::new(op, graph.scopes().clone())
            .with_variables(self.variables.clone())
            .with_state(&self.state)
            .with_providers(self.providers.clone());

        let walker = Walker::new(Arc::new(graph))
            .with_options(self.options.clone())
            .with_cancellation(self.cancel.clone());
        Ok(walker.walk(op, ctx).await)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("module", &self.module)
            .field("variables", &self.variables)
            .field("state", &self.state)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Output, Variable};
    use serde_json::json;

    fn module() -> Module {
        Module::new()
            .with_variable(Variable::new("x"))
            .with_output(Output::new("y", json!("${var.x}")))
    }

    #[test]
    fn validate_builds_in_partial_mode() {
        let engine = Engine::new(Module::new().with_output(Output::new("y", json!("${var.gone}"))));

        assert!(engine.graph(WalkOperation::Apply).is_err());
        let graph = engine.graph(WalkOperation::Validate).unwrap();
        assert_eq!(graph.diagnostics().len(), 1);
    }

    #[tokio::test]
    async fn apply_writes_outputs() {
        let engine = Engine::new(module()).with_variable("x", "hello");
        let ctx = engine.apply().await.unwrap().into_result().unwrap();

        assert_eq!(ctx.output(&crate::graph::ModulePath::root(), "y"), Some(json!("hello")));
    }

    #[tokio::test]
    async fn validate_reports_missing_variable() {
        let result = Engine::new(module()).validate().await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.failures[0].vertex, "var.x");
    }
}
