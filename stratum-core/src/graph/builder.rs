//! Graph Building
//!
//! A graph is built by running a fixed sequence of [`Transformer`]s over an
//! empty graph:
//!
//! 1. [`ConfigTransformer`]: one vertex per declaration; module calls get
//!    their own graph, built recursively in the module's scope
//! 2. [`MissingProviderTransformer`]: implicit providers for provider names
//!    resources use without declaring
//! 3. [`ResolveTransformer`]: edges from declared dependency names
//! 4. [`FlattenTransformer`]: merge module graphs, then resolve again
//! 5. [`OrphanTransformer`]: resources in prior state but not in
//!    configuration, at the module path they were recorded under; the
//!    flat graph is resolved once more afterwards
//! 6. [`RootTransformer`]: a single root vertex
//! 7. [`AcyclicTransformer`]: reject cycles
//!
//! Module graphs only run steps 1 to 3; flattening happens once, at the
//! top.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::config::{Module, RawConfig};
use crate::error::{GraphError, GraphResult};
use crate::eval::State;
use crate::vertex::{
    self, ModuleCallNode, OrphanNode, OutputNode, ProviderNode, ResourceNode, RootNode, Scoped,
    VariableNode,
};

use super::{
    flatten, resolve, Graph, ModulePath, ModuleScope, NameIndex, ResolveMode, VertexId,
};

/// One stage of graph building.
pub trait Transformer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn transform(&self, graph: &mut Graph) -> GraphResult<()>;
}

/// Builds the flat, rooted, acyclic graph of a root module.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'a> {
    module: &'a Module,
    state: Option<&'a State>,
    mode: ResolveMode,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(module: &'a Module) -> Self {
        Self {
            module,
            state: None,
            mode: ResolveMode::Strict,
        }
    }

    /// Prior state, used to find orphaned resources.
    pub fn with_state(mut self, state: &'a State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    fn transformers(&self) -> Vec<Box<dyn Transformer + 'a>> {
        let mut steps: Vec<Box<dyn Transformer + 'a>> = vec![Box::new(ConfigTransformer {
            module: self.module,
            arguments: None,
            mode: self.mode,
        })];
        steps.push(Box::new(MissingProviderTransformer));
        steps.push(Box::new(ResolveTransformer { mode: self.mode }));
        steps.push(Box::new(FlattenTransformer { mode: self.mode }));
        if let Some(state) = self.state {
            steps.push(Box::new(OrphanTransformer {
                module: self.module,
                state,
            }));
            steps.push(Box::new(ResolveTransformer { mode: self.mode }));
        }
        steps.push(Box::new(RootTransformer));
        steps.push(Box::new(AcyclicTransformer));
        steps
    }

    pub fn build(&self) -> GraphResult<Graph> {
        let mut graph = Graph::new();
        for step in self.transformers() {
            step.transform(&mut graph)?;
            tracing::debug!(
                transformer = step.name(),
                vertices = graph.len(),
                "applied transformer"
            );
        }
        Ok(graph)
    }
}

/// Build the unflattened graph of one module.
///
/// `arguments` are the caller's argument expressions when `module` is
/// called from another module.
pub fn build_module(
    module: &Module,
    arguments: Option<&IndexMap<String, RawConfig>>,
    mode: ResolveMode,
) -> GraphResult<Graph> {
    let mut graph = Graph::new();
    ConfigTransformer {
        module,
        arguments,
        mode,
    }
    .transform(&mut graph)?;
    MissingProviderTransformer.transform(&mut graph)?;
    ResolveTransformer { mode }.transform(&mut graph)?;
    Ok(graph)
}

/// Adds one vertex per declaration of a module.
#[derive(Debug, Clone, Copy)]
pub struct ConfigTransformer<'a> {
    pub module: &'a Module,
    pub arguments: Option<&'a IndexMap<String, RawConfig>>,
    pub mode: ResolveMode,
}

impl ConfigTransformer<'_> {
    fn check_syntax(&self) -> GraphResult<()> {
        let module = self.module;
        let configs = module
            .providers
            .iter()
            .map(|p| (format!("provider.{}", p.name), &p.config))
            .chain(module.resources.iter().map(|r| (r.id(), &r.config)))
            .chain(
                module
                    .outputs
                    .iter()
                    .map(|o| (format!("output.{}", o.name), &o.value)),
            )
            .chain(module.modules.iter().flat_map(|call| {
                call.arguments
                    .values()
                    .map(move |argument| (call.id(), argument))
            }));

        for (vertex, config) in configs {
            config
                .validate()
                .map_err(|source| GraphError::Config { vertex, source })?;
        }
        Ok(())
    }
}

impl Transformer for ConfigTransformer<'_> {
    fn name(&self) -> &'static str {
        "config"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        self.check_syntax()?;
        let module = self.module;

        graph.scopes_mut().insert(
            ModulePath::root(),
            ModuleScope {
                arguments: self.arguments.cloned().unwrap_or_default(),
                defaults: module.variable_defaults(),
            },
        );

        for variable in &module.variables {
            let argument = self
                .arguments
                .and_then(|arguments| arguments.get(&variable.name))
                .cloned();
            graph.add_vertex(Scoped::root(VariableNode::with_argument(
                variable.clone(),
                argument,
            )))?;
        }
        for provider in &module.providers {
            graph.add_vertex(Scoped::root(ProviderNode::new(provider.clone())))?;
        }
        for resource in &module.resources {
            graph.add_vertex(Scoped::root(ResourceNode::new(resource.clone())))?;
        }
        for output in &module.outputs {
            graph.add_vertex(Scoped::root(OutputNode::new(output.clone())))?;
        }
        for call in &module.modules {
            let child = build_module(&call.source, Some(&call.arguments), self.mode)
                .map_err(|err| GraphError::in_module(call.id(), err))?;
            graph.add_vertex(ModuleCallNode::new(call.clone(), child))?;
        }
        Ok(())
    }
}

/// Adds an orphan vertex for every resource in state that the
/// configuration no longer declares.
///
/// Runs on the flat graph. Each orphan is placed at the module path it was
/// recorded under, whether or not that module is still called, and gets
/// an implicit provider there if none exists. Recorded dependencies that
/// no longer match any vertex or orphan are dropped.
#[derive(Debug, Clone, Copy)]
pub struct OrphanTransformer<'a> {
    pub module: &'a Module,
    pub state: &'a State,
}

impl Transformer for OrphanTransformer<'_> {
    fn name(&self) -> &'static str {
        "orphan"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        let mut orphans: Vec<(ModulePath, String, OrphanNode, &[String])> = Vec::new();
        for recorded in &self.state.modules {
            let declared: HashSet<String> = module_at(self.module, &recorded.path)
                .map(|module| module.resources.iter().map(|r| r.id()).collect())
                .unwrap_or_default();

            for (name, resource) in &recorded.resources {
                if declared.contains(name) {
                    continue;
                }
                match OrphanNode::from_state_name(name) {
                    Some(orphan) => {
                        let qualified = recorded.path.qualify(name);
                        tracing::debug!(resource = %qualified, "orphaned resource");
                        orphans.push((
                            recorded.path.clone(),
                            qualified,
                            orphan,
                            resource.dependencies.as_slice(),
                        ));
                    }
                    None => tracing::warn!(resource = %name, "ignoring malformed state entry"),
                }
            }
        }
        if orphans.is_empty() {
            return Ok(());
        }

        let index = NameIndex::build(graph)?;
        let placed: HashSet<String> = self
            .state
            .modules
            .iter()
            .flat_map(|m| m.resources.keys().map(move |name| m.path.qualify(name)))
            .collect();

        for (path, qualified, orphan, recorded) in orphans {
            let mut dependencies: Vec<String> = Vec::new();
            for dependency in recorded {
                let known = placed.contains(dependency) || !index.lookup(dependency).is_empty();
                match path.localize(dependency) {
                    Some(local) if known => dependencies.push(local.to_string()),
                    _ => tracing::debug!(
                        orphan = %qualified,
                        %dependency,
                        "dropping stale recorded dependency"
                    ),
                }
            }

            let provider = path.qualify(&orphan.provider_vertex());
            if graph.find(&provider).is_none() {
                tracing::debug!(%provider, "adding implicit provider for orphans");
                graph.add_vertex(Scoped::new(
                    ProviderNode::implicit(orphan.provider()),
                    path.clone(),
                ))?;
            }
            graph.add_vertex(Scoped::new(orphan.with_dependencies(dependencies), path))?;
        }
        Ok(())
    }
}

/// The module declared at `path`, if the configuration still calls it.
fn module_at<'m>(root: &'m Module, path: &ModulePath) -> Option<&'m Module> {
    path.segments().iter().try_fold(root, |module, segment| {
        module
            .modules
            .iter()
            .find(|call| call.id() == *segment)
            .map(|call| call.source.as_ref())
    })
}

/// Adds an implicit provider for every `provider.NAME` dependency that no
/// vertex exposes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingProviderTransformer;

impl Transformer for MissingProviderTransformer {
    fn name(&self) -> &'static str {
        "missing_provider"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        let exposed: HashSet<String> = graph
            .vertices()
            .flat_map(|(_, v)| vertex::dependable_names(v.as_ref()))
            .collect();

        let mut missing: Vec<String> = Vec::new();
        for (_, v) in graph.vertices() {
            for dependency in vertex::dependencies(v.as_ref()) {
                let Some(provider) = dependency.strip_prefix("provider.") else {
                    continue;
                };
                if !exposed.contains(&dependency) && !missing.iter().any(|m| m == provider) {
                    missing.push(provider.to_string());
                }
            }
        }

        for provider in missing {
            tracing::debug!(%provider, "adding implicit provider");
            graph.add_vertex(Scoped::root(ProviderNode::implicit(provider)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveTransformer {
    pub mode: ResolveMode,
}

impl Transformer for ResolveTransformer {
    fn name(&self) -> &'static str {
        "resolve"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        resolve(graph, self.mode)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenTransformer {
    pub mode: ResolveMode,
}

impl Transformer for FlattenTransformer {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        *graph = flatten(graph, self.mode)?;
        Ok(())
    }
}

/// Adds the root vertex, depending on every vertex without dependents.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootTransformer;

impl Transformer for RootTransformer {
    fn name(&self) -> &'static str {
        "root"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        let sinks: Vec<VertexId> = graph
            .ids()
            .filter(|&id| graph.dependents(id).next().is_none())
            .collect();
        let root = graph.add_vertex(RootNode)?;
        for id in sinks {
            graph.connect(root, id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcyclicTransformer;

impl Transformer for AcyclicTransformer {
    fn name(&self) -> &'static str {
        "acyclic"
    }

    fn transform(&self, graph: &mut Graph) -> GraphResult<()> {
        graph.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleCall, Output, ProviderConfig, Resource, Variable};
    use crate::eval::{Address, ResourceState};
    use crate::vertex::ROOT_NAME;
    use serde_json::json;

    #[test]
    fn builds_rooted_graph() {
        let module = Module::new()
            .with_variable(Variable::new("x"))
            .with_output(Output::new("y", json!("${var.x}")));

        let graph = GraphBuilder::new(&module).build().unwrap();
        assert_eq!(graph.names(), vec!["output.y", "root", "var.x"]);
        assert_eq!(graph.dependency_names("output.y"), vec!["var.x"]);
        assert_eq!(graph.dependency_names(ROOT_NAME), vec!["output.y"]);
    }

    #[test]
    fn implicit_providers_fill_gaps() {
        let module = Module::new()
            .with_provider(ProviderConfig::new("aws", json!({})))
            .with_resource(Resource::new("aws_vpc", "main", json!({})))
            .with_resource(Resource::new("null_resource", "wait", json!({})));

        let graph = GraphBuilder::new(&module).build().unwrap();
        assert!(graph.find("provider.null").is_some());
        assert!(graph.depends_on("null_resource.wait", "provider.null"));
        assert!(graph.depends_on("aws_vpc.main", "provider.aws"));
    }

    #[test]
    fn state_without_config_becomes_orphans() {
        let module = Module::new().with_resource(Resource::new("aws_vpc", "main", json!({})));
        let state = State::new()
            .with_resource(&Address::root("aws_vpc.main"), ResourceState::new("vpc-1"))
            .with_resource(&Address::root("aws_subnet.old"), ResourceState::new("subnet-1"));

        let graph = GraphBuilder::new(&module).with_state(&state).build().unwrap();
        assert!(graph.find("aws_subnet.old").is_some());
        assert!(graph.depends_on("aws_subnet.old", "provider.aws"));
    }

    #[test]
    fn orphans_keep_recorded_dependencies() {
        let module = Module::new().with_resource(Resource::new("aws_vpc", "main", json!({})));
        let state = State::new()
            .with_resource(&Address::root("aws_vpc.main"), ResourceState::new("vpc-1"))
            .with_resource(
                &Address::root("aws_subnet.old"),
                ResourceState::new("subnet-1").with_dependencies(["aws_vpc.main"]),
            )
            .with_resource(
                &Address::root("aws_instance.old"),
                ResourceState::new("i-1")
                    .with_dependencies(["aws_subnet.old", "aws_eip.long_gone"]),
            );

        let graph = GraphBuilder::new(&module).with_state(&state).build().unwrap();
        assert_eq!(
            graph.dependency_names("aws_instance.old"),
            vec!["aws_subnet.old", "provider.aws"]
        );
        assert!(graph.depends_on("aws_subnet.old", "aws_vpc.main"));
        assert!(graph.diagnostics().is_empty());
    }

    #[test]
    fn orphans_are_found_in_kept_modules() {
        let child = Module::new().with_resource(Resource::new("aws_vpc", "main", json!({})));
        let module = Module::new().with_module(ModuleCall::new("net", child));
        let net = ModulePath::root().child("module.net");
        let state = State::new()
            .with_resource(&Address::new(net.clone(), "aws_vpc.main"), ResourceState::new("vpc-1"))
            .with_resource(
                &Address::new(net, "aws_subnet.old"),
                ResourceState::new("subnet-1").with_dependencies(["module.net.aws_vpc.main"]),
            );

        let graph = GraphBuilder::new(&module).with_state(&state).build().unwrap();
        assert!(graph.find("aws_subnet.old").is_none());
        assert!(graph.depends_on("module.net.aws_subnet.old", "module.net.aws_vpc.main"));
        assert!(graph.depends_on("module.net.aws_subnet.old", "module.net.provider.aws"));
    }

    #[test]
    fn removed_modules_orphan_every_resource() {
        let module = Module::new();
        let gone = ModulePath::root().child("module.gone");
        let state = State::new()
            .with_resource(&Address::new(gone.clone(), "aws_vpc.main"), ResourceState::new("vpc-1"))
            .with_resource(
                &Address::new(gone.clone(), "aws_subnet.a"),
                ResourceState::new("subnet-1").with_dependencies(["module.gone.aws_vpc.main"]),
            );

        let graph = GraphBuilder::new(&module).with_state(&state).build().unwrap();
        assert!(graph.find("module.gone.provider.aws").is_some());
        assert!(graph.depends_on("module.gone.aws_subnet.a", "module.gone.aws_vpc.main"));
        assert!(graph.depends_on("module.gone.aws_vpc.main", "module.gone.provider.aws"));
        assert_eq!(
            graph.names().iter().filter(|n| n.starts_with("module.gone.provider")).count(),
            1
        );
    }

    #[test]
    fn unresolved_references_fail_strict_builds() {
        let module = Module::new().with_output(Output::new("y", json!("${var.missing}")));

        assert!(matches!(
            GraphBuilder::new(&module).build(),
            Err(GraphError::UnresolvedReferences(_))
        ));

        let graph = GraphBuilder::new(&module)
            .with_mode(ResolveMode::Partial)
            .build()
            .unwrap();
        assert_eq!(graph.diagnostics().len(), 1);
    }

    #[test]
    fn child_errors_name_the_module() {
        let child = Module::new().with_output(Output::new("z", json!("${var.nope}")));
        let module = Module::new().with_module(ModuleCall::new("child", child));

        let err = GraphBuilder::new(&module).build().unwrap_err();
        let GraphError::Module { module, source } = err else {
            panic!("expected a module error");
        };
        assert_eq!(module, "module.child");
        assert!(matches!(*source, GraphError::UnresolvedReferences(_)));
    }

    #[test]
    fn malformed_interpolation_is_a_config_error() {
        let module = Module::new().with_output(Output::new("y", json!("${var.x")));
        assert!(matches!(
            GraphBuilder::new(&module).build(),
            Err(GraphError::Config { vertex, .. }) if vertex == "output.y"
        ));
    }
}
