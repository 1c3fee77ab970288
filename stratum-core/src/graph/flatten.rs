//! Module Flattening
//!
//! Merges every nested module graph into one flat graph.
//!
//! # Algorithm
//!
//! Module calls are expanded depth-first. For a module call at path `P`
//! contributing segment `S`:
//!
//! 1. Every vertex of the module's graph is placed at `P ++ [S]`, which
//!    qualifies its name and the names it depends on.
//! 2. Edges inside the module's graph are copied between the placed
//!    vertices.
//! 3. The call is replaced by a [`ModuleBoundary`] depending on every
//!    vertex placed for the module, nested modules included.
//! 4. The module's scope (argument expressions and variable defaults) is
//!    recorded under `P ++ [S]`.
//!
//! Once every call is expanded, the flat graph is resolved again so that
//! edges crossing module boundaries (a parent reading a module output, a
//! module variable reading the parent) are wired by name.
//!
//! Flattening a graph without module calls yields the same vertices and
//! edges.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::vertex::{self, ModuleBoundary, Vertex};

use super::{resolve, Graph, ModulePath, ResolveMode, VertexId};

/// Produce the flat graph of `graph` and every module it calls.
pub fn flatten(graph: &Graph, mode: ResolveMode) -> GraphResult<Graph> {
    let mut flat = Graph::new();
    flat.scopes_mut().merge_at(&ModulePath::root(), graph.scopes());

    splice(&mut flat, graph, &ModulePath::root())?;
    resolve(&mut flat, mode)?;

    tracing::debug!(vertices = flat.len(), edges = flat.edges().len(), "flattened graph");
    Ok(flat)
}

/// Copy `graph` into `flat` at `prefix`; returns the names placed.
fn splice(flat: &mut Graph, graph: &Graph, prefix: &ModulePath) -> GraphResult<Vec<String>> {
    let mut placed: HashMap<VertexId, VertexId> = HashMap::new();
    let mut members: Vec<String> = Vec::new();

    for (id, v) in graph.vertices() {
        if let Some(module) = v.as_subgraph() {
            let path = prefix.child(module.segment());
            flat.scopes_mut().merge_at(&path, module.subgraph().scopes());

            let inner = splice(flat, module.subgraph(), &path)
                .map_err(|err| GraphError::in_module(path.prefix(), err))?;
            let boundary = ModuleBoundary::new(path, inner.clone());
            members.extend(inner);
            members.push(boundary.name().to_string());
            flat.add(Arc::new(boundary))?;
            continue;
        }

        let vertex = if prefix.is_root() {
            Arc::clone(v)
        } else {
            vertex::flatten(v.as_ref(), prefix)?
        };
        members.push(vertex.name().to_string());
        placed.insert(id, flat.add(vertex)?);
    }

    for (from, to) in graph.edges() {
        if let (Some(&from), Some(&to)) = (placed.get(&from), placed.get(&to)) {
            flat.connect(from, to);
        }
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Module, ModuleCall, Output, Resource, Variable};
    use crate::graph::build_module;
    use crate::vertex::{ModuleCallNode, OrphanNode, Scoped};
    use serde_json::json;

    fn child() -> Module {
        Module::new()
            .with_variable(Variable::new("ami"))
            .with_resource(Resource::new("aws_instance", "web", json!({"ami": "${var.ami}"})))
            .with_output(Output::new("ip", json!("${aws_instance.web.private_ip}")))
    }

    fn parent() -> Module {
        Module::new()
            .with_variable(Variable::new("ami").with_default("ami-1"))
            .with_module(ModuleCall::new("app", child()).with_argument("ami", json!("${var.ami}")))
            .with_output(Output::new("ip", json!("${module.app.ip}")))
    }

    #[test]
    fn module_vertices_are_qualified_and_rewired() {
        let graph = build_module(&parent(), None, ResolveMode::Strict).unwrap();
        let flat = flatten(&graph, ResolveMode::Strict).unwrap();

        assert_eq!(
            flat.names(),
            vec![
                "module.app",
                "module.app.aws_instance.web",
                "module.app.output.ip",
                "module.app.provider.aws",
                "module.app.var.ami",
                "output.ip",
                "var.ami",
            ]
        );
        assert!(flat.depends_on("output.ip", "module.app.output.ip"));
        assert!(flat.depends_on("module.app.var.ami", "var.ami"));
        assert!(flat.depends_on("module.app.aws_instance.web", "module.app.var.ami"));
        assert!(flat.depends_on("module.app", "module.app.aws_instance.web"));
        assert!(flat.scopes().get(&ModulePath::root().child("module.app")).is_some());
    }

    #[test]
    fn flattening_is_idempotent() {
        let graph = build_module(&parent(), None, ResolveMode::Strict).unwrap();
        let once = flatten(&graph, ResolveMode::Strict).unwrap();
        let twice = flatten(&once, ResolveMode::Strict).unwrap();

        assert_eq!(once.names(), twice.names());
        assert_eq!(once.edge_names(), twice.edge_names());
    }

    #[test]
    fn non_flattenable_vertex_inside_module_fails() {
        let mut inner = Graph::new();
        inner
            .add_vertex(Scoped::root(OrphanNode::from_state_name("aws_instance.old").unwrap()))
            .unwrap();

        let mut outer = Graph::new();
        outer
            .add_vertex(ModuleCallNode::new(
                ModuleCall::new("legacy", Module::new()),
                inner,
            ))
            .unwrap();

        let err = flatten(&outer, ResolveMode::Strict).unwrap_err();
        let GraphError::Module { module, source } = err else {
            panic!("expected a module error");
        };
        assert_eq!(module, "module.legacy");
        assert!(matches!(*source, GraphError::NotFlattenable { .. }));
    }

    #[test]
    fn nested_modules_flatten_depth_first() {
        let db = Module::new().with_output(Output::new("host", json!("db.local")));
        let app = Module::new()
            .with_module(ModuleCall::new("db", db))
            .with_output(Output::new("db", json!("${module.db.host}")));
        let root = Module::new().with_module(ModuleCall::new("app", app));

        let graph = build_module(&root, None, ResolveMode::Strict).unwrap();
        let flat = flatten(&graph, ResolveMode::Strict).unwrap();

        let boundary = flat
            .vertex(flat.find("module.app.module.db").unwrap())
            .unwrap();
        assert!(boundary.as_proxy().is_some());
        assert!(flat.depends_on("module.app.output.db", "module.app.module.db.output.host"));
        assert!(flat.depends_on("module.app", "module.app.module.db"));
        assert_eq!(
            flat.scopes().paths().cloned().collect::<Vec<_>>(),
            vec![
                ModulePath::root(),
                ModulePath::root().child("module.app"),
                ModulePath::root().child("module.app").child("module.db"),
            ]
        );
    }
}
