//! Dependency Graph
//!
//! This module implements the graph of vertices a walk runs over, and the
//! pipeline that builds it from configuration.
//!
//! # Overview
//!
//! The graph is a directed graph where:
//!
//! - Vertices are work items (resources, variables, providers, outputs,
//!   modules), each with a unique name
//! - Edges point from a vertex to a dependency: `a -> b` means `a` reads
//!   something `b` produces
//!
//! Edges are never added by hand during a build: vertices declare the names
//! they depend on and the resolver ([`resolve`]) wires them. Nested modules
//! are built as separate graphs and merged by the flattener ([`flatten`]).
//!
//! # Walk Order
//!
//! Creation-oriented walks run dependencies first. Destroy walks mostly run
//! the other way around; [`Graph::edge_order`] decides per edge.

mod builder;
mod dag;
mod dot;
mod flatten;
mod path;
mod resolve;
mod scope;

pub use builder::{
    build_module, AcyclicTransformer, ConfigTransformer, FlattenTransformer, GraphBuilder,
    MissingProviderTransformer, OrphanTransformer, ResolveTransformer, RootTransformer,
    Transformer,
};
pub use dag::{Dag, EdgeOrder, Schedule, VertexId};
pub use dot::{DotNode, DotOpts};
pub use flatten::flatten;
pub use path::{ModulePath, SEPARATOR};
pub use resolve::{resolve, NameIndex, ResolveMode};
pub use scope::{ModuleScope, ScopeTable};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult, UnresolvedReference};
use crate::eval::WalkOperation;
use crate::vertex::{self, Vertex};

/// A graph of named vertices.
#[derive(Debug, Default)]
pub struct Graph {
    dag: Dag<Arc<dyn Vertex>>,
    names: HashMap<String, VertexId>,
    scopes: ScopeTable,
    diagnostics: Vec<UnresolvedReference>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex; its name must not already be taken.
    pub fn add(&mut self, vertex: Arc<dyn Vertex>) -> GraphResult<VertexId> {
        let name = vertex.name().to_string();
        if self.names.contains_key(&name) {
            return Err(GraphError::NameCollision {
                first: name.clone(),
                second: name.clone(),
                name,
            });
        }
        let id = self.dag.add_vertex(vertex);
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn add_vertex(&mut self, vertex: impl Vertex + 'static) -> GraphResult<VertexId> {
        self.add(Arc::new(vertex))
    }

    /// Remove a vertex and every edge touching it.
    pub fn remove(&mut self, id: VertexId) -> Option<Arc<dyn Vertex>> {
        let vertex = self.dag.remove_vertex(id)?;
        self.names.remove(vertex.name());
        Some(vertex)
    }

    /// Find a vertex by name.
    pub fn find(&self, name: &str) -> Option<VertexId> {
        self.names.get(name).copied()
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Arc<dyn Vertex>> {
        self.dag.get(id)
    }

    /// Iterate over all vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Arc<dyn Vertex>)> + '_ {
        self.dag.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.dag.ids()
    }

    /// Name of a vertex; empty for unknown ids.
    pub fn name(&self, id: VertexId) -> &str {
        self.dag.get(id).map_or("", |vertex| vertex.name())
    }

    /// All vertex names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.dag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Add an edge `vertex -> dependency`. Returns `false` if it existed.
    pub fn connect(&mut self, vertex: VertexId, dependency: VertexId) -> bool {
        self.dag.connect(vertex, dependency)
    }

    pub fn disconnect(&mut self, vertex: VertexId, dependency: VertexId) {
        self.dag.disconnect(vertex, dependency);
    }

    pub fn dependencies(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.dag.dependencies(id)
    }

    pub fn dependents(&self, id: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.dag.dependents(id)
    }

    /// Every edge as `(vertex, dependency)`.
    pub fn edges(&self) -> Vec<(VertexId, VertexId)> {
        self.dag.edges()
    }

    /// Every edge as `(vertex, dependency)` names, sorted.
    pub fn edge_names(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .edges()
            .into_iter()
            .map(|(v, d)| (self.name(v).to_string(), self.name(d).to_string()))
            .collect();
        edges.sort();
        edges
    }

    /// Names of the direct dependencies of the named vertex, sorted.
    pub fn dependency_names(&self, name: &str) -> Vec<String> {
        let Some(id) = self.find(name) else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .dependencies(id)
            .map(|dep| self.name(dep).to_string())
            .collect();
        names.sort();
        names
    }

    /// Whether the named vertex has a direct edge to the named dependency.
    pub fn depends_on(&self, vertex: &str, dependency: &str) -> bool {
        match (self.find(vertex), self.find(dependency)) {
            (Some(v), Some(d)) => self.dag.has_edge(v, d),
            _ => false,
        }
    }

    pub fn dag(&self) -> &Dag<Arc<dyn Vertex>> {
        &self.dag
    }

    pub fn scopes(&self) -> &ScopeTable {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut ScopeTable {
        &mut self.scopes
    }

    /// References left unresolved by a partial build.
    pub fn diagnostics(&self) -> &[UnresolvedReference] {
        &self.diagnostics
    }

    pub(crate) fn set_diagnostics(&mut self, diagnostics: Vec<UnresolvedReference>) {
        self.diagnostics = diagnostics;
    }

    /// Every cycle, as vertex names in edge order.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        self.dag
            .cycles()
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|id| self.name(id).to_string()).collect())
            .collect()
    }

    /// Fail if the graph contains a cycle.
    pub fn validate(&self) -> GraphResult<()> {
        let cycles = self.cycles();
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Cycles(cycles))
        }
    }

    /// How the edge `vertex -> dependency` constrains a walk for `op`.
    ///
    /// Creation walks keep every edge except those between two orphans,
    /// which are reversed so dependents are destroyed first. Destroy walks
    /// keep edges into providers (a provider must be configured before it
    /// can destroy anything), reverse edges the dependent vertex includes,
    /// and drop the rest.
    pub fn edge_order(&self, op: WalkOperation, vertex: VertexId, dependency: VertexId) -> EdgeOrder {
        let (Some(v), Some(d)) = (self.dag.get(vertex), self.dag.get(dependency)) else {
            return EdgeOrder::Ignore;
        };
        if !op.is_destroy() {
            return if vertex::is_orphan(v.as_ref()) && vertex::is_orphan(d.as_ref()) {
                EdgeOrder::Reverse
            } else {
                EdgeOrder::Forward
            };
        }
        if vertex::is_provider(d.as_ref()) {
            EdgeOrder::Forward
        } else if vertex::destroy_edge_include(v.as_ref(), d.as_ref()) {
            EdgeOrder::Reverse
        } else {
            EdgeOrder::Ignore
        }
    }

    /// Ordering constraints of a walk for `op`.
    pub fn schedule(&self, op: WalkOperation) -> Schedule {
        self.dag
            .schedule(|vertex, dependency| self.edge_order(op, vertex, dependency))
    }
}

impl fmt::Display for Graph {
    /// One line per vertex, sorted, each followed by its indented
    /// dependencies.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.names() {
            writeln!(f, "{name}")?;
            for dependency in self.dependency_names(name) {
                writeln!(f, "  {dependency}")?;
            }
        }
        Ok(())
    }
}
