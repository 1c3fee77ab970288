//! Vertex Capability Model
//!
//! Every vertex in the graph implements [`Vertex`], which only requires a
//! name. Everything else a vertex can do is an optional capability exposed
//! through an `as_*` accessor returning `Option<&dyn Capability>`.
//!
//! # Capabilities
//!
//! | capability | meaning | when absent |
//! |---|---|---|
//! | [`Dependable`] | names other vertices may depend on | the vertex name |
//! | [`DependentOn`] | names this vertex depends on | none |
//! | [`Evaluable`] | the eval tree run during walks | nothing runs |
//! | [`Proxy`] | relays edges, no side effects | real work |
//! | [`Flattenable`] | can be placed inside a module | root only |
//! | [`DestroyEdgeInclude`] | edge participates in destroy order | included |
//! | [`Dotter`] | DOT rendering | not drawn |
//! | [`Subgraph`] | carries a nested module graph | leaf vertex |
//! | [`ProviderVertex`] | configures a provider | not a provider |
//! | [`Orphaned`] | destroyed by every mutating walk | kept |
//!
//! Callers never query accessors directly; the free functions in this module
//! ([`dependable_names`], [`dependencies`], ...) apply the defaults.
//!
//! # Vertex Kinds
//!
//! Configuration-backed kinds ([`OutputNode`], [`VariableNode`],
//! [`ProviderNode`], [`ResourceNode`], [`OrphanNode`]) implement
//! [`ScopedNode`] and live in the graph as [`Scoped`] values, which place a
//! shared node at a module path. Structural kinds ([`ModuleCallNode`],
//! [`ModuleBoundary`], [`RootNode`]) implement [`Vertex`] directly.

mod module;
mod orphan;
mod output;
mod provider;
mod resource;
mod root;
mod scoped;
mod variable;

pub use module::{ModuleBoundary, ModuleCallNode};
pub use orphan::OrphanNode;
pub use output::OutputNode;
pub use provider::ProviderNode;
pub use resource::ResourceNode;
pub use root::{RootNode, ROOT_NAME};
pub use scoped::{Scoped, ScopedNode};
pub use variable::VariableNode;

use std::fmt;
use std::sync::Arc;

use crate::error::GraphError;
use crate::eval::{EvalNode, WalkOperation};
use crate::graph::{DotNode, DotOpts, Graph, ModulePath};

/// A vertex in the dependency graph.
pub trait Vertex: fmt::Debug + Send + Sync {
    /// Unique name within one graph.
    fn name(&self) -> &str;

    fn as_dependable(&self) -> Option<&dyn Dependable> {
        None
    }

    fn as_dependent(&self) -> Option<&dyn DependentOn> {
        None
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        None
    }

    fn as_proxy(&self) -> Option<&dyn Proxy> {
        None
    }

    fn as_flattenable(&self) -> Option<&dyn Flattenable> {
        None
    }

    fn as_destroy_edge(&self) -> Option<&dyn DestroyEdgeInclude> {
        None
    }

    fn as_dotter(&self) -> Option<&dyn Dotter> {
        None
    }

    fn as_subgraph(&self) -> Option<&dyn Subgraph> {
        None
    }

    fn as_provider(&self) -> Option<&dyn ProviderVertex> {
        None
    }

    fn as_orphan(&self) -> Option<&dyn Orphaned> {
        None
    }
}

/// Marks a vertex whose resource is gone from configuration.
pub trait Orphaned {
    fn is_orphan(&self) -> bool {
        true
    }
}

/// Exposes names other vertices may depend on.
pub trait Dependable {
    fn dependable_names(&self) -> Vec<String>;
}

/// Declares the names a vertex depends on.
pub trait DependentOn {
    fn dependencies(&self) -> Vec<String>;
}

/// Produces the eval tree run for this vertex.
pub trait Evaluable {
    /// The unfiltered tree; the walk filters it per operation.
    fn eval_tree(&self) -> EvalNode;
}

/// Marks a vertex that performs no work of its own.
pub trait Proxy {
    fn is_proxy(&self) -> bool {
        true
    }
}

/// Produces a copy of the vertex placed inside a module.
pub trait Flattenable {
    fn flatten(&self, prefix: &ModulePath) -> Result<Arc<dyn Vertex>, GraphError>;
}

/// Decides whether an edge to `dependency` constrains destroy order.
pub trait DestroyEdgeInclude {
    fn destroy_edge_include(&self, dependency: &dyn Vertex) -> bool;
}

/// Renders the vertex as a DOT node.
pub trait Dotter {
    fn dot_node(&self, opts: &DotOpts) -> Option<DotNode>;
}

/// A vertex carrying a nested module graph.
pub trait Subgraph {
    /// The path segment the module contributes, e.g. `module.net`.
    fn segment(&self) -> String;

    fn subgraph(&self) -> &Graph;
}

/// A vertex that initializes and configures a provider.
pub trait ProviderVertex {
    fn provider_name(&self) -> &str;
}

/// Dependable names of `vertex`, defaulting to its own name.
pub fn dependable_names(vertex: &dyn Vertex) -> Vec<String> {
    match vertex.as_dependable() {
        Some(dependable) => dependable.dependable_names(),
        None => vec![vertex.name().to_string()],
    }
}

/// Names `vertex` depends on.
pub fn dependencies(vertex: &dyn Vertex) -> Vec<String> {
    vertex
        .as_dependent()
        .map(DependentOn::dependencies)
        .unwrap_or_default()
}

/// Eval tree of `vertex` filtered for `op`.
pub fn eval_tree(vertex: &dyn Vertex, op: WalkOperation) -> EvalNode {
    match vertex.as_evaluable() {
        Some(evaluable) => evaluable.eval_tree().filter(op),
        None => EvalNode::Noop,
    }
}

pub fn is_proxy(vertex: &dyn Vertex) -> bool {
    vertex.as_proxy().is_some_and(Proxy::is_proxy)
}

pub fn is_provider(vertex: &dyn Vertex) -> bool {
    vertex.as_provider().is_some()
}

pub fn is_orphan(vertex: &dyn Vertex) -> bool {
    vertex.as_orphan().is_some_and(Orphaned::is_orphan)
}

pub fn destroy_edge_include(vertex: &dyn Vertex, dependency: &dyn Vertex) -> bool {
    vertex
        .as_destroy_edge()
        .map_or(true, |policy| policy.destroy_edge_include(dependency))
}

/// Place `vertex` inside the module at `prefix`.
pub fn flatten(vertex: &dyn Vertex, prefix: &ModulePath) -> Result<Arc<dyn Vertex>, GraphError> {
    match vertex.as_flattenable() {
        Some(flattenable) => flattenable.flatten(prefix),
        None => Err(GraphError::NotFlattenable {
            vertex: vertex.name().to_string(),
            path: prefix.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Bare;

    impl Vertex for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[test]
    fn absent_capabilities_use_defaults() {
        let bare = Bare;
        assert_eq!(dependable_names(&bare), vec!["bare"]);
        assert!(dependencies(&bare).is_empty());
        assert!(!is_proxy(&bare));
        assert!(!is_provider(&bare));
        assert!(destroy_edge_include(&bare, &Bare));
        assert!(eval_tree(&bare, WalkOperation::Apply).is_noop());
        assert!(bare.as_dotter().is_none());
    }

    #[test]
    fn bare_vertex_is_root_only() {
        let prefix = ModulePath::root().child("module.net");
        let err = flatten(&Bare, &prefix).unwrap_err();
        assert!(matches!(err, GraphError::NotFlattenable { vertex, .. } if vertex == "bare"));
    }
}
