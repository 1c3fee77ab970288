//! Path-Scoped Vertices
//!
//! A [`Scoped`] places a shared configuration node at a module path. The
//! same node value backs every placement: flattening only changes the path,
//! and every name the node reports is qualified with it on the way out.

use std::fmt;
use std::sync::Arc;

use crate::error::GraphError;
use crate::eval::EvalNode;
use crate::graph::{DotNode, DotOpts, ModulePath};

use super::{
    Dependable, DependentOn, DestroyEdgeInclude, Dotter, Evaluable, Flattenable, Orphaned,
    Proxy, ProviderVertex, Vertex,
};

/// A configuration node, described relative to its own module.
pub trait ScopedNode: fmt::Debug + Send + Sync + 'static {
    /// Name within the module, e.g. `output.ip`.
    fn local_name(&self) -> String;

    fn local_dependable_names(&self) -> Vec<String> {
        vec![self.local_name()]
    }

    /// Dependencies named within the node's own module.
    fn local_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Dependencies named within the enclosing module.
    ///
    /// Only applied once the node sits below the root.
    fn parent_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// The eval tree for an instance at `path`.
    fn eval_tree_at(&self, path: &ModulePath) -> EvalNode;

    fn is_proxy(&self) -> bool {
        false
    }

    fn is_flattenable(&self) -> bool {
        true
    }

    fn is_orphan(&self) -> bool {
        false
    }

    fn include_destroy_edge(&self, _dependency: &dyn Vertex) -> bool {
        true
    }

    /// DOT attributes other than the label.
    fn dot_attrs(&self) -> Vec<(&'static str, String)>;

    fn dot_label(&self, path: &ModulePath) -> String {
        path.qualify(&self.local_name())
    }

    fn provider_name(&self) -> Option<&str> {
        None
    }
}

/// A node placed at a module path.
pub struct Scoped<T> {
    node: Arc<T>,
    path: ModulePath,
    name: String,
}

impl<T: ScopedNode> Scoped<T> {
    pub fn new(node: T, path: ModulePath) -> Self {
        Self::placed(Arc::new(node), path)
    }

    /// Place `node` in the root module.
    pub fn root(node: T) -> Self {
        Self::new(node, ModulePath::root())
    }

    fn placed(node: Arc<T>, path: ModulePath) -> Self {
        let name = path.qualify(&node.local_name());
        Self { node, path, name }
    }

    pub fn node(&self) -> &T {
        &self.node
    }

    pub fn path(&self) -> &ModulePath {
        &self.path
    }
}

impl<T: ScopedNode> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped")
            .field("name", &self.name)
            .field("node", &self.node)
            .finish()
    }
}

impl<T: ScopedNode> Vertex for Scoped<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_dependable(&self) -> Option<&dyn Dependable> {
        Some(self)
    }

    fn as_dependent(&self) -> Option<&dyn DependentOn> {
        Some(self)
    }

    fn as_evaluable(&self) -> Option<&dyn Evaluable> {
        Some(self)
    }

    fn as_proxy(&self) -> Option<&dyn Proxy> {
        self.node.is_proxy().then_some(self as &dyn Proxy)
    }

    fn as_flattenable(&self) -> Option<&dyn Flattenable> {
        self.node.is_flattenable().then_some(self as &dyn Flattenable)
    }

    fn as_destroy_edge(&self) -> Option<&dyn DestroyEdgeInclude> {
        Some(self)
    }

    fn as_dotter(&self) -> Option<&dyn Dotter> {
        Some(self)
    }

    fn as_provider(&self) -> Option<&dyn ProviderVertex> {
        self.node
            .provider_name()
            .is_some()
            .then_some(self as &dyn ProviderVertex)
    }

    fn as_orphan(&self) -> Option<&dyn Orphaned> {
        self.node.is_orphan().then_some(self as &dyn Orphaned)
    }
}

impl<T: ScopedNode> Dependable for Scoped<T> {
    fn dependable_names(&self) -> Vec<String> {
        self.path.qualify_all(self.node.local_dependable_names())
    }
}

impl<T: ScopedNode> DependentOn for Scoped<T> {
    fn dependencies(&self) -> Vec<String> {
        let mut names = self.path.qualify_all(self.node.local_dependencies());
        if let Some(parent) = self.path.parent() {
            for name in parent.qualify_all(self.node.parent_dependencies()) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

impl<T: ScopedNode> Evaluable for Scoped<T> {
    fn eval_tree(&self) -> EvalNode {
        self.node.eval_tree_at(&self.path)
    }
}

impl<T: ScopedNode> Proxy for Scoped<T> {}

impl<T: ScopedNode> Orphaned for Scoped<T> {}

impl<T: ScopedNode> Flattenable for Scoped<T> {
    fn flatten(&self, prefix: &ModulePath) -> Result<Arc<dyn Vertex>, GraphError> {
        Ok(Arc::new(Self::placed(
            Arc::clone(&self.node),
            prefix.join(&self.path),
        )))
    }
}

impl<T: ScopedNode> DestroyEdgeInclude for Scoped<T> {
    fn destroy_edge_include(&self, dependency: &dyn Vertex) -> bool {
        self.node.include_destroy_edge(dependency)
    }
}

impl<T: ScopedNode> Dotter for Scoped<T> {
    fn dot_node(&self, _opts: &DotOpts) -> Option<DotNode> {
        let mut attrs = vec![("label", self.node.dot_label(&self.path))];
        attrs.extend(self.node.dot_attrs());
        Some(DotNode::new(self.name.clone(), attrs))
    }
}

impl<T: ScopedNode> ProviderVertex for Scoped<T> {
    fn provider_name(&self) -> &str {
        self.node.provider_name().unwrap_or_default()
    }
}
