//! Module vertices.
//!
//! A [`ModuleCallNode`] stands for an unflattened module call and carries
//! the module's own graph. Flattening replaces it with the module's
//! vertices plus a [`ModuleBoundary`], a proxy that depends on every vertex
//! of the module so that `depends_on = ["module.net"]` waits for all of it.

use std::sync::Arc;

use crate::config::ModuleCall;
use crate::error::GraphError;
use crate::graph::{DotNode, DotOpts, Graph, ModulePath};

use super::{Dependable, DependentOn, Dotter, Flattenable, Proxy, Subgraph, Vertex};

#[derive(Debug)]
pub struct ModuleCallNode {
    call: ModuleCall,
    name: String,
    graph: Graph,
}

impl ModuleCallNode {
    /// `graph` is the called module's graph, built in its own scope.
    pub fn new(call: ModuleCall, graph: Graph) -> Self {
        Self {
            name: call.id(),
            call,
            graph,
        }
    }

    pub fn call(&self) -> &ModuleCall {
        &self.call
    }
}

impl Vertex for ModuleCallNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_dependable(&self) -> Option<&dyn Dependable> {
        Some(self)
    }

    fn as_dependent(&self) -> Option<&dyn DependentOn> {
        Some(self)
    }

    fn as_dotter(&self) -> Option<&dyn Dotter> {
        Some(self)
    }

    fn as_subgraph(&self) -> Option<&dyn Subgraph> {
        Some(self)
    }
}

impl Dependable for ModuleCallNode {
    fn dependable_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        names.extend(
            self.call
                .source
                .outputs
                .iter()
                .map(|output| format!("{}.output.{}", self.name, output.name)),
        );
        names
    }
}

impl DependentOn for ModuleCallNode {
    fn dependencies(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self
            .call
            .arguments
            .values()
            .flat_map(|argument| argument.dependency_names())
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl Dotter for ModuleCallNode {
    fn dot_node(&self, _opts: &DotOpts) -> Option<DotNode> {
        Some(DotNode::new(
            self.name.clone(),
            [
                ("label", self.name.clone()),
                ("shape", "folder".to_string()),
            ],
        ))
    }
}

impl Subgraph for ModuleCallNode {
    fn segment(&self) -> String {
        self.name.clone()
    }

    fn subgraph(&self) -> &Graph {
        &self.graph
    }
}

/// Proxy marking the extent of a flattened module instance.
#[derive(Debug, Clone)]
pub struct ModuleBoundary {
    path: ModulePath,
    name: String,
    members: Vec<String>,
}

impl ModuleBoundary {
    /// Boundary of the module at `path` containing the named vertices.
    pub fn new(path: ModulePath, members: Vec<String>) -> Self {
        Self {
            name: path.prefix(),
            path,
            members,
        }
    }

    pub fn path(&self) -> &ModulePath {
        &self.path
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }
}

impl Vertex for ModuleBoundary {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_dependent(&self) -> Option<&dyn DependentOn> {
        Some(self)
    }

    fn as_proxy(&self) -> Option<&dyn Proxy> {
        Some(self)
    }

    fn as_flattenable(&self) -> Option<&dyn Flattenable> {
        Some(self)
    }

    fn as_dotter(&self) -> Option<&dyn Dotter> {
        Some(self)
    }
}

impl DependentOn for ModuleBoundary {
    fn dependencies(&self) -> Vec<String> {
        self.members.clone()
    }
}

impl Proxy for ModuleBoundary {}

impl Flattenable for ModuleBoundary {
    fn flatten(&self, prefix: &ModulePath) -> Result<Arc<dyn Vertex>, GraphError> {
        Ok(Arc::new(Self::new(
            prefix.join(&self.path),
            prefix.qualify_all(&self.members),
        )))
    }
}

impl Dotter for ModuleBoundary {
    fn dot_node(&self, opts: &DotOpts) -> Option<DotNode> {
        if !opts.verbose {
            return None;
        }
        Some(DotNode::new(
            self.name.clone(),
            [
                ("label", self.name.clone()),
                ("shape", "folder".to_string()),
                ("style", "dotted".to_string()),
            ],
        ))
    }
}
