//! Dependency Resolution
//!
//! Wires edges from the names vertices declare they depend on.
//!
//! # Matching
//!
//! A declared name matches:
//!
//! 1. The vertex exposing exactly that dependable name, if there is one.
//! 2. Otherwise, every vertex exposing a name that starts with the declared
//!    name followed by the separator. Depending on `module.net` before the
//!    module is flattened, or on a nested module prefix after, matches the
//!    whole module this way.
//!
//! A name with no match is an unresolved reference. Strict resolution fails
//! with all of them at once; partial resolution records them on the graph.

use std::collections::BTreeMap;

use crate::error::{GraphError, GraphResult, UnresolvedReference};
use crate::vertex;

use super::{Graph, VertexId, SEPARATOR};

/// How unresolved references are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveMode {
    /// Unresolved references fail the build.
    #[default]
    Strict,
    /// Unresolved references become graph diagnostics.
    Partial,
}

/// Index from dependable names to the vertices exposing them.
#[derive(Debug, Default)]
pub struct NameIndex {
    names: BTreeMap<String, VertexId>,
}

impl NameIndex {
    /// Index every dependable name in `graph`.
    pub fn build(graph: &Graph) -> GraphResult<Self> {
        let mut names: BTreeMap<String, VertexId> = BTreeMap::new();
        for (id, v) in graph.vertices() {
            for name in vertex::dependable_names(v.as_ref()) {
                if let Some(&existing) = names.get(&name) {
                    if existing != id {
                        return Err(GraphError::NameCollision {
                            name,
                            first: graph.name(existing).to_string(),
                            second: v.name().to_string(),
                        });
                    }
                    continue;
                }
                names.insert(name, id);
            }
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Vertices matching a declared dependency name.
    pub fn lookup(&self, name: &str) -> Vec<VertexId> {
        if let Some(&id) = self.names.get(name) {
            return vec![id];
        }

        let prefix = format!("{name}{SEPARATOR}");
        let mut matches: Vec<VertexId> = Vec::new();
        for (_, &id) in self
            .names
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
        {
            if !matches.contains(&id) {
                matches.push(id);
            }
        }
        matches
    }
}

/// Connect every vertex to the vertices its declared names match.
pub fn resolve(graph: &mut Graph, mode: ResolveMode) -> GraphResult<()> {
    let index = NameIndex::build(graph)?;

    let mut edges: Vec<(VertexId, VertexId)> = Vec::new();
    let mut unresolved: Vec<UnresolvedReference> = Vec::new();
    for (id, v) in graph.vertices() {
        for name in vertex::dependencies(v.as_ref()) {
            let targets: Vec<VertexId> = index
                .lookup(&name)
                .into_iter()
                .filter(|&target| target != id)
                .collect();
            if targets.is_empty() {
                unresolved.push(UnresolvedReference {
                    vertex: v.name().to_string(),
                    reference: name,
                });
                continue;
            }
            edges.extend(targets.into_iter().map(|target| (id, target)));
        }
    }

    for (from, to) in edges {
        if graph.connect(from, to) {
            tracing::trace!(vertex = graph.name(from), dependency = graph.name(to), "connected");
        }
    }

    match mode {
        _ if unresolved.is_empty() => {
            graph.set_diagnostics(Vec::new());
            Ok(())
        }
        ResolveMode::Strict => Err(GraphError::UnresolvedReferences(unresolved)),
        ResolveMode::Partial => {
            for reference in &unresolved {
                tracing::warn!(%reference, "unresolved reference");
            }
            graph.set_diagnostics(unresolved);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Output, Resource, Variable};
    use crate::vertex::{OutputNode, ResourceNode, Scoped, VariableNode};
    use serde_json::json;

    fn output(name: &str, value: &str) -> Scoped<OutputNode> {
        Scoped::root(OutputNode::new(Output::new(name, json!(value))))
    }

    #[test]
    fn exact_match_wins_over_prefix() {
        let mut graph = Graph::new();
        graph
            .add_vertex(Scoped::root(VariableNode::new(Variable::new("x"))))
            .unwrap();
        graph
            .add_vertex(Scoped::root(VariableNode::new(Variable::new("x.y"))))
            .unwrap();
        graph.add_vertex(output("o", "${var.x}")).unwrap();

        resolve(&mut graph, ResolveMode::Strict).unwrap();
        assert_eq!(graph.dependency_names("output.o"), vec!["var.x"]);
    }

    #[test]
    fn prefix_matches_every_vertex_of_a_module() {
        let mut graph = Graph::new();
        let net = crate::graph::ModulePath::root().child("module.net");
        graph
            .add_vertex(Scoped::new(VariableNode::new(Variable::new("cidr")), net.clone()))
            .unwrap();
        graph
            .add_vertex(Scoped::new(
                OutputNode::new(Output::new("id", json!("vpc"))),
                net,
            ))
            .unwrap();
        graph
            .add_vertex(Scoped::root(ResourceNode::new(
                Resource::new("null_thing", "a", json!({})).depends_on("module.net"),
            )))
            .unwrap();
        graph
            .add_vertex(Scoped::root(crate::vertex::ProviderNode::implicit("null")))
            .unwrap();

        resolve(&mut graph, ResolveMode::Strict).unwrap();
        assert_eq!(
            graph.dependency_names("null_thing.a"),
            vec!["module.net.output.id", "module.net.var.cidr", "provider.null"]
        );
    }

    #[test]
    fn strict_mode_reports_every_unresolved_reference() {
        let mut graph = Graph::new();
        graph.add_vertex(output("a", "${var.missing}")).unwrap();
        graph.add_vertex(output("b", "${aws_vpc.gone.id}")).unwrap();

        let err = resolve(&mut graph, ResolveMode::Strict).unwrap_err();
        let GraphError::UnresolvedReferences(refs) = err else {
            panic!("expected unresolved references");
        };
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].vertex, "output.a");
        assert_eq!(refs[1].reference, "aws_vpc.gone");
    }

    #[test]
    fn partial_mode_records_diagnostics() {
        let mut graph = Graph::new();
        graph.add_vertex(output("a", "${var.missing}")).unwrap();

        resolve(&mut graph, ResolveMode::Partial).unwrap();
        assert_eq!(graph.diagnostics().len(), 1);
        assert_eq!(graph.diagnostics()[0].reference, "var.missing");
    }

    #[test]
    fn index_rejects_duplicate_dependable_names() {
        #[derive(Debug)]
        struct Alias;

        impl crate::vertex::Vertex for Alias {
            fn name(&self) -> &str {
                "alias"
            }

            fn as_dependable(&self) -> Option<&dyn crate::vertex::Dependable> {
                Some(self)
            }
        }

        impl crate::vertex::Dependable for Alias {
            fn dependable_names(&self) -> Vec<String> {
                vec!["var.x".to_string()]
            }
        }

        let mut graph = Graph::new();
        graph
            .add_vertex(Scoped::root(VariableNode::new(Variable::new("x"))))
            .unwrap();
        graph.add_vertex(Alias).unwrap();

        let err = NameIndex::build(&graph).unwrap_err();
        assert!(matches!(err, GraphError::NameCollision { name, .. } if name == "var.x"));
    }
}
