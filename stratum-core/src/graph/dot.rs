//! DOT Rendering
//!
//! Renders a graph in Graphviz DOT format. Only vertices with the
//! [`Dotter`](crate::vertex::Dotter) capability are drawn unless the
//! rendering is verbose; edges are drawn between drawn vertices only.
//! Output order follows vertex insertion order, so rendering is
//! deterministic.

use std::collections::HashSet;
use std::fmt::Write;

use indexmap::IndexMap;

use super::{Graph, VertexId};

/// Rendering options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DotOpts {
    /// Highlight the edges of every cycle.
    pub draw_cycles: bool,
    /// Draw every vertex, including proxies that normally stay hidden.
    pub verbose: bool,
}

/// A rendered node: its graph name plus attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub name: String,
    pub attrs: IndexMap<String, String>,
}

impl DotNode {
    pub fn new<I, K>(name: impl Into<String>, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, String)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            attrs: attrs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    fn render(&self, out: &mut String) {
        let _ = write!(out, "\t{}", quote(&self.name));
        if !self.attrs.is_empty() {
            let attrs: Vec<String> = self
                .attrs
                .iter()
                .map(|(key, value)| format!("{key} = {}", quote(value)))
                .collect();
            let _ = write!(out, " [{}]", attrs.join(", "));
        }
        out.push('\n');
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Graph {
    /// Render the graph as a DOT `digraph`.
    pub fn to_dot(&self, opts: &DotOpts) -> String {
        let mut out = String::from("digraph {\n\tcompound = \"true\"\n\tnewrank = \"true\"\n");

        let mut drawn: HashSet<VertexId> = HashSet::new();
        for (id, vertex) in self.vertices() {
            let node = match vertex.as_dotter() {
                Some(dotter) => dotter.dot_node(opts),
                None if opts.verbose => Some(DotNode::new(
                    vertex.name(),
                    Vec::<(&str, String)>::new(),
                )),
                None => None,
            };
            if let Some(node) = node {
                node.render(&mut out);
                drawn.insert(id);
            }
        }

        let mut cycle_edges: HashSet<(VertexId, VertexId)> = HashSet::new();
        if opts.draw_cycles {
            for cycle in self.dag().cycles() {
                for (index, &from) in cycle.iter().enumerate() {
                    let to = cycle[(index + 1) % cycle.len()];
                    cycle_edges.insert((from, to));
                }
            }
        }

        for (vertex, dependency) in self.edges() {
            if !drawn.contains(&vertex) || !drawn.contains(&dependency) {
                continue;
            }
            let _ = write!(
                out,
                "\t{} -> {}",
                quote(self.name(vertex)),
                quote(self.name(dependency))
            );
            if cycle_edges.contains(&(vertex, dependency)) {
                out.push_str(" [color = \"red\", penwidth = \"2.0\"]");
            }
            out.push('\n');
        }

        out.push_str("}\n");
        out
    }
}
