//! Output vertices (`output.NAME`).
//!
//! An output interpolates its value and records it under the module path.
//! Its edges never constrain destroy order: outputs are removed without
//! waiting on the resources they read.

use crate::config::Output;
use crate::eval::steps::{RemoveOutput, WriteOutput};
use crate::eval::{Address, EvalNode, WalkOperation};
use crate::graph::ModulePath;

use super::{ScopedNode, Vertex};

#[derive(Debug, Clone)]
pub struct OutputNode {
    output: Output,
}

impl OutputNode {
    pub fn new(output: Output) -> Self {
        Self { output }
    }

    pub fn output(&self) -> &Output {
        &self.output
    }
}

impl ScopedNode for OutputNode {
    fn local_name(&self) -> String {
        format!("output.{}", self.output.name)
    }

    fn local_dependencies(&self) -> Vec<String> {
        self.output.value.dependency_names()
    }

    fn eval_tree_at(&self, path: &ModulePath) -> EvalNode {
        let address = Address::new(path.clone(), self.output.name.clone());
        EvalNode::sequence([
            EvalNode::only(
                &[
                    WalkOperation::Refresh,
                    WalkOperation::Plan,
                    WalkOperation::Apply,
                ],
                EvalNode::step(WriteOutput {
                    address: address.clone(),
                    value: self.output.value.clone(),
                }),
            ),
            EvalNode::only(
                &[WalkOperation::Destroy],
                EvalNode::step(RemoveOutput { address }),
            ),
        ])
    }

    fn include_destroy_edge(&self, _dependency: &dyn Vertex) -> bool {
        false
    }

    fn dot_attrs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("shape", "invhouse".to_string()),
            ("style", "filled".to_string()),
            ("fillcolor", "#FFB2B2".to_string()),
            ("fontname", "courier".to_string()),
        ]
    }

    fn dot_label(&self, path: &ModulePath) -> String {
        path.qualify(&self.output.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DotOpts;
    use crate::vertex::{dependencies, destroy_edge_include, eval_tree, is_proxy, Scoped, Vertex};
    use serde_json::json;

    fn node() -> Scoped<OutputNode> {
        Scoped::root(OutputNode::new(Output::new(
            "ip",
            json!("${aws_instance.web.private_ip}"),
        )))
    }

    #[test]
    fn depends_on_referenced_resources() {
        let output = node();
        assert_eq!(output.name(), "output.ip");
        assert_eq!(dependencies(&output), vec!["aws_instance.web"]);
        assert!(!is_proxy(&output));
    }

    #[test]
    fn eval_tree_varies_by_operation() {
        let output = node();
        assert!(eval_tree(&output, WalkOperation::Validate).is_noop());
        assert_eq!(
            eval_tree(&output, WalkOperation::Apply).step_names(WalkOperation::Apply),
            vec!["write_output"]
        );
        assert_eq!(
            eval_tree(&output, WalkOperation::Destroy).step_names(WalkOperation::Destroy),
            vec!["remove_output"]
        );
    }

    #[test]
    fn excluded_from_destroy_ordering() {
        let output = node();
        assert!(!destroy_edge_include(&output, &node()));
    }

    #[test]
    fn dot_node_is_an_inverted_house() {
        let output = Scoped::new(
            OutputNode::new(Output::new("ip", json!("1.2.3.4"))),
            ModulePath::root().child("module.web"),
        );
        let dot = output.as_dotter().unwrap().dot_node(&DotOpts::default()).unwrap();
        assert_eq!(dot.name, "module.web.output.ip");
        assert_eq!(dot.attrs["label"], "module.web.ip");
        assert_eq!(dot.attrs["shape"], "invhouse");
    }
}
