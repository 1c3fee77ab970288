//! Variable vertices (`var.NAME`).
//!
//! Variables are proxies: they do no work during a walk, they only relay
//! ordering. A variable inside a module depends on whatever its caller's
//! argument expression references, so the module waits on the caller.

use crate::config::{RawConfig, Variable};
use crate::eval::steps::CheckVariable;
use crate::eval::{EvalNode, WalkOperation};
use crate::graph::ModulePath;

use super::ScopedNode;

#[derive(Debug, Clone)]
pub struct VariableNode {
    variable: Variable,
    argument: Option<RawConfig>,
}

impl VariableNode {
    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            argument: None,
        }
    }

    /// A module variable receiving `argument` from its caller.
    pub fn with_argument(variable: Variable, argument: Option<RawConfig>) -> Self {
        Self { variable, argument }
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }
}

impl ScopedNode for VariableNode {
    fn local_name(&self) -> String {
        format!("var.{}", self.variable.name)
    }

    fn parent_dependencies(&self) -> Vec<String> {
        self.argument
            .as_ref()
            .map(RawConfig::dependency_names)
            .unwrap_or_default()
    }

    fn eval_tree_at(&self, path: &ModulePath) -> EvalNode {
        EvalNode::only(
            &[WalkOperation::Validate],
            EvalNode::step(CheckVariable {
                path: path.clone(),
                name: self.variable.name.clone(),
            }),
        )
    }

    fn is_proxy(&self) -> bool {
        true
    }

    fn dot_attrs(&self) -> Vec<(&'static str, String)> {
        vec![("shape", "note".to_string())]
    }
}
