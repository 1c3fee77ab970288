//! Evaluation Pipeline
//!
//! Each evaluable vertex describes its work as an [`EvalNode`] tree: an
//! ordered, possibly nested sequence of steps where subtrees may be tagged
//! with the walk operations they apply to.
//!
//! # Concepts
//!
//! ## Walk Operations
//!
//! A walk runs exactly one [`WalkOperation`]. Filtering a tree for that
//! operation removes every subtree tagged for other operations.
//!
//! ## Steps
//!
//! An [`EvalStep`] is the leaf of a tree: a synchronous unit of work that
//! reads and writes the shared [`EvalContext`]. Steps communicate with each
//! other only through the context (a diff step records a diff that a later
//! apply step reads).
//!
//! ## Context
//!
//! The [`EvalContext`] is created at walk start and holds everything steps
//! touch: input variables, module scopes, provider handles, resource states,
//! diffs, and output values.

mod context;
mod provider;
mod state;
pub mod steps;

pub use context::EvalContext;
pub use provider::{diff_attributes, ProviderFactory, ResourceProvider};
pub use state::{Address, AttributeDiff, ModuleState, ResourceDiff, ResourceState, State};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// The operation a walk performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkOperation {
    /// Read-only check of configuration against providers.
    Validate,
    /// Refresh recorded state from providers.
    Refresh,
    /// Compute diffs without changing anything.
    Plan,
    /// Compute diffs and apply them.
    Apply,
    /// Destroy every resource in state.
    Destroy,
}

impl WalkOperation {
    pub const ALL: [WalkOperation; 5] = [
        WalkOperation::Validate,
        WalkOperation::Refresh,
        WalkOperation::Plan,
        WalkOperation::Apply,
        WalkOperation::Destroy,
    ];

    /// Destroy walks order vertices against the edge direction.
    pub fn is_destroy(self) -> bool {
        self == WalkOperation::Destroy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WalkOperation::Validate => "validate",
            WalkOperation::Refresh => "refresh",
            WalkOperation::Plan => "plan",
            WalkOperation::Apply => "apply",
            WalkOperation::Destroy => "destroy",
        }
    }
}

impl fmt::Display for WalkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of evaluation work.
pub trait EvalStep: fmt::Debug + Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError>;
}

/// A tree of evaluation steps.
#[derive(Debug, Clone, Default)]
pub enum EvalNode {
    /// Does nothing.
    #[default]
    Noop,
    /// Children run in order; the first failure stops the sequence.
    Sequence(Vec<EvalNode>),
    /// The child runs only for the listed operations.
    OpFilter {
        ops: Vec<WalkOperation>,
        node: Box<EvalNode>,
    },
    Step(Arc<dyn EvalStep>),
}

impl EvalNode {
    pub fn step(step: impl EvalStep + 'static) -> Self {
        EvalNode::Step(Arc::new(step))
    }

    pub fn sequence(nodes: impl IntoIterator<Item = EvalNode>) -> Self {
        EvalNode::Sequence(nodes.into_iter().collect())
    }

    /// Restrict `node` to the given operations.
    pub fn only(ops: &[WalkOperation], node: EvalNode) -> Self {
        EvalNode::OpFilter {
            ops: ops.to_vec(),
            node: Box::new(node),
        }
    }

    /// Prune the tree down to what runs for `op`.
    ///
    /// The result contains no filters; empty sequences collapse to
    /// [`EvalNode::Noop`].
    pub fn filter(&self, op: WalkOperation) -> EvalNode {
        match self {
            EvalNode::Noop => EvalNode::Noop,
            EvalNode::Step(step) => EvalNode::Step(Arc::clone(step)),
            EvalNode::OpFilter { ops, node } => {
                if ops.contains(&op) {
                    node.filter(op)
                } else {
                    EvalNode::Noop
                }
            }
            EvalNode::Sequence(nodes) => {
                let mut kept: Vec<EvalNode> = nodes
                    .iter()
                    .map(|node| node.filter(op))
                    .filter(|node| !node.is_noop())
                    .collect();
                match kept.len() {
                    0 => EvalNode::Noop,
                    1 => kept.remove(0),
                    _ => EvalNode::Sequence(kept),
                }
            }
        }
    }

    pub fn is_noop(&self) -> bool {
        match self {
            EvalNode::Noop => true,
            EvalNode::Sequence(nodes) => nodes.iter().all(EvalNode::is_noop),
            EvalNode::OpFilter { node, .. } => node.is_noop(),
            EvalNode::Step(_) => false,
        }
    }

    /// Names of the steps that would run for `op`, in order.
    pub fn step_names(&self, op: WalkOperation) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.collect_steps(op, &mut |step| names.push(step.name()));
        names
    }

    /// Run every step active for `op`, in declared order.
    pub fn eval(&self, ctx: &EvalContext, op: WalkOperation) -> Result<(), EvalError> {
        match self {
            EvalNode::Noop => Ok(()),
            EvalNode::Step(step) => {
                tracing::trace!(step = step.name(), "eval step");
                step.eval(ctx)
            }
            EvalNode::OpFilter { ops, node } => {
                if ops.contains(&op) {
                    node.eval(ctx, op)
                } else {
                    Ok(())
                }
            }
            EvalNode::Sequence(nodes) => nodes.iter().try_for_each(|node| node.eval(ctx, op)),
        }
    }

    fn collect_steps(&self, op: WalkOperation, visit: &mut impl FnMut(&dyn EvalStep)) {
        match self {
            EvalNode::Noop => {}
            EvalNode::Step(step) => visit(step.as_ref()),
            EvalNode::OpFilter { ops, node } => {
                if ops.contains(&op) {
                    node.collect_steps(op, visit);
                }
            }
            EvalNode::Sequence(nodes) => {
                for node in nodes {
                    node.collect_steps(op, visit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ScopeTable;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Record {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl EvalStep for Record {
        fn name(&self) -> &'static str {
            self.label
        }

        fn eval(&self, _ctx: &EvalContext) -> Result<(), EvalError> {
            self.log.lock().push(self.label);
            Ok(())
        }
    }

    fn tree(log: &Arc<Mutex<Vec<&'static str>>>) -> EvalNode {
        let record = |label| {
            EvalNode::step(Record {
                label,
                log: Arc::clone(log),
            })
        };
        EvalNode::sequence([
            record("always"),
            EvalNode::only(&[WalkOperation::Plan, WalkOperation::Apply], record("diff")),
            EvalNode::only(&[WalkOperation::Apply], record("apply")),
        ])
    }

    #[test]
    fn filter_removes_other_operations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tree = tree(&log);

        assert_eq!(tree.step_names(WalkOperation::Plan), vec!["always", "diff"]);
        assert_eq!(
            tree.filter(WalkOperation::Apply).step_names(WalkOperation::Apply),
            vec!["always", "diff", "apply"]
        );
        assert_eq!(
            tree.filter(WalkOperation::Refresh).step_names(WalkOperation::Refresh),
            vec!["always"]
        );
    }

    #[test]
    fn tree_for_unrelated_operation_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tree = EvalNode::only(
            &[WalkOperation::Apply],
            EvalNode::step(Record {
                label: "apply",
                log,
            }),
        );
        assert!(tree.filter(WalkOperation::Destroy).is_noop());
        assert!(!tree.filter(WalkOperation::Apply).is_noop());
    }

    #[test]
    fn eval_runs_steps_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = EvalContext::new(WalkOperation::Apply, ScopeTable::default());

        tree(&log).eval(&ctx, WalkOperation::Apply).unwrap();
        assert_eq!(*log.lock(), vec!["always", "diff", "apply"]);
    }
}
