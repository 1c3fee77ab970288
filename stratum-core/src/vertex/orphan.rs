//! Orphan vertices: resources recorded in state that the configuration no
//! longer declares. Every mutating walk destroys them.
//!
//! An orphan keeps the dependencies recorded when it was last applied, so
//! orphans that depended on each other are destroyed dependents first.

use crate::config::provider_for_type;
use crate::eval::steps::{ApplyResource, DiffDestroy, RefreshResource};
use crate::eval::{Address, EvalNode, WalkOperation};
use crate::graph::ModulePath;

use super::ScopedNode;

#[derive(Debug, Clone)]
pub struct OrphanNode {
    kind: String,
    name: String,
    provider: String,
    /// Recorded dependency names, local to the orphan's module.
    dependencies: Vec<String>,
}

impl OrphanNode {
    /// Orphan for a state entry named `TYPE.NAME`; `None` for malformed names.
    pub fn from_state_name(id: &str) -> Option<Self> {
        let (kind, name) = id.split_once('.')?;
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.to_string(),
            name: name.to_string(),
            provider: provider_for_type(kind),
            dependencies: Vec::new(),
        })
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// `provider.NAME`, unqualified.
    pub fn provider_vertex(&self) -> String {
        format!("provider.{}", self.provider)
    }
}

impl ScopedNode for OrphanNode {
    fn local_name(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    fn local_dependencies(&self) -> Vec<String> {
        let mut names = self.dependencies.clone();
        let provider = self.provider_vertex();
        if !names.contains(&provider) {
            names.push(provider);
        }
        names
    }

    fn eval_tree_at(&self, path: &ModulePath) -> EvalNode {
        let address = Address::new(path.clone(), self.local_name());
        let provider = Address::new(path.clone(), self.provider_vertex());

        EvalNode::sequence([
            EvalNode::only(
                &[WalkOperation::Refresh],
                EvalNode::step(RefreshResource {
                    address: address.clone(),
                    kind: self.kind.clone(),
                    provider: provider.clone(),
                }),
            ),
            EvalNode::only(
                &[
                    WalkOperation::Plan,
                    WalkOperation::Apply,
                    WalkOperation::Destroy,
                ],
                EvalNode::step(DiffDestroy {
                    address: address.clone(),
                }),
            ),
            EvalNode::only(
                &[WalkOperation::Apply, WalkOperation::Destroy],
                EvalNode::step(ApplyResource {
                    address,
                    kind: self.kind.clone(),
                    provider,
                    dependencies: Vec::new(),
                }),
            ),
        ])
    }

    fn is_flattenable(&self) -> bool {
        false
    }

    fn is_orphan(&self) -> bool {
        true
    }

    fn dot_attrs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("shape", "box".to_string()),
            ("style", "dashed".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{dependencies, eval_tree, flatten, Scoped, Vertex};

    #[test]
    fn orphan_is_destroyed_on_apply() {
        let orphan = Scoped::root(OrphanNode::from_state_name("aws_instance.old").unwrap());
        assert_eq!(orphan.name(), "aws_instance.old");
        assert_eq!(dependencies(&orphan), vec!["provider.aws"]);
        assert_eq!(
            eval_tree(&orphan, WalkOperation::Apply).step_names(WalkOperation::Apply),
            vec!["diff_destroy", "apply_resource"]
        );
        assert_eq!(
            eval_tree(&orphan, WalkOperation::Plan).step_names(WalkOperation::Plan),
            vec!["diff_destroy"]
        );
    }

    #[test]
    fn orphan_is_placed_but_never_reflattened() {
        let net = ModulePath::root().child("module.net");
        let orphan = Scoped::new(
            OrphanNode::from_state_name("aws_subnet.old")
                .unwrap()
                .with_dependencies(vec!["aws_vpc.main".to_string()]),
            net.clone(),
        );
        assert_eq!(orphan.name(), "module.net.aws_subnet.old");
        assert_eq!(
            dependencies(&orphan),
            vec!["module.net.aws_vpc.main", "module.net.provider.aws"]
        );
        assert!(orphan.as_flattenable().is_none());
        assert!(flatten(&orphan, &net).is_err());
    }

    #[test]
    fn malformed_state_names_are_rejected() {
        assert!(OrphanNode::from_state_name("nodot").is_none());
        assert!(OrphanNode::from_state_name(".x").is_none());
    }
}
