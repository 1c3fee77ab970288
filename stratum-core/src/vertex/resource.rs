//! Resource vertices (`TYPE.NAME`).

use crate::config::Resource;
use crate::eval::steps::{
    ApplyResource, DiffDestroy, DiffResource, RefreshResource, ValidateResource,
};
use crate::eval::{Address, EvalNode, WalkOperation};
use crate::graph::ModulePath;

use super::ScopedNode;

#[derive(Debug, Clone)]
pub struct ResourceNode {
    resource: Resource,
}

impl ResourceNode {
    pub fn new(resource: Resource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    fn provider_vertex(&self) -> String {
        format!("provider.{}", self.resource.provider_name())
    }

    /// Names recorded in state when the resource is applied.
    fn recorded_dependencies(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resource
            .config
            .dependency_names()
            .into_iter()
            .filter(|name| !name.starts_with("var.") && !name.starts_with("module."))
            .collect();
        for name in &self.resource.depends_on {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

impl ScopedNode for ResourceNode {
    fn local_name(&self) -> String {
        self.resource.id()
    }

    fn local_dependencies(&self) -> Vec<String> {
        let mut names = self.resource.config.dependency_names();
        for name in self
            .resource
            .depends_on
            .iter()
            .cloned()
            .chain([self.provider_vertex()])
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn eval_tree_at(&self, path: &ModulePath) -> EvalNode {
        let address = Address::new(path.clone(), self.resource.id());
        let provider = Address::new(path.clone(), self.provider_vertex());
        let kind = self.resource.kind.clone();

        let diff = EvalNode::step(DiffResource {
            address: address.clone(),
            kind: kind.clone(),
            provider: provider.clone(),
            config: self.resource.config.clone(),
        });
        let apply = EvalNode::step(ApplyResource {
            address: address.clone(),
            kind: kind.clone(),
            provider: provider.clone(),
            dependencies: path.qualify_all(self.recorded_dependencies()),
        });

        EvalNode::sequence([
            EvalNode::only(
                &[WalkOperation::Validate],
                EvalNode::step(ValidateResource {
                    address: address.clone(),
                    kind: kind.clone(),
                    provider: provider.clone(),
                    config: self.resource.config.clone(),
                }),
            ),
            EvalNode::only(
                &[WalkOperation::Refresh],
                EvalNode::step(RefreshResource {
                    address: address.clone(),
                    kind,
                    provider,
                }),
            ),
            EvalNode::only(&[WalkOperation::Plan, WalkOperation::Apply], diff),
            EvalNode::only(
                &[WalkOperation::Destroy],
                EvalNode::step(DiffDestroy { address }),
            ),
            EvalNode::only(&[WalkOperation::Apply, WalkOperation::Destroy], apply),
        ])
    }

    fn dot_attrs(&self) -> Vec<(&'static str, String)> {
        vec![("shape", "box".to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{dependencies, eval_tree, Scoped, Vertex};
    use serde_json::json;

    fn web() -> Scoped<ResourceNode> {
        Scoped::root(ResourceNode::new(
            Resource::new(
                "aws_instance",
                "web",
                json!({"ami": "${var.ami}", "subnet": "${aws_subnet.a.id}"}),
            )
            .depends_on("aws_vpc.main"),
        ))
    }

    #[test]
    fn depends_on_references_explicit_names_and_provider() {
        let web = web();
        assert_eq!(web.name(), "aws_instance.web");
        assert_eq!(
            dependencies(&web),
            vec!["var.ami", "aws_subnet.a", "aws_vpc.main", "provider.aws"]
        );
    }

    #[test]
    fn eval_tree_per_operation() {
        let web = web();
        let steps = |op| eval_tree(&web, op).step_names(op);

        assert_eq!(steps(WalkOperation::Validate), vec!["validate_resource"]);
        assert_eq!(steps(WalkOperation::Refresh), vec!["refresh_resource"]);
        assert_eq!(steps(WalkOperation::Plan), vec!["diff_resource"]);
        assert_eq!(
            steps(WalkOperation::Apply),
            vec!["diff_resource", "apply_resource"]
        );
        assert_eq!(
            steps(WalkOperation::Destroy),
            vec!["diff_destroy", "apply_resource"]
        );
    }

    #[test]
    fn recorded_dependencies_skip_variables() {
        assert_eq!(
            web().node().recorded_dependencies(),
            vec!["aws_subnet.a", "aws_vpc.main"]
        );
    }
}
