//! Provider vertices (`provider.NAME`).

use crate::config::ProviderConfig;
use crate::eval::steps::{ConfigureProvider, InitProvider, ValidateProvider};
use crate::eval::{Address, EvalNode, WalkOperation};
use crate::graph::ModulePath;

use super::ScopedNode;

/// A declared provider, or an implicit one for a provider that resources
/// use without a configuration block.
#[derive(Debug, Clone)]
pub struct ProviderNode {
    config: ProviderConfig,
    implicit: bool,
}

impl ProviderNode {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            implicit: false,
        }
    }

    /// A provider with empty configuration.
    pub fn implicit(name: impl Into<String>) -> Self {
        Self {
            config: ProviderConfig::new(name, serde_json::json!({})),
            implicit: true,
        }
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

impl ScopedNode for ProviderNode {
    fn local_name(&self) -> String {
        format!("provider.{}", self.config.name)
    }

    fn local_dependencies(&self) -> Vec<String> {
        self.config.config.dependency_names()
    }

    fn eval_tree_at(&self, path: &ModulePath) -> EvalNode {
        let address = Address::new(path.clone(), self.local_name());
        EvalNode::sequence([
            EvalNode::step(InitProvider {
                address: address.clone(),
                name: self.config.name.clone(),
            }),
            EvalNode::only(
                &[WalkOperation::Validate],
                EvalNode::step(ValidateProvider {
                    address: address.clone(),
                    config: self.config.config.clone(),
                }),
            ),
            EvalNode::only(
                &[
                    WalkOperation::Refresh,
                    WalkOperation::Plan,
                    WalkOperation::Apply,
                    WalkOperation::Destroy,
                ],
                EvalNode::step(ConfigureProvider {
                    address,
                    config: self.config.config.clone(),
                }),
            ),
        ])
    }

    fn dot_attrs(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![("shape", "diamond".to_string())];
        if self.implicit {
            attrs.push(("style", "dashed".to_string()));
        }
        attrs
    }

    fn provider_name(&self) -> Option<&str> {
        Some(&self.config.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::{dependencies, eval_tree, is_provider, Scoped, Vertex};
    use serde_json::json;

    #[test]
    fn provider_configures_on_every_mutating_walk() {
        let provider = Scoped::root(ProviderNode::new(ProviderConfig::new(
            "aws",
            json!({"region": "${var.region}"}),
        )));
        assert_eq!(provider.name(), "provider.aws");
        assert!(is_provider(&provider));
        assert_eq!(dependencies(&provider), vec!["var.region"]);

        for op in [WalkOperation::Refresh, WalkOperation::Plan, WalkOperation::Destroy] {
            assert_eq!(
                eval_tree(&provider, op).step_names(op),
                vec!["init_provider", "configure_provider"]
            );
        }
        assert_eq!(
            eval_tree(&provider, WalkOperation::Validate).step_names(WalkOperation::Validate),
            vec!["init_provider", "validate_provider"]
        );
    }

    #[test]
    fn implicit_provider_has_no_dependencies() {
        let provider = Scoped::root(ProviderNode::implicit("null"));
        assert!(provider.node().is_implicit());
        assert!(dependencies(&provider).is_empty());
        assert_eq!(provider.as_provider().map(|p| p.provider_name()), Some("null"));
    }
}
