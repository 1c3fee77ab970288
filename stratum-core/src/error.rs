//! Error Types
//!
//! Every layer of the engine reports failures through its own enum:
//!
//! - [`ConfigError`]: malformed declarations or walk options
//! - [`GraphError`]: build-time failures (unresolved names, collisions, cycles)
//! - [`EvalError`]: a single evaluation step failed during a walk
//! - [`WalkError`]: the aggregate outcome of a walk that did not fully succeed
//!
//! Build-time errors abort before any walk starts. Walk-time errors are
//! collected per vertex and surfaced together.

use std::fmt;

use thiserror::Error;

use crate::eval::WalkOperation;
use crate::graph::ModulePath;

/// Errors raised while reading declarations or options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unterminated interpolation in {0:?}")]
    UnterminatedInterpolation(String),

    #[error("invalid reference {reference:?}: {reason}")]
    InvalidReference {
        reference: String,
        reason: &'static str,
    },

    #[error("invalid walk options: {0}")]
    Options(#[from] serde_json::Error),
}

/// A dependency name that matched no vertex in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// Name of the vertex declaring the dependency.
    pub vertex: String,
    /// The dependency name as declared.
    pub reference: String,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: unknown dependency {:?}", self.vertex, self.reference)
    }
}

/// Errors raised while assembling a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unresolved references: {}", join(.0, "; "))]
    UnresolvedReferences(Vec<UnresolvedReference>),

    #[error("name collision: {name:?} is exposed by both {first:?} and {second:?}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("cycle detected: {}", format_cycles(.0))]
    Cycles(Vec<Vec<String>>),

    #[error("vertex {vertex:?} cannot be placed at module path {path}")]
    NotFlattenable { vertex: String, path: ModulePath },

    #[error("module {module:?}: {source}")]
    Module {
        module: String,
        #[source]
        source: Box<GraphError>,
    },

    #[error("configuration error in {vertex:?}: {source}")]
    Config {
        vertex: String,
        #[source]
        source: ConfigError,
    },
}

impl GraphError {
    /// Wrap an error raised inside a module's own graph.
    pub fn in_module(module: impl Into<String>, source: GraphError) -> Self {
        Self::Module {
            module: module.into(),
            source: Box::new(source),
        }
    }
}

/// Errors raised by a provider implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised by a single evaluation step.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("required variable {name:?} is not set at {path}")]
    MissingVariable { path: ModulePath, name: String },

    #[error("reference {reference:?} at {path}: {reason}")]
    BadReference {
        path: ModulePath,
        reference: String,
        reason: String,
    },

    #[error("no provider registered for {name:?}")]
    UnknownProvider { name: String },

    #[error("provider {address} is not initialized")]
    ProviderNotInitialized { address: String },

    #[error("provider {provider} failed on {address}: {source}")]
    Provider {
        provider: String,
        address: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("vertex could not be scheduled: {0}")]
    Unschedulable(String),

    #[error("evaluation panicked: {0}")]
    Panicked(String),
}

/// A vertex that failed during a walk, together with its error.
#[derive(Debug)]
pub struct VertexFailure {
    pub vertex: String,
    pub error: EvalError,
}

impl fmt::Display for VertexFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.vertex, self.error)
    }
}

/// Aggregate failure of a walk.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("{operation} failed for {} vertices: {}", .failures.len(), join(.failures, "; "))]
    Failed {
        operation: WalkOperation,
        failures: Vec<VertexFailure>,
    },

    #[error("{operation} cancelled after {completed} vertices ({} skipped)", .skipped.len())]
    Cancelled {
        operation: WalkOperation,
        completed: usize,
        skipped: Vec<String>,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;
pub type EvalResult<T> = Result<T, EvalError>;

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_every_vertex() {
        let err = GraphError::Cycles(vec![vec!["a".into(), "b".into(), "c".into()]]);
        assert_eq!(err.to_string(), "cycle detected: a -> b -> c");
    }

    #[test]
    fn unresolved_error_names_vertex_and_reference() {
        let err = GraphError::UnresolvedReferences(vec![UnresolvedReference {
            vertex: "output.y".into(),
            reference: "var.missing".into(),
        }]);
        let msg = err.to_string();
        assert!(msg.contains("output.y"));
        assert!(msg.contains("var.missing"));
    }

    #[test]
    fn module_error_wraps_source() {
        let inner = GraphError::NameCollision {
            name: "var.x".into(),
            first: "var.x".into(),
            second: "var.x".into(),
        };
        let err = GraphError::in_module("module.net", inner);
        assert!(err.to_string().starts_with("module \"module.net\""));
        assert!(std::error::Error::source(&err).is_some());
    }
}
