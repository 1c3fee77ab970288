//! Stratum Core
//!
//! This crate provides the dependency-graph engine behind the Stratum
//! infrastructure provisioner. It implements:
//!
//! - A vertex capability model for heterogeneous work items
//! - Dependency resolution by name, with module-prefix matching
//! - Flattening of nested modules into one path-qualified graph
//! - Parallel, cancellable walks with operation-filtered eval trees
//! - Graphviz DOT rendering
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `config`: Parsed declarations (modules, variables, resources, outputs)
//! - `vertex`: The `Vertex` trait, its capabilities, and the vertex kinds
//! - `graph`: Graph storage, resolution, flattening, building, rendering
//! - `eval`: Eval trees, steps, the evaluation context, provider interface
//! - `walk`: The parallel walk driver
//! - `engine`: One entry point per operation
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_core::{Engine, Module, Output, Variable};
//! use serde_json::json;
//!
//! let module = Module::new()
//!     .with_variable(Variable::new("x"))
//!     .with_output(Output::new("y", json!("${var.x}")));
//!
//! let engine = Engine::new(module).with_variable("x", "hello");
//! let ctx = engine.apply().await?.into_result()?;
//! assert_eq!(ctx.output(&ModulePath::root(), "y"), Some(json!("hello")));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod graph;
pub mod vertex;
pub mod walk;

pub use config::{
    ErrorPolicy, Module, ModuleCall, Output, ProviderConfig, RawConfig, Resource, Variable,
    WalkOptions,
};
pub use engine::Engine;
pub use error::{ConfigError, EvalError, GraphError, ProviderError, VertexFailure, WalkError};
pub use eval::{
    Address, EvalContext, ProviderFactory, ResourceDiff, ResourceProvider, ResourceState, State,
    WalkOperation,
};
pub use graph::{DotOpts, Graph, GraphBuilder, ModulePath};
pub use vertex::Vertex;
pub use walk::{SkipReason, VertexState, WalkResult, Walker};
