use super::{Proxy, Vertex};

/// Name of the single root vertex.
pub const ROOT_NAME: &str = "root";

/// Proxy vertex that depends on every vertex nothing else depends on, so
/// the graph has a single sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootNode;

impl Vertex for RootNode {
    fn name(&self) -> &str {
        ROOT_NAME
    }

    fn as_proxy(&self) -> Option<&dyn Proxy> {
        Some(self)
    }
}

impl Proxy for RootNode {}
