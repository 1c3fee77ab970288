//! Module Paths
//!
//! A [`ModulePath`] locates a vertex inside the module-nesting hierarchy.
//! The root module has the empty path; each nested module instance adds one
//! segment (for a call named `net`, the segment is `module.net`).
//!
//! Flattened names are the path segments joined with [`SEPARATOR`] followed
//! by the vertex's unqualified name, so `output.z` at `["module.net"]`
//! becomes `module.net.output.z`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Separator used when joining path segments and names.
pub const SEPARATOR: &str = ".";

/// Ordered sequence of module-instance identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(SmallVec<[String; 4]>);

impl ModulePath {
    /// The root module path.
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of a nested module one level below this one.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Concatenate `other` below this path.
    pub fn join(&self, other: &ModulePath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Path of the enclosing module, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.0.clone();
        segments.pop();
        Some(Self(segments))
    }

    /// The joined prefix string; empty at the root.
    pub fn prefix(&self) -> String {
        self.0.join(SEPARATOR)
    }

    /// Qualify `name` with this path's prefix.
    pub fn qualify(&self, name: &str) -> String {
        if self.is_root() {
            name.to_string()
        } else {
            format!("{}{}{}", self.prefix(), SEPARATOR, name)
        }
    }

    /// Qualify every name in `names`.
    pub fn qualify_all<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| self.qualify(name.as_ref()))
            .collect()
    }

    /// Strip this path's prefix from a qualified name; `None` when `name`
    /// lies outside this module.
    pub fn localize<'n>(&self, name: &'n str) -> Option<&'n str> {
        if self.is_root() {
            return Some(name);
        }
        name.strip_prefix(&self.prefix())?.strip_prefix(SEPARATOR)
    }
}

impl<S: Into<String>> FromIterator<S> for ModulePath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("root")
        } else {
            f.write_str(&self.prefix())
        }
    }
}
