//! Module Scopes
//!
//! Each module instance in a flattened graph has a scope: the argument
//! expressions its caller passed (evaluated in the caller's scope) and the
//! defaults its own variables declare. The table is built per graph and
//! travels with it into every walk.

use indexmap::IndexMap;
use serde_json::Value;

use crate::config::RawConfig;

use super::ModulePath;

/// Variable sources for one module instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleScope {
    /// Argument expressions from the calling module.
    pub arguments: IndexMap<String, RawConfig>,
    /// Declared variable defaults.
    pub defaults: IndexMap<String, Value>,
}

/// Scopes of every module instance, keyed by path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeTable {
    scopes: IndexMap<ModulePath, ModuleScope>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &ModulePath) -> Option<&ModuleScope> {
        self.scopes.get(path)
    }

    pub fn insert(&mut self, path: ModulePath, scope: ModuleScope) {
        self.scopes.insert(path, scope);
    }

    pub fn paths(&self) -> impl Iterator<Item = &ModulePath> + '_ {
        self.scopes.keys()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Copy every scope of `other` below `prefix`.
    pub fn merge_at(&mut self, prefix: &ModulePath, other: &ScopeTable) {
        for (path, scope) in &other.scopes {
            self.scopes.insert(prefix.join(path), scope.clone());
        }
    }
}
