use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::value::Value;

/// Variable environment an evaluation runs in. Keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    globals: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.globals.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.globals.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

pub type ScopeHandle = Arc<RwLock<Scope>>;

/// Where invocations get their scope from.
#[derive(Debug, Clone)]
pub enum ScopeProvider {
    /// The same scope for every invocation.
    Persistent(ScopeHandle),
    /// A new empty scope for every invocation.
    Ephemeral,
}

impl ScopeProvider {
    pub fn new(retain: bool) -> Self {
        if retain {
            Self::persistent()
        } else {
            Self::Ephemeral
        }
    }

    pub fn persistent() -> Self {
        Self::Persistent(Arc::new(RwLock::new(Scope::new())))
    }

    pub fn is_retaining(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    pub fn scope(&self) -> ScopeHandle {
        match self {
            Self::Persistent(handle) => handle.clone(),
            Self::Ephemeral => Arc::new(RwLock::new(Scope::new())),
        }
    }
}
