use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::value::Value;
use crate::utils::{Error, Result};

/// A value provider addressed by a path segment.
///
/// `path` is whatever follows the segment the handler is registered under,
/// possibly empty. Handlers that keep state between calls synchronize it
/// themselves since the dispatcher is shared by the request and schedule
/// contexts.
pub trait Handler: Send + Sync {
    fn handle(&self, path: &str) -> Result<Value>;
}

impl<F> Handler for F
where
    F: Fn(&str) -> Result<Value> + Send + Sync,
{
    fn handle(&self, path: &str) -> Result<Value> {
        self(path)
    }
}

/// Splits a task path on its first `/`. The tail is empty when there is no
/// separator.
pub fn split(path: &str) -> (&str, &str) {
    path.split_once('/').unwrap_or((path, ""))
}

/// Registry of handlers keyed by name.
///
/// A namespace is itself a handler, so nesting one inside another gives
/// hierarchical paths such as `system/host_name`.
#[derive(Clone, Default)]
pub struct Namespace {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Builder form of [`Namespace::register`].
    pub fn with(mut self, name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Handler for Namespace {
    fn handle(&self, path: &str) -> Result<Value> {
        let (head, tail) = split(path);
        match self.handlers.get(head) {
            Some(handler) => handler.handle(tail),
            None => Err(Error::unsupported(head, path)),
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("handlers", &self.names())
            .finish()
    }
}
