//! The `resolver` module turns a task path into a [`Value`].
//!
//! The first path segment selects a handler from the root [`Namespace`];
//! the rest of the path is handed to that handler untouched, which lets
//! namespaces nest arbitrarily deep. An optional trailing format directive
//! (see [`format`]) post-processes the result.

pub mod format;
pub mod namespace;
pub mod value;

pub use format::Format;
pub use namespace::{Handler, Namespace, split};
pub use value::{EnumValue, Value};

use crate::utils::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    root: Namespace,
}

impl Resolver {
    pub fn new(root: Namespace) -> Self {
        Self { root }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> Result<Value> {
        let (path, format) = Format::extract(path)?;
        let (head, tail) = split(path);

        let handler = self
            .root
            .get(head)
            .ok_or_else(|| Error::unsupported(head, path))?;
        let value = handler.handle(tail)?;

        match format {
            Some(format) => format.apply(value),
            None => Ok(value),
        }
    }
}
