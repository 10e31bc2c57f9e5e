//! The `handlers` module provides the built-in value handlers.
//!
//! They read host metrics through `sysinfo` and are registered in a root
//! [`Namespace`] by [`builtin`]. Record-like handlers take a field name as
//! their path, or `*` (or nothing) for every field as a mapping.

pub mod system;

use crate::resolver::{Namespace, Value};
use crate::utils::{Error, Result};

pub use system::{CpuPercent, DiskUsage};

/// The namespace of handlers available to tasks.
pub fn builtin() -> Namespace {
    Namespace::new()
        .with("cpu_percent", CpuPercent::new())
        .with("cpu_count", system::cpu_count)
        .with("virtual_memory", system::virtual_memory)
        .with("swap_memory", system::swap_memory)
        .with("disk_usage", DiskUsage)
        .with("load_average", system::load_average)
        .with("boot_time", system::boot_time)
        .with("uptime", system::uptime)
        .with("system", system::host_namespace())
}

/// Picks `path` out of `fields`, or returns all fields for `""` and `*`.
pub fn select(fields: Vec<(&str, Value)>, path: &str) -> Result<Value> {
    match path {
        "" | "*" => Ok(Value::map(fields)),
        name => fields
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::unsupported(name, path)),
    }
}

/// Percentage of `part` in `total`, rounded to one decimal.
pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 1000.0 / total as f64).round() / 10.0
}
