use std::path::Path;
use std::sync::Mutex;

use sysinfo::{Disks, System};

use super::{percent, select};
use crate::resolver::{Handler, Namespace, Value};
use crate::utils::{Error, Result};

/// CPU utilisation since the previous call.
///
/// `sysinfo` measures usage between two refreshes, so the sampler keeps its
/// `System` across calls.
pub struct CpuPercent {
    system: Mutex<System>,
}

impl CpuPercent {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for CpuPercent {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for CpuPercent {
    fn handle(&self, path: &str) -> Result<Value> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| Error::Handler("cpu sampler is unavailable".to_string()))?;
        system.refresh_cpu();

        match path {
            "" => Ok(Value::from(system.global_cpu_info().cpu_usage())),
            "*" => Ok(Value::Seq(
                system
                    .cpus()
                    .iter()
                    .map(|cpu| Value::from(cpu.cpu_usage()))
                    .collect(),
            )),
            index => index
                .parse::<usize>()
                .ok()
                .and_then(|i| system.cpus().get(i))
                .map(|cpu| Value::from(cpu.cpu_usage()))
                .ok_or_else(|| Error::unsupported(index, path)),
        }
    }
}

pub fn cpu_count(_path: &str) -> Result<Value> {
    let mut system = System::new();
    system.refresh_cpu();
    Ok(Value::from(system.cpus().len()))
}

pub fn virtual_memory(path: &str) -> Result<Value> {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_memory();
    let used = system.used_memory();
    select(
        vec![
            ("total", Value::from(total)),
            ("available", Value::from(system.available_memory())),
            ("used", Value::from(used)),
            ("free", Value::from(system.free_memory())),
            ("percent", Value::from(percent(used, total))),
        ],
        path,
    )
}

pub fn swap_memory(path: &str) -> Result<Value> {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_swap();
    let used = system.used_swap();
    select(
        vec![
            ("total", Value::from(total)),
            ("used", Value::from(used)),
            ("free", Value::from(system.free_swap())),
            ("percent", Value::from(percent(used, total))),
        ],
        path,
    )
}

/// Usage of a mounted file system: `disk_usage/<field|*>/<mount point>`.
///
/// The mount point is everything after the field, with a leading `/`
/// added when missing, so `disk_usage/percent//` and
/// `disk_usage/percent/home` address `/` and `/home`.
pub struct DiskUsage;

impl Handler for DiskUsage {
    fn handle(&self, path: &str) -> Result<Value> {
        let (field, mount) = path
            .split_once('/')
            .ok_or_else(|| Error::Handler(format!("missing mount point in '{path}'")))?;
        let mount = if mount.starts_with('/') {
            mount.to_string()
        } else {
            format!("/{mount}")
        };

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new(&mount))
            .ok_or_else(|| Error::Handler(format!("no file system mounted at '{mount}'")))?;

        let total = disk.total_space();
        let free = disk.available_space();
        let used = total.saturating_sub(free);
        select(
            vec![
                ("total", Value::from(total)),
                ("used", Value::from(used)),
                ("free", Value::from(free)),
                ("percent", Value::from(percent(used, total))),
            ],
            field,
        )
    }
}

pub fn load_average(path: &str) -> Result<Value> {
    let load = System::load_average();
    select(
        vec![
            ("one", Value::from(load.one)),
            ("five", Value::from(load.five)),
            ("fifteen", Value::from(load.fifteen)),
        ],
        path,
    )
}

pub fn boot_time(_path: &str) -> Result<Value> {
    Ok(Value::from(System::boot_time()))
}

pub fn uptime(_path: &str) -> Result<Value> {
    Ok(Value::from(System::uptime()))
}

/// Host identification, registered as the nested `system` namespace.
pub fn host_namespace() -> Namespace {
    fn text(value: Option<String>) -> Result<Value> {
        Ok(Value::from(value.unwrap_or_default()))
    }

    Namespace::new()
        .with("name", |_: &str| text(System::name()))
        .with("kernel_version", |_: &str| text(System::kernel_version()))
        .with("os_version", |_: &str| text(System::os_version()))
        .with("host_name", |_: &str| text(System::host_name()))
}
