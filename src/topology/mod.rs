//! Host topology discovery
//!
//! Turns per-unit hostnames into a node/module hierarchy, optionally
//! enriched with accelerator cards found by [`discover_modules`].

mod discovery;
mod host;

pub use discovery::{
    discover_modules, ModuleLocation, ModuleLocator, NoModules, SysfsModuleLocator, DEFAULT_MIC_SYSFS_ROOT,
};
pub use host::{HostRecord, HostTopology};
