//! Locality scopes
//!
//! Scopes are totally ordered from coarse ([`Scope::Global`]) to fine
//! ([`Scope::Cpu`]). A domain's children always have a strictly finer scope
//! than the domain itself, so comparing scopes answers "could this domain
//! contain that one".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of a locality domain
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// All units of the team
    Global,
    /// User-defined group of domains
    Group,
    /// Network interconnect partition
    Network,
    /// Physical compute node
    Node,
    /// Hostname-addressable sub-host, e.g. an accelerator card
    Module,
    /// NUMA memory domain
    Numa,
    /// Boundary below which domains are unit-bearing
    Unit,
    /// Processor package
    Package,
    /// Uncore region of a package
    Uncore,
    /// Shared cache
    Cache,
    /// Physical core
    Core,
    /// Hardware thread
    Cpu,
}

impl Scope {
    /// All scopes from coarsest to finest
    pub const ALL: [Scope; 12] = [
        Scope::Global,
        Scope::Group,
        Scope::Network,
        Scope::Node,
        Scope::Module,
        Scope::Numa,
        Scope::Unit,
        Scope::Package,
        Scope::Uncore,
        Scope::Cache,
        Scope::Core,
        Scope::Cpu,
    ];

    /// Numeric scope value as used by the runtime's C interface
    pub fn value(self) -> i32 {
        match self {
            Scope::Global => 0,
            Scope::Group => 1,
            Scope::Network => 50,
            Scope::Node => 100,
            Scope::Module => 200,
            Scope::Numa => 300,
            Scope::Unit => 400,
            Scope::Package => 500,
            Scope::Uncore => 510,
            Scope::Cache => 530,
            Scope::Core => 550,
            Scope::Cpu => 600,
        }
    }

    /// Whether domains at this scope keep their own unit list instead of
    /// aggregating it from children.
    pub fn is_unit_bearing(self) -> bool {
        self >= Scope::Unit
    }

    /// Lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Group => "group",
            Scope::Network => "network",
            Scope::Node => "node",
            Scope::Module => "module",
            Scope::Numa => "numa",
            Scope::Unit => "unit",
            Scope::Package => "package",
            Scope::Uncore => "uncore",
            Scope::Cache => "cache",
            Scope::Core => "core",
            Scope::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Scope::ALL
            .iter()
            .copied()
            .find(|scope| scope.name() == lower)
            .ok_or_else(|| format!("unknown scope '{}'", s))
    }
}
