//! # pgas-locality - Locality Domains for PGAS Teams
//!
//! pgas-locality computes where the units of a PGAS team live in the
//! machine hierarchy and exposes it as a tree of locality domains: nodes,
//! accelerator modules, NUMA domains, packages, shared caches and cores.
//!
//! ## Features
//!
//! - **Host Topology**: Classifies hostnames into compute nodes and modules
//! - **Accelerator Discovery**: Optional team-wide search for co-processor cards
//! - **Domain Trees**: Deterministic trees addressed by dotted tags like `".0.1.2"`
//! - **Queries**: Lookup by tag, common parents, scope listings and balanced splits
//! - **Editing**: Keep/remove filters on private copies with re-aggregation
//! - **Rendering**: Nested JSON and indented text views
//!
//! ## Quick Start
//!
//! ```no_run
//! use pgas_locality::config::LocalityConfig;
//! use pgas_locality::team::SoloTeam;
//! use pgas_locality::unit::{TeamLayout, UnitLocalityMap};
//! use pgas_locality::Locality;
//! use std::path::Path;
//!
//! let layout = TeamLayout::from_json_file(Path::new("layout.json")).unwrap();
//! let team = SoloTeam::new(layout.team, layout.units.num_units());
//!
//! let locality = Locality::build_with_modules(
//!     &team,
//!     &layout.units,
//!     &layout.modules,
//!     &LocalityConfig::default(),
//! ).unwrap();
//!
//! locality.tree.print_summary();
//! ```
//!
//! ## Queries and Filters
//!
//! ```no_run
//! use pgas_locality::domain::{FilterMode, Scope};
//! # use pgas_locality::config::LocalityConfig;
//! # use pgas_locality::team::SoloTeam;
//! # use pgas_locality::unit::{TeamLayout, UnitLocalityMap};
//! # use pgas_locality::Locality;
//! # let layout = TeamLayout::from_json_str("{}").unwrap();
//! # let team = SoloTeam::new(0, layout.units.num_units());
//! # let locality = Locality::build(&team, &layout.units, &LocalityConfig::default()).unwrap();
//!
//! let numa = locality.domains_at_scope(Scope::Numa).unwrap();
//! println!("{} NUMA domains", numa.len());
//!
//! let node = locality.find(".0").unwrap();
//! println!("node {:?} holds units {:?}", node.host, node.unit_ids);
//!
//! // The filtered tree is a copy; `locality.tree` is unchanged
//! let rest = locality.filter(&[".0"], FilterMode::Remove).unwrap();
//! println!("{}", rest.render_text());
//! ```
//!
//! ## Hardware Detection
//!
//! ```no_run
//! use pgas_locality::unit::UnitHardwareInfo;
//!
//! let info = UnitHardwareInfo::detect();
//! info.print_summary();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod error;
pub mod locality;
pub mod team;
pub mod topology;
pub mod unit;

// Re-export commonly used types
pub use config::LocalityConfig;
pub use domain::{DomainNode, DomainTag, DomainTree, FilterMode, Scope};
pub use error::{LocalityError, Result};
pub use locality::Locality;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use pgas_locality::prelude::*;
    //! ```

    pub use crate::config::LocalityConfig;
    pub use crate::domain::{filter, DomainNode, DomainTag, DomainTree, DomainTreeBuilder, FilterMode, Scope};
    pub use crate::error::{LocalityError, Result};
    pub use crate::locality::Locality;
    pub use crate::team::{SoloTeam, Team, ThreadTeam};
    pub use crate::topology::{HostTopology, ModuleLocation};
    pub use crate::unit::{TeamLayout, UnitHardwareInfo, UnitLocalityMap, UnitMapping};
}
