//! Units and their hardware descriptors
//!
//! A unit is one participating process of a team. Each unit carries a
//! [`UnitHardwareInfo`] describing where it runs.

mod hwinfo;
mod mapping;

pub use hwinfo::{UnitHardwareInfo, CACHE_LEVELS};
pub use mapping::{TeamLayout, UnitLocalityMap, UnitMapping};

/// Team-relative unit id
pub type UnitId = u32;
