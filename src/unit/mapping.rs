//! Unit locality lookup
//!
//! The tree builder reads per-unit hardware through the [`UnitLocalityMap`]
//! trait. [`UnitMapping`] is the in-memory implementation, and
//! [`TeamLayout`] is its on-disk JSON form used by the CLI and tests.

use super::hwinfo::UnitHardwareInfo;
use super::UnitId;
use crate::error::{collect_errors, IoResultExt, LocalityError, Result};
use crate::team::TeamId;
use crate::topology::ModuleLocation;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-unit hardware lookup supplied by the runtime
pub trait UnitLocalityMap {
    /// Number of units in the team
    fn num_units(&self) -> usize;

    /// Hardware descriptor of a unit
    fn lookup(&self, unit: UnitId) -> Result<&UnitHardwareInfo>;

    /// All unit ids in ascending order
    fn unit_ids(&self) -> Vec<UnitId> {
        (0..self.num_units() as UnitId).collect()
    }
}

/// Hardware descriptors indexed by unit id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitMapping {
    units: Vec<UnitHardwareInfo>,
}

impl UnitMapping {
    /// Create a mapping where unit `i` is `units[i]`
    pub fn new(units: Vec<UnitHardwareInfo>) -> Self {
        Self { units }
    }

    /// Check every unit's hostname, reporting all offenders at once
    pub fn validate(&self, max_host_len: usize) -> Result<()> {
        let results = self
            .units
            .iter()
            .enumerate()
            .map(|(unit, info)| {
                if info.host.is_empty() {
                    Err(LocalityError::InvalidArgument(format!("unit {} has no hostname", unit)))
                } else if info.host.len() > max_host_len {
                    Err(LocalityError::InvalidArgument(format!(
                        "hostname '{}' of unit {} exceeds {} characters",
                        info.host, unit, max_host_len
                    )))
                } else {
                    Ok(())
                }
            })
            .collect();

        collect_errors(results).map(|_| ())
    }

    /// Iterate over `(unit id, descriptor)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &UnitHardwareInfo)> {
        self.units.iter().enumerate().map(|(i, info)| (i as UnitId, info))
    }
}

impl UnitLocalityMap for UnitMapping {
    fn num_units(&self) -> usize {
        self.units.len()
    }

    fn lookup(&self, unit: UnitId) -> Result<&UnitHardwareInfo> {
        self.units
            .get(unit as usize)
            .ok_or(LocalityError::UnitNotFound(unit))
    }
}

/// A team's units and known accelerator modules, as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamLayout {
    /// Team id
    #[serde(default)]
    pub team: TeamId,
    /// Hardware descriptor per unit; the position is the unit id
    pub units: UnitMapping,
    /// Accelerator modules reported for the team's hosts
    #[serde(default)]
    pub modules: Vec<ModuleLocation>,
}

impl TeamLayout {
    /// Parse a layout from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a layout from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Self::from_json_str(&content).map_err(|e| e.with_context(format!("parsing {}", path.display())))
    }

    /// Write the layout as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_lookup() {
        let map = UnitMapping::new(vec![UnitHardwareInfo::new("n0"), UnitHardwareInfo::new("n1")]);
        assert_eq!(map.num_units(), 2);
        assert_eq!(map.lookup(1).unwrap().host, "n1");
        assert_eq!(map.lookup(2).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(map.unit_ids(), vec![0, 1]);
    }

    #[test]
    fn test_validate_reports_all_bad_hosts() {
        let map = UnitMapping::new(vec![
            UnitHardwareInfo::new(""),
            UnitHardwareInfo::new("n0"),
            UnitHardwareInfo::new("a-very-long-hostname"),
        ]);
        assert!(map.validate(64).is_err());
        match map.validate(8) {
            Err(LocalityError::MultipleErrors { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_layout_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("team.json");

        let layout = TeamLayout {
            team: 3,
            units: UnitMapping::new(vec![UnitHardwareInfo::new("h0-a").with_numa(0)]),
            modules: vec![ModuleLocation::new("h0", "h0-a")],
        };
        layout.save(&path).unwrap();

        let loaded = TeamLayout::from_json_file(&path).unwrap();
        assert_eq!(loaded.team, 3);
        assert_eq!(loaded.units, layout.units);
        assert_eq!(loaded.modules, layout.modules);
    }

    #[test]
    fn test_layout_minimal_json() {
        let layout = TeamLayout::from_json_str(r#"{"units":[{"host":"n0"},{"host":"n1"}]}"#).unwrap();
        assert_eq!(layout.team, 0);
        assert_eq!(layout.units.num_units(), 2);
        assert!(layout.modules.is_empty());
    }

    #[test]
    fn test_missing_file_has_path() {
        let err = TeamLayout::from_json_file(Path::new("/nonexistent/team.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
