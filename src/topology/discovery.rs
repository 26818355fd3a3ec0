//! Accelerator module discovery
//!
//! Co-processor cards run their own OS image with their own hostname, but
//! physically sit inside a node. Only units on the card's host can see the
//! card, so each unit enumerates its local cards and the results are merged
//! over a team collective. Discovery is best-effort: any failure yields an
//! empty module list.

use crate::error::{IoResultExt, LocalityError, Result};
use crate::team::Team;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default sysfs class directory for co-processor cards
pub const DEFAULT_MIC_SYSFS_ROOT: &str = "/sys/class/mic";

/// A module host attached to a physical parent host
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleLocation {
    /// Hostname of the node the module is plugged into
    pub host: String,
    /// Hostname of the module itself
    pub module: String,
    /// NUMA domain of the parent the module is attached to
    #[serde(default)]
    pub numa_node: Option<u32>,
}

impl ModuleLocation {
    /// Module `module` inside `host`
    pub fn new(host: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            module: module.into(),
            numa_node: None,
        }
    }
}

/// Enumerates the modules attached to the local host
pub trait ModuleLocator {
    /// Modules visible from `local_host`
    fn locate(&self, local_host: &str) -> Result<Vec<ModuleLocation>>;
}

/// Locator that never reports modules
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModules;

impl ModuleLocator for NoModules {
    fn locate(&self, _local_host: &str) -> Result<Vec<ModuleLocation>> {
        Ok(Vec::new())
    }
}

/// Locator reading co-processor cards from a sysfs class directory
#[derive(Debug, Clone)]
pub struct SysfsModuleLocator {
    root: PathBuf,
}

impl Default for SysfsModuleLocator {
    fn default() -> Self {
        Self::new(DEFAULT_MIC_SYSFS_ROOT)
    }
}

impl SysfsModuleLocator {
    /// Locator scanning `root` for `micN` entries
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_numa_node(card: &Path) -> Option<u32> {
        std::fs::read_to_string(card.join("device").join("numa_node"))
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|n| u32::try_from(n).ok())
    }
}

impl ModuleLocator for SysfsModuleLocator {
    fn locate(&self, local_host: &str) -> Result<Vec<ModuleLocation>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut modules = Vec::new();
        for entry in std::fs::read_dir(&self.root).with_path(&self.root)? {
            let entry = entry.with_path(&self.root)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match name.strip_prefix("mic") {
                Some(idx) if !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()) => {}
                _ => continue,
            }

            modules.push(ModuleLocation {
                host: local_host.to_string(),
                module: format!("{}-{}", local_host, name),
                numa_node: Self::read_numa_node(&entry.path()),
            });
        }

        modules.sort();
        Ok(modules)
    }
}

/// Gather the modules seen by every unit of the team.
///
/// Blocking; every unit of the team must call it. Failures are logged and
/// reported as "no modules".
pub fn discover_modules(team: &dyn Team, locator: &dyn ModuleLocator, local_host: &str) -> Vec<ModuleLocation> {
    match try_discover_modules(team, locator, local_host) {
        Ok(modules) => {
            tracing::debug!(count = modules.len(), "accelerator discovery finished");
            modules
        }
        Err(e) => {
            tracing::warn!("accelerator discovery failed, continuing without modules: {}", e);
            Vec::new()
        }
    }
}

fn try_discover_modules(
    team: &dyn Team,
    locator: &dyn ModuleLocator,
    local_host: &str,
) -> Result<Vec<ModuleLocation>> {
    // A failing local scan still has to take part in the collective.
    let local = locator.locate(local_host).unwrap_or_else(|e| {
        tracing::warn!(host = local_host, "local module scan failed: {}", e);
        Vec::new()
    });

    let payload = serde_json::to_vec(&local)?;
    let gathered = team.all_gather(&payload)?;

    let mut modules = Vec::new();
    for (rank, bytes) in gathered.iter().enumerate() {
        let remote: Vec<ModuleLocation> = serde_json::from_slice(bytes)
            .map_err(|e| LocalityError::Collective(format!("bad module payload from rank {}: {}", rank, e)))?;
        modules.extend(remote);
    }

    modules.sort();
    modules.dedup();
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::{SoloTeam, ThreadTeam};
    use std::fs;

    struct FixedLocator(Vec<ModuleLocation>);

    impl ModuleLocator for FixedLocator {
        fn locate(&self, _local_host: &str) -> Result<Vec<ModuleLocation>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTeam;

    impl Team for BrokenTeam {
        fn id(&self) -> u32 {
            0
        }
        fn size(&self) -> usize {
            2
        }
        fn rank(&self) -> usize {
            0
        }
        fn all_gather(&self, _local: &[u8]) -> Result<Vec<Vec<u8>>> {
            Err(LocalityError::Collective("transport down".into()))
        }
    }

    #[test]
    fn test_sysfs_locator() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mic0/device")).unwrap();
        fs::write(dir.path().join("mic0/device/numa_node"), "1\n").unwrap();
        fs::create_dir_all(dir.path().join("mic1")).unwrap();
        fs::create_dir_all(dir.path().join("power")).unwrap();
        fs::create_dir_all(dir.path().join("mic")).unwrap();

        let modules = SysfsModuleLocator::new(dir.path()).locate("n7").unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].module, "n7-mic0");
        assert_eq!(modules[0].numa_node, Some(1));
        assert_eq!(modules[1].module, "n7-mic1");
        assert_eq!(modules[1].numa_node, None);
        assert!(modules.iter().all(|m| m.host == "n7"));
    }

    #[test]
    fn test_sysfs_locator_without_class_dir() {
        let locator = SysfsModuleLocator::new("/nonexistent/class/mic");
        assert!(locator.locate("n0").unwrap().is_empty());
    }

    #[test]
    fn test_discovery_merges_across_team() {
        let handles: Vec<_> = ThreadTeam::create(0, 3)
            .into_iter()
            .map(|team| {
                std::thread::spawn(move || {
                    let host = format!("n{}", team.rank());
                    let locator = if team.rank() == 1 {
                        FixedLocator(vec![ModuleLocation::new("n1", "n1-mic0")])
                    } else {
                        FixedLocator(Vec::new())
                    };
                    discover_modules(&team, &locator, &host)
                })
            })
            .collect();

        for handle in handles {
            let modules = handle.join().unwrap();
            assert_eq!(modules, vec![ModuleLocation::new("n1", "n1-mic0")]);
        }
    }

    #[test]
    fn test_discovery_degrades_on_collective_failure() {
        let locator = FixedLocator(vec![ModuleLocation::new("n0", "n0-mic0")]);
        assert!(discover_modules(&BrokenTeam, &locator, "n0").is_empty());
    }

    #[test]
    fn test_discovery_solo_team() {
        let locator = FixedLocator(vec![ModuleLocation::new("n0", "n0-mic0")]);
        let modules = discover_modules(&SoloTeam::new(0, 1), &locator, "n0");
        assert_eq!(modules.len(), 1);
    }
}
