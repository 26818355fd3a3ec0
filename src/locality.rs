//! Team locality: the entry point tying topology, discovery and the tree
//! builder together

use crate::config::LocalityConfig;
use crate::domain::{DomainNode, DomainTag, DomainTree, DomainTreeBuilder, FilterMode, Scope};
use crate::error::{LocalityError, Result};
use crate::team::Team;
use crate::topology::{discover_modules, HostTopology, ModuleLocation, ModuleLocator, NoModules, SysfsModuleLocator};
use crate::unit::{UnitId, UnitLocalityMap};
use std::collections::BTreeMap;

/// Locality hierarchy of one team
#[derive(Debug, Clone)]
pub struct Locality {
    /// Domain tree of the team
    pub tree: DomainTree,
    /// Hosts the team runs on
    pub topology: HostTopology,
    /// CORE domain of every unit
    pub unit_tags: BTreeMap<UnitId, DomainTag>,
}

impl Locality {
    /// Build the locality of `team`.
    ///
    /// Runs accelerator discovery through sysfs when enabled, which makes
    /// this a collective call: every unit of the team must make it.
    pub fn build(team: &dyn Team, units: &dyn UnitLocalityMap, config: &LocalityConfig) -> Result<Self> {
        if config.module_discovery {
            let locator = SysfsModuleLocator::new(&config.mic_sysfs_root);
            Self::build_with_locator(team, units, &locator, config)
        } else {
            Self::build_with_locator(team, units, &NoModules, config)
        }
    }

    /// Build with a custom accelerator locator
    pub fn build_with_locator(
        team: &dyn Team,
        units: &dyn UnitLocalityMap,
        locator: &dyn ModuleLocator,
        config: &LocalityConfig,
    ) -> Result<Self> {
        check_team_size(team, units)?;
        let local_host = units.lookup(team.rank() as UnitId)?.host.clone();
        let modules = discover_modules(team, locator, &local_host);
        Self::build_with_modules(team, units, &modules, config)
    }

    /// Build from an already known set of accelerator modules; no
    /// collective is involved.
    pub fn build_with_modules(
        team: &dyn Team,
        units: &dyn UnitLocalityMap,
        modules: &[ModuleLocation],
        config: &LocalityConfig,
    ) -> Result<Self> {
        check_team_size(team, units)?;

        let topology = HostTopology::from_unit_map(units, modules, config.max_host_len)
            .map_err(|e| e.with_context(format!("host topology of team {}", team.id())))?;
        let built = DomainTreeBuilder::new(&topology, units, team.id())
            .max_tag_len(config.max_tag_len)
            .build()
            .map_err(|e| e.with_context(format!("domain tree of team {}", team.id())))?;

        Ok(Self {
            tree: built.tree,
            topology,
            unit_tags: built.unit_tags,
        })
    }

    /// Domain with the given tag
    pub fn find(&self, tag: &str) -> Result<&DomainNode> {
        self.tree.find(tag)
    }

    /// CORE domain of a unit
    pub fn unit_domain(&self, unit: UnitId) -> Result<&DomainTag> {
        self.unit_tags.get(&unit).ok_or(LocalityError::UnitNotFound(unit))
    }

    /// Tags of all domains at `scope`
    pub fn domains_at_scope(&self, scope: Scope) -> Result<Vec<DomainTag>> {
        self.tree.domains_at_scope(scope)
    }

    /// Filtered copy of the domain tree
    pub fn filter<S: AsRef<str>>(&self, tags: &[S], mode: FilterMode) -> Result<DomainTree> {
        self.tree.filtered(tags, mode)
    }
}

fn check_team_size(team: &dyn Team, units: &dyn UnitLocalityMap) -> Result<()> {
    if team.size() != units.num_units() {
        return Err(LocalityError::inconsistent(
            DomainTag::ROOT,
            format!("team {} has {} units but {} are mapped", team.id(), team.size(), units.num_units()),
        ));
    }
    if team.size() == 0 {
        return Err(LocalityError::InvalidArgument(format!("team {} is empty", team.id())));
    }
    Ok(())
}
