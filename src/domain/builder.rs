//! Construction of the locality domain tree
//!
//! The tree is materialized top-down, one scope at a time:
//!
//! ```text
//! GLOBAL -> NODE -> MODULE -> NUMA -> PACKAGE -> CACHE -> CORE
//! ```
//!
//! Each step partitions the parent's unit list and core count among the
//! children. Totals that depend on children are left to
//! [`DomainTree::update_subdomains`], which [`DomainTreeBuilder::build`]
//! runs once the structure is complete.

use super::scope::Scope;
use super::tag::DomainTag;
use super::tree::{DomainId, DomainTree};
use crate::error::{LocalityError, Result};
use crate::team::TeamId;
use crate::topology::HostTopology;
use crate::unit::{UnitHardwareInfo, UnitId, UnitLocalityMap};
use std::collections::{BTreeMap, BTreeSet};

/// Cache level whose ids separate packages
const PACKAGE_CACHE_LEVEL: usize = 3;
/// Cache level whose ids separate shared-cache domains inside a package
const SHARED_CACHE_LEVEL: usize = 2;

const MB: u64 = 1024 * 1024;

/// Split `total` into `parts` shares that differ by at most one.
///
/// The first `total % parts` shares get the extra one, so 10 split 3 ways is
/// `[4, 3, 3]`.
pub fn balanced_split(total: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let remainder = total % parts;
    (0..parts)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// A freshly built tree with the unit to CORE-domain assignment
#[derive(Debug, Clone)]
pub struct BuiltTree {
    /// The domain tree
    pub tree: DomainTree,
    /// CORE domain of every unit
    pub unit_tags: BTreeMap<UnitId, DomainTag>,
}

/// What a child domain starts out with
#[derive(Debug)]
struct ChildSpec {
    scope: Scope,
    host: Option<String>,
    unit_ids: Vec<UnitId>,
    num_cores: usize,
    num_nodes: usize,
    shared_mem_bytes: Option<u64>,
}

impl ChildSpec {
    fn new(scope: Scope, unit_ids: Vec<UnitId>, num_cores: usize) -> Self {
        Self {
            scope,
            host: None,
            unit_ids,
            num_cores,
            num_nodes: 1,
            shared_mem_bytes: None,
        }
    }
}

/// Builds the domain tree of a team from its host topology and unit hardware
pub struct DomainTreeBuilder<'a> {
    topology: &'a HostTopology,
    units: &'a dyn UnitLocalityMap,
    team: TeamId,
    max_tag_len: usize,
}

impl<'a> DomainTreeBuilder<'a> {
    /// Builder for team `team`
    pub fn new(topology: &'a HostTopology, units: &'a dyn UnitLocalityMap, team: TeamId) -> Self {
        Self {
            topology,
            units,
            team,
            max_tag_len: crate::config::DEFAULT_MAX_TAG_LEN,
        }
    }

    /// Set the longest permitted domain tag
    pub fn max_tag_len(mut self, max_tag_len: usize) -> Self {
        self.max_tag_len = max_tag_len;
        self
    }

    /// Build the tree and aggregate its totals
    pub fn build(&self) -> Result<BuiltTree> {
        let mut built = self.build_structure()?;
        built.tree.update_subdomains()?;
        built.tree.check_invariants()?;

        tracing::info!(
            team = self.team,
            domains = built.tree.len(),
            units = built.unit_tags.len(),
            "locality domain tree built"
        );
        Ok(built)
    }

    /// Build the tree structure without the aggregation pass
    pub fn build_structure(&self) -> Result<BuiltTree> {
        let mut tree = DomainTree::new(Scope::Global, self.team, self.max_tag_len);
        let root = tree.root_id()?;
        {
            let node = tree.node_mut(root);
            node.unit_ids = self.units.unit_ids();
            node.num_units = self.units.num_units();
            node.num_nodes = self.topology.num_nodes();
        }

        let mut unit_tags = BTreeMap::new();
        self.expand(&mut tree, root, &mut unit_tags)?;
        Ok(BuiltTree { tree, unit_tags })
    }

    /// Materialize the children of `id` and recurse into them
    fn expand(&self, tree: &mut DomainTree, id: DomainId, unit_tags: &mut BTreeMap<UnitId, DomainTag>) -> Result<()> {
        let (scope, host, unit_ids, num_cores) = {
            let node = tree.node(id);
            if node.num_units > 0 && node.unit_ids.len() != node.num_units {
                return Err(LocalityError::inconsistent(
                    node.tag.as_str(),
                    format!("claims {} units but lists {}", node.num_units, node.unit_ids.len()),
                ));
            }
            (node.scope, node.host.clone(), node.unit_ids.clone(), node.num_cores)
        };

        let specs = match scope {
            Scope::Global => self.node_domains()?,
            Scope::Node => {
                let host = host.ok_or_else(|| {
                    LocalityError::inconsistent(tree.node(id).tag.as_str(), "node domain without host")
                })?;
                self.module_domains(&host, num_cores)?
            }
            Scope::Module => self.numa_domains(&unit_ids, num_cores)?,
            Scope::Numa => self.cache_domains(&unit_ids, num_cores, PACKAGE_CACHE_LEVEL, Scope::Package)?,
            Scope::Package => self.cache_domains(&unit_ids, num_cores, SHARED_CACHE_LEVEL, Scope::Cache)?,
            Scope::Cache => self.core_domains(&unit_ids, num_cores)?,
            _ => Vec::new(),
        };

        if specs.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            tag = %tree.node(id).tag,
            scope = %scope,
            children = specs.len(),
            "expanding domain"
        );

        for spec in specs {
            let child_scope = spec.scope;
            let child = tree.push_child(id, child_scope)?;
            {
                let node = tree.node_mut(child);
                node.host = spec.host;
                node.num_units = spec.unit_ids.len();
                node.unit_ids = spec.unit_ids;
                node.num_cores = spec.num_cores;
                node.num_nodes = spec.num_nodes;
                node.shared_mem_bytes = spec.shared_mem_bytes;
            }

            if child_scope == Scope::Core {
                let node = tree.node(child);
                for &unit in &node.unit_ids {
                    unit_tags.insert(unit, node.tag.clone());
                }
            }

            self.expand(tree, child, unit_tags)?;
        }

        Ok(())
    }

    fn hardware(&self, units: &[UnitId]) -> Result<Vec<&UnitHardwareInfo>> {
        units.iter().map(|&u| self.units.lookup(u)).collect()
    }

    /// GLOBAL -> NODE: one domain per node host
    fn node_domains(&self) -> Result<Vec<ChildSpec>> {
        let mut specs = Vec::with_capacity(self.topology.num_nodes());
        for i in 0..self.topology.num_nodes() {
            let host = self.topology.node(i)?;
            let units = self.topology.units_of_host(host, true)?;
            let hw = self.hardware(&units)?;

            let cores = hw.iter().map(|h| h.num_cores).max().unwrap_or(0);
            let memory = hw.iter().filter_map(|h| h.system_memory_mb).max();

            let mut spec = ChildSpec::new(Scope::Node, units, cores);
            spec.host = Some(host.to_string());
            spec.shared_mem_bytes = memory.map(|mb| mb * MB);
            specs.push(spec);
        }
        Ok(specs)
    }

    /// NODE -> MODULE: one domain per module host, or the node itself
    fn module_domains(&self, node_host: &str, num_cores: usize) -> Result<Vec<ChildSpec>> {
        let hosts = self
            .topology
            .node_domain_hosts(node_host)
            .map_err(|e| e.with_context(format!("modules of node '{}'", node_host)))?;
        let cores = balanced_split(num_cores, hosts.len());

        let mut specs = Vec::with_capacity(hosts.len());
        for (host, cores) in hosts.into_iter().zip(cores) {
            let units = self.topology.units_of_host(host, false)?;
            let memory = self.hardware(&units)?.iter().filter_map(|h| h.system_memory_mb).max();

            let mut spec = ChildSpec::new(Scope::Module, units, cores);
            spec.host = Some(host.to_string());
            spec.shared_mem_bytes = memory.map(|mb| mb * MB);
            specs.push(spec);
        }
        Ok(specs)
    }

    /// MODULE -> NUMA: group units by NUMA id, unknown ids first
    fn numa_domains(&self, units: &[UnitId], num_cores: usize) -> Result<Vec<ChildSpec>> {
        let mut groups: BTreeMap<Option<u32>, Vec<UnitId>> = BTreeMap::new();
        let mut memory: BTreeMap<Option<u32>, u64> = BTreeMap::new();
        for (&unit, hw) in units.iter().zip(self.hardware(units)?) {
            groups.entry(hw.numa_id).or_default().push(unit);
            if let Some(mb) = hw.numa_memory_mb {
                memory.entry(hw.numa_id).or_insert(mb * MB);
            }
        }

        let cores = balanced_split(num_cores, groups.len());
        Ok(groups
            .into_iter()
            .zip(cores)
            .map(|((numa_id, units), cores)| {
                let mut spec = ChildSpec::new(Scope::Numa, units, cores);
                spec.shared_mem_bytes = memory.get(&numa_id).copied();
                spec
            })
            .collect())
    }

    /// NUMA -> PACKAGE and PACKAGE -> CACHE.
    ///
    /// One child per distinct cache id at `level`, units and cores divided
    /// evenly. Without any cache ids a package step yields a single package
    /// and a cache step goes straight to cores.
    fn cache_domains(&self, units: &[UnitId], num_cores: usize, level: usize, scope: Scope) -> Result<Vec<ChildSpec>> {
        let hw = self.hardware(units)?;
        let distinct: BTreeSet<u32> = hw.iter().filter_map(|h| h.cache_id(level)).collect();

        let count = match distinct.len() {
            0 if scope == Scope::Cache => return self.core_domains(units, num_cores),
            0 => 1,
            n => n,
        };
        let count = count.min(units.len()).max(1);

        let unit_shares = balanced_split(units.len(), count);
        let core_shares = balanced_split(num_cores, count);

        let mut specs = Vec::with_capacity(count);
        let mut offset = 0;
        for (share, cores) in unit_shares.into_iter().zip(core_shares) {
            let chunk = &units[offset..offset + share];
            let mut spec = ChildSpec::new(scope, chunk.to_vec(), cores);
            spec.shared_mem_bytes = hw.get(offset).and_then(|h| h.cache_size(level));
            specs.push(spec);
            offset += share;
        }
        Ok(specs)
    }

    /// CACHE/PACKAGE -> CORE: one domain per unit
    fn core_domains(&self, units: &[UnitId], num_cores: usize) -> Result<Vec<ChildSpec>> {
        let hw = self.hardware(units)?;
        let cores = balanced_split(num_cores, units.len());
        Ok(units
            .iter()
            .zip(hw)
            .zip(cores)
            .map(|((&unit, h), cores)| {
                let mut spec = ChildSpec::new(Scope::Core, vec![unit], cores);
                spec.shared_mem_bytes = h.cache_size(1);
                spec
            })
            .collect())
    }
}
