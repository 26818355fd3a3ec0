//! Host topology of a team
//!
//! Groups units by hostname and classifies hosts into nodes and modules.
//! Module hosts are recognised by name: a host whose name extends a node's
//! name (`n01` and `n01-mic0`) is taken to live inside that node. Modules
//! reported by accelerator discovery override that heuristic.

use super::discovery::ModuleLocation;
use crate::error::{LocalityError, Result};
use crate::unit::{UnitId, UnitLocalityMap};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One distinct host of the team
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    /// Hostname
    pub hostname: String,
    /// 0 for nodes, module depth otherwise
    pub level: usize,
    /// Node this module belongs to
    pub parent: Option<String>,
    /// Distinct NUMA domains observed among resident units
    pub num_numa: usize,
    /// Resident unit ids, ascending
    pub units: Vec<UnitId>,
    /// NUMA domain of the parent the module is attached to, if reported
    pub numa_node: Option<u32>,
}

impl HostRecord {
    fn new(hostname: String) -> Self {
        Self {
            hostname,
            level: 0,
            parent: None,
            num_numa: 0,
            units: Vec::new(),
            numa_node: None,
        }
    }

    /// Whether this host is a node
    pub fn is_node(&self) -> bool {
        self.level == 0
    }
}

/// Node/module classification of all hosts in a team
#[derive(Debug, Clone, Serialize)]
pub struct HostTopology {
    hosts: Vec<HostRecord>,
    num_nodes: usize,
    num_host_levels: usize,
    max_host_units: usize,
}

impl HostTopology {
    /// Build from `(unit, hostname, numa id)` triples and discovered modules
    pub fn build<'a, I>(units: I, modules: &[ModuleLocation], max_host_len: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (UnitId, &'a str, Option<u32>)>,
    {
        let check_host = |host: &str| -> Result<()> {
            if host.is_empty() {
                Err(LocalityError::InvalidArgument("empty hostname".into()))
            } else if host.len() > max_host_len {
                Err(LocalityError::InvalidArgument(format!(
                    "hostname '{}' exceeds {} characters",
                    host, max_host_len
                )))
            } else {
                Ok(())
            }
        };

        let mut grouped: BTreeMap<String, (Vec<UnitId>, BTreeSet<u32>)> = BTreeMap::new();
        for (unit, host, numa_id) in units {
            check_host(host)?;
            let (ids, numa) = grouped.entry(host.to_string()).or_default();
            ids.push(unit);
            if let Some(numa_id) = numa_id {
                numa.insert(numa_id);
            }
        }

        let mut explicit: HashMap<String, &ModuleLocation> = HashMap::new();
        for location in modules {
            check_host(&location.host)?;
            check_host(&location.module)?;
            if location.host == location.module {
                continue;
            }
            if !grouped.contains_key(&location.module) {
                tracing::debug!(module = %location.module, "ignoring module without resident units");
                continue;
            }
            grouped.entry(location.host.clone()).or_default();
            explicit.insert(location.module.clone(), location);
        }

        let mut hosts: Vec<HostRecord> = grouped
            .into_iter()
            .map(|(hostname, (mut units, numa))| {
                units.sort_unstable();
                HostRecord {
                    num_numa: numa.len(),
                    units,
                    ..HostRecord::new(hostname)
                }
            })
            .collect();

        Self::classify(&mut hosts, &explicit);

        let num_nodes = hosts.iter().filter(|h| h.is_node()).count();
        let num_host_levels = hosts.iter().map(|h| h.level).max().unwrap_or(0);
        let max_host_units = hosts.iter().map(|h| h.units.len()).max().unwrap_or(0);

        tracing::info!(
            hosts = hosts.len(),
            nodes = num_nodes,
            modules = hosts.len() - num_nodes,
            "host topology built"
        );

        Ok(Self {
            hosts,
            num_nodes,
            num_host_levels,
            max_host_units,
        })
    }

    /// Build from a unit locality map
    pub fn from_unit_map(map: &dyn UnitLocalityMap, modules: &[ModuleLocation], max_host_len: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(map.num_units());
        for unit in map.unit_ids() {
            let info = map.lookup(unit)?;
            entries.push((unit, info.host.as_str(), info.numa_id));
        }
        Self::build(entries, modules, max_host_len)
    }

    /// Assign levels and parents.
    ///
    /// Hosts are visited shortest name first. A host becomes a module of the
    /// longest already-known node whose name is a strict prefix of its own,
    /// or a node if there is none. Explicitly reported modules are attached
    /// afterwards, always to the root node of their reported parent.
    fn classify(hosts: &mut [HostRecord], explicit: &HashMap<String, &ModuleLocation>) {
        let mut order: Vec<usize> = (0..hosts.len()).collect();
        order.sort_by(|&a, &b| {
            let (ha, hb) = (&hosts[a].hostname, &hosts[b].hostname);
            ha.len().cmp(&hb.len()).then_with(|| ha.cmp(hb))
        });

        let mut nodes: Vec<String> = Vec::new();
        for &idx in &order {
            let name = hosts[idx].hostname.clone();
            if explicit.contains_key(&name) {
                continue;
            }
            let parent = nodes
                .iter()
                .filter(|n| n.len() < name.len() && name.starts_with(n.as_str()))
                .max_by_key(|n| n.len())
                .cloned();

            match parent {
                Some(parent) => {
                    tracing::debug!(host = %name, node = %parent, "module by hostname prefix");
                    hosts[idx].level = 1;
                    hosts[idx].parent = Some(parent);
                }
                None => nodes.push(name),
            }
        }

        let parent_of: HashMap<String, Option<String>> = hosts
            .iter()
            .map(|h| (h.hostname.clone(), h.parent.clone()))
            .collect();

        for host in hosts.iter_mut() {
            let location = match explicit.get(&host.hostname) {
                Some(location) => location,
                None => continue,
            };

            // Walk up to the reported parent's node; give up on cycles.
            let mut root = location.host.clone();
            for _ in 0..explicit.len() + 1 {
                let next = match explicit.get(&root) {
                    Some(up) => Some(up.host.clone()),
                    None => parent_of.get(&root).cloned().flatten(),
                };
                match next {
                    Some(next) if next != host.hostname => root = next,
                    _ => break,
                }
            }

            if root == host.hostname || explicit.contains_key(&root) {
                tracing::warn!(host = %host.hostname, "cyclic module location, treating host as node");
                continue;
            }

            tracing::debug!(host = %host.hostname, node = %root, "module by discovery");
            host.level = 1;
            host.parent = Some(root);
            host.numa_node = location.numa_node;
        }
    }

    /// All host records, sorted by hostname
    pub fn hosts(&self) -> &[HostRecord] {
        &self.hosts
    }

    /// Number of distinct hosts
    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    /// Number of node hosts
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Deepest module level (0 for a flat topology)
    pub fn num_host_levels(&self) -> usize {
        self.num_host_levels
    }

    /// Largest number of units on a single host
    pub fn max_host_units(&self) -> usize {
        self.max_host_units
    }

    /// Record of a host
    pub fn host(&self, hostname: &str) -> Result<&HostRecord> {
        self.hosts
            .binary_search_by(|h| h.hostname.as_str().cmp(hostname))
            .map(|idx| &self.hosts[idx])
            .map_err(|_| LocalityError::HostNotFound(hostname.to_string()))
    }

    fn nodes(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.iter().filter(|h| h.is_node())
    }

    fn modules_of(&self, node: &str) -> Vec<&HostRecord> {
        self.hosts
            .iter()
            .filter(|h| h.parent.as_deref() == Some(node))
            .collect()
    }

    /// Hostname of the `i`-th node
    pub fn node(&self, i: usize) -> Result<&str> {
        self.nodes()
            .nth(i)
            .map(|h| h.hostname.as_str())
            .ok_or_else(|| LocalityError::out_of_range("node", i, self.num_nodes))
    }

    /// Number of MODULE domains below a node, counting the node itself
    /// when it hosts units
    pub fn num_modules(&self, node: &str) -> Result<usize> {
        Ok(self.node_domain_hosts(node)?.len())
    }

    /// Hostname of the `i`-th MODULE domain below a node; index `i` matches
    /// the module domain with relative index `i`
    pub fn module(&self, node: &str, i: usize) -> Result<&str> {
        let hosts = self.node_domain_hosts(node)?;
        let count = hosts.len();
        hosts.get(i).copied().ok_or_else(|| {
            LocalityError::out_of_range("module", i, count).with_context(format!("node '{}'", node))
        })
    }

    /// Hosts that become MODULE domains below a node.
    ///
    /// The node itself comes first when it has resident units or no modules
    /// at all, followed by its modules.
    pub fn node_domain_hosts(&self, node: &str) -> Result<Vec<&str>> {
        let record = self.host(node)?;
        let modules: Vec<&str> = self.modules_of(node).into_iter().map(|h| h.hostname.as_str()).collect();

        let mut hosts = Vec::with_capacity(modules.len() + 1);
        if modules.is_empty() || !record.units.is_empty() {
            hosts.push(record.hostname.as_str());
        }
        hosts.extend(modules);
        Ok(hosts)
    }

    /// Unit ids on a host, ascending.
    ///
    /// With `recursive`, units of every host whose name has `hostname` as a
    /// strict prefix are included.
    pub fn units_of_host(&self, hostname: &str, recursive: bool) -> Result<Vec<UnitId>> {
        if !recursive {
            return Ok(self.host(hostname)?.units.clone());
        }

        let mut matched = false;
        let mut units = Vec::new();
        for host in self.hosts.iter().filter(|h| h.hostname.starts_with(hostname)) {
            matched = true;
            units.extend_from_slice(&host.units);
        }

        if !matched {
            return Err(LocalityError::HostNotFound(hostname.to_string()));
        }
        units.sort_unstable();
        Ok(units)
    }

    /// Print host topology summary
    pub fn print_summary(&self) {
        println!("Host Topology:");
        println!("  Hosts: {}", self.hosts.len());
        println!("  Nodes: {}", self.num_nodes);
        println!("  Module levels: {}", self.num_host_levels);

        for node in self.nodes() {
            println!("  {} ({} units, {} NUMA)", node.hostname, node.units.len(), node.num_numa);
            for module in self.modules_of(&node.hostname) {
                print!("    {} ({} units, {} NUMA", module.hostname, module.units.len(), module.num_numa);
                if let Some(numa) = module.numa_node {
                    print!(", attached to NUMA {}", numa);
                }
                println!(")");
            }
        }
    }
}
