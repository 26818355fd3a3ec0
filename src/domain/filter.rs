//! Structural edits of a domain tree
//!
//! Filtering never shrinks the tree in place: the retained domains are
//! copied into a fresh arena which replaces the old one only once the whole
//! pass succeeded. [`DomainTree::update_subdomains`] restores totals, unit
//! lists and labels afterwards and follows the same copy-then-replace rule.

use super::scope::Scope;
use super::tag::DomainTag;
use super::tree::{DomainId, DomainNode, DomainTree};
use crate::error::{LocalityError, Result};

/// How filter tags select child domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep only domains on the path to a filter tag
    Keep,
    /// Drop domains at or below a filter tag
    Remove,
}

impl FilterMode {
    fn retains(self, tag: &DomainTag, filter: &[DomainTag]) -> bool {
        match self {
            FilterMode::Keep => filter.iter().any(|f| tag.is_prefix_of(f)),
            FilterMode::Remove => !filter.iter().any(|f| f.is_prefix_of(tag)),
        }
    }
}

impl DomainTree {
    /// Drop child domains according to `tags` and `mode`.
    ///
    /// Domains at unit-bearing scope keep all of their children. Unit lists
    /// of filtered domains are compacted; other totals are left for
    /// [`update_subdomains`](Self::update_subdomains).
    pub fn filter_subdomains<S: AsRef<str>>(&mut self, tags: &[S], mode: FilterMode) -> Result<()> {
        let root = self.root_id()?;
        if tags.is_empty() {
            return Err(LocalityError::EmptyFilter);
        }
        let tags = DomainTag::parse_all(tags, self.max_tag_len)?;

        let mut nodes = Vec::new();
        nodes.try_reserve(self.nodes.len())?;
        self.copy_filtered(root, None, &tags, mode, &mut nodes)?;

        tracing::debug!(
            mode = ?mode,
            before = self.nodes.len(),
            after = nodes.len(),
            "filtered domain tree"
        );
        self.nodes = nodes;
        Ok(())
    }

    fn copy_filtered(
        &self,
        src: DomainId,
        parent: Option<DomainId>,
        tags: &[DomainTag],
        mode: FilterMode,
        out: &mut Vec<DomainNode>,
    ) -> Result<DomainId> {
        let source = self.node(src);
        let filtering = !source.scope.is_unit_bearing();

        let id = out.len() as DomainId;
        let mut node = source.clone();
        node.parent = parent;
        node.children = Vec::new();
        out.push(node);

        let mut children = Vec::new();
        for &child in &source.children {
            if filtering && !mode.retains(&self.node(child).tag, tags) {
                continue;
            }
            children.try_reserve(1)?;
            children.push(self.copy_filtered(child, Some(id), tags, mode, out)?);
        }

        if filtering && !source.children.is_empty() {
            let mut units = Vec::new();
            for &child in &children {
                let child_units = &out[child as usize].unit_ids;
                units.try_reserve(child_units.len())?;
                units.extend_from_slice(child_units);
            }
            out[id as usize].num_units = units.len();
            out[id as usize].unit_ids = units;
        }
        out[id as usize].children = children;

        Ok(id)
    }

    /// Recompute totals, unit lists and labels below the root.
    ///
    /// For every domain above unit-bearing scope, the unit list becomes the
    /// concatenation of the children's lists, and `num_units`, `num_cores`
    /// and `num_nodes` become sums over the children; a domain left without
    /// children ends up empty. Every descendant is relabelled from its
    /// position. Running it twice changes nothing.
    pub fn update_subdomains(&mut self) -> Result<()> {
        let root = self.root_id()?;
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(self.nodes.len())?;
        nodes.extend(self.nodes.iter().cloned());

        relabel(&mut nodes, root, self.max_tag_len)?;

        for id in self.post_order(root) {
            let node = &nodes[id as usize];
            if node.scope.is_unit_bearing() {
                continue;
            }

            let mut units = Vec::new();
            let (mut cores, mut hosts) = (0, 0);
            for &child in &node.children {
                let child = &nodes[child as usize];
                units.try_reserve(child.unit_ids.len())?;
                units.extend_from_slice(&child.unit_ids);
                cores += child.num_cores;
                hosts += child.num_nodes;
            }

            let node = &mut nodes[id as usize];
            node.num_units = units.len();
            node.unit_ids = units;
            node.num_cores = cores;
            if node.scope < Scope::Node {
                node.num_nodes = hosts;
            }
        }

        self.nodes = nodes;
        Ok(())
    }

    /// Filtered and re-aggregated copy of this tree
    pub fn filtered<S: AsRef<str>>(&self, tags: &[S], mode: FilterMode) -> Result<DomainTree> {
        let mut copy = self.copy()?;
        copy.filter_subdomains(tags, mode)?;
        copy.update_subdomains()?;
        Ok(copy)
    }
}

/// Relabel every descendant of `start` from its position among siblings
fn relabel(nodes: &mut [DomainNode], start: DomainId, max_tag_len: usize) -> Result<()> {
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let (tag, level, team, children) = {
            let node = &nodes[id as usize];
            (node.tag.clone(), node.level, node.team, node.children.clone())
        };

        for (index, &child) in children.iter().enumerate() {
            let node = &mut nodes[child as usize];
            node.tag = tag.child(index, max_tag_len)?;
            node.level = level + 1;
            node.relative_index = index;
            node.team = team;
            node.parent = Some(id);
            stack.push(child);
        }
    }
    Ok(())
}

/// Filtered copy of `tree`; the argument is left untouched
pub fn filter<S: AsRef<str>>(tree: &DomainTree, tags: &[S], mode: FilterMode) -> Result<DomainTree> {
    tree.filtered(tags, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainTreeBuilder;
    use crate::error::ErrorKind;
    use crate::topology::{HostTopology, ModuleLocation};
    use crate::unit::{UnitHardwareInfo, UnitMapping};
    use proptest::prelude::*;

    fn build(units: Vec<UnitHardwareInfo>, modules: &[ModuleLocation]) -> DomainTree {
        let map = UnitMapping::new(units);
        let topology = HostTopology::from_unit_map(&map, modules, 64).unwrap();
        DomainTreeBuilder::new(&topology, &map, 0).build().unwrap().tree
    }

    fn module_split_tree() -> DomainTree {
        let units = (0..4)
            .map(|u| UnitHardwareInfo::new(if u < 2 { "h0-a" } else { "h0-b" }).with_cores(4).with_numa(0))
            .collect();
        build(units, &[ModuleLocation::new("h0", "h0-a"), ModuleLocation::new("h0", "h0-b")])
    }

    fn cluster_tree() -> DomainTree {
        let mut units = Vec::new();
        for node in 0..3u32 {
            for u in 0..4u32 {
                units.push(
                    UnitHardwareInfo::new(format!("node{}", node))
                        .with_cores(8)
                        .with_numa(u / 2)
                        .with_cache_id(3, u / 2)
                        .with_cache_id(2, u),
                );
            }
        }
        build(units, &[])
    }

    #[test]
    fn test_remove_module() {
        let tree = module_split_tree();
        let mut copy = tree.copy().unwrap();
        copy.filter_subdomains(&[".0.1"], FilterMode::Remove).unwrap();
        copy.update_subdomains().unwrap();

        let node = copy.find(".0").unwrap();
        assert_eq!(node.num_domains(), 1);
        assert_eq!(node.num_units, 2);
        assert_eq!(node.unit_ids, vec![0, 1]);
        assert_eq!(copy.root().unwrap().num_units, 2);
        assert!(copy.find(".0.1").is_err());
        copy.check_invariants().unwrap();

        // the source tree is untouched
        assert_eq!(tree.find(".0").unwrap().num_units, 4);
        assert_eq!(tree.find(".0.1").unwrap().unit_ids, vec![2, 3]);
    }

    #[test]
    fn test_remove_relabels_siblings() {
        let tree = cluster_tree();
        let filtered = filter(&tree, &[".0"], FilterMode::Remove).unwrap();

        assert_eq!(filtered.domains_at_scope(Scope::Node).unwrap().len(), 2);
        let first = filtered.find(".0").unwrap();
        assert_eq!(first.host.as_deref(), Some("node1"));
        assert_eq!(first.unit_ids, vec![4, 5, 6, 7]);
        assert_eq!(filtered.root().unwrap().num_nodes, 2);
        assert_eq!(filtered.root().unwrap().num_units, 8);
        assert_eq!(filtered.unit_domain_tags().unwrap().len(), 8);
        filtered.check_invariants().unwrap();
    }

    #[test]
    fn test_keep_retains_only_the_path() {
        let tree = cluster_tree();
        let kept = tree.filtered(&[".1.0.1"], FilterMode::Keep).unwrap();

        assert_eq!(kept.domains_at_scope(Scope::Node).unwrap().len(), 1);
        assert_eq!(kept.domains_at_scope(Scope::Numa).unwrap().len(), 1);
        let numa = kept.find(".0.0.0").unwrap();
        assert_eq!(numa.scope, Scope::Numa);
        assert!(numa.is_leaf());
        assert_eq!(numa.num_units, 0);
        assert_eq!(numa.num_cores, 0);
        assert!(kept.root().unwrap().unit_ids.is_empty());
        assert!(kept.domains_at_scope(Scope::Core).unwrap().is_empty());
        kept.check_invariants().unwrap();
    }

    #[test]
    fn test_keep_node_drops_its_modules() {
        let tree = module_split_tree();
        let kept = tree.filtered(&[".0"], FilterMode::Keep).unwrap();

        let node = kept.find(".0").unwrap();
        assert_eq!(node.num_domains(), 0);
        assert_eq!(node.num_units, 0);
        assert!(node.unit_ids.is_empty());
        kept.check_invariants().unwrap();
    }

    #[test]
    fn test_keep_unit_bearing_domain_keeps_its_subtree() {
        let tree = cluster_tree();
        let kept = tree.filtered(&[".2.0.0.0"], FilterMode::Keep).unwrap();

        assert_eq!(kept.find(".0.0.0.0").unwrap().scope, Scope::Package);
        assert_eq!(kept.root().unwrap().unit_ids, vec![8, 9]);
        assert_eq!(kept.domains_at_scope(Scope::Core).unwrap().len(), 2);
        kept.check_invariants().unwrap();
    }

    #[test]
    fn test_keep_is_segment_aware() {
        let mut units = Vec::new();
        for node in 0..12 {
            units.push(UnitHardwareInfo::new(format!("n{:02}", node)));
        }
        let tree = build(units, &[]);
        let kept = tree.filtered(&[".10.0.0.0"], FilterMode::Keep).unwrap();
        assert_eq!(kept.domains_at_scope(Scope::Node).unwrap().len(), 1);
        assert_eq!(kept.find(".0").unwrap().host.as_deref(), Some("n10"));
        assert_eq!(kept.root().unwrap().unit_ids, vec![10]);
    }

    #[test]
    fn test_emptied_domain_drops_its_totals() {
        let tree = module_split_tree();
        let filtered = tree.filtered(&[".0.0", ".0.1"], FilterMode::Remove).unwrap();

        let node = filtered.find(".0").unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.num_units, 0);
        assert_eq!(node.num_cores, 0);
        let root = filtered.root().unwrap();
        assert_eq!(root.num_units, 0);
        assert_eq!(root.num_cores, 0);
        filtered.check_invariants().unwrap();

        let mut again = filtered.clone();
        again.update_subdomains().unwrap();
        assert_eq!(again, filtered);
    }

    #[test]
    fn test_unit_bearing_scopes_are_not_filtered() {
        let tree = cluster_tree();
        let package = ".0.0.0.0";
        let core = ".0.0.0.0.0.0";
        assert_eq!(tree.find(package).unwrap().scope, Scope::Package);

        let filtered = tree.filtered(&[core], FilterMode::Remove).unwrap();
        assert_eq!(filtered, {
            let mut t = tree.copy().unwrap();
            t.update_subdomains().unwrap();
            t
        });
    }

    #[test]
    fn test_empty_filter_rejected() {
        let mut tree = module_split_tree();
        let none: [&str; 0] = [];
        let err = tree.filter_subdomains(&none, FilterMode::Keep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = tree.filter_subdomains(&["x"], FilterMode::Keep).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(tree.len(), module_split_tree().len());
    }

    #[test]
    fn test_failed_update_leaves_tree_unchanged() {
        let mut tree = cluster_tree();
        let before = tree.clone();
        tree.max_tag_len = 4;
        assert!(tree.update_subdomains().is_err());
        assert_eq!(tree.nodes, before.nodes);
    }

    #[test]
    fn test_empty_tree_rejected() {
        let mut tree = cluster_tree();
        tree.destruct();
        assert!(tree.update_subdomains().is_err());
        assert!(tree.filtered(&[".0"], FilterMode::Keep).is_err());
    }

    fn arb_units() -> impl Strategy<Value = Vec<UnitHardwareInfo>> {
        let unit = (0..3u8, 0..3u8, 0..2u32, 0..4u32, 1..32usize).prop_map(|(node, module, numa, l2, cores)| {
            let host = if module == 0 {
                format!("n{}", node)
            } else {
                format!("n{}-m{}", node, module)
            };
            UnitHardwareInfo::new(host)
                .with_cores(cores)
                .with_numa(numa)
                .with_cache_id(3, numa)
                .with_cache_id(2, l2)
        });
        prop::collection::vec(unit, 1..24)
    }

    fn arb_filter() -> impl Strategy<Value = (Vec<String>, bool)> {
        (prop::collection::vec(prop::collection::vec(0..3usize, 1..4), 1..3), any::<bool>()).prop_map(
            |(paths, keep)| {
                let tags = paths
                    .into_iter()
                    .map(|p| p.iter().map(|i| format!(".{}", i)).collect::<String>())
                    .collect();
                (tags, keep)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_update_is_idempotent(units in arb_units(), (tags, keep) in arb_filter()) {
            let tree = build(units, &[]);
            let mode = if keep { FilterMode::Keep } else { FilterMode::Remove };

            let mut once = tree.copy().unwrap();
            once.filter_subdomains(&tags, mode).unwrap();
            once.update_subdomains().unwrap();
            let mut twice = once.clone();
            twice.update_subdomains().unwrap();
            prop_assert_eq!(&once, &twice);

            let mut again = tree.clone();
            again.update_subdomains().unwrap();
            prop_assert_eq!(&again, &tree);
        }

        #[test]
        fn prop_aggregation_holds_after_filter(units in arb_units(), (tags, keep) in arb_filter()) {
            let tree = build(units, &[]);
            let mode = if keep { FilterMode::Keep } else { FilterMode::Remove };
            let filtered = tree.filtered(&tags, mode).unwrap();

            prop_assert!(filtered.check_invariants().is_ok());
            for node in filtered.iter().filter(|n| !n.scope.is_unit_bearing() && !n.is_leaf()) {
                let sum: usize = node
                    .children()
                    .iter()
                    .map(|&c| filtered.get(c).unwrap().num_units)
                    .sum();
                prop_assert_eq!(node.num_units, sum);
            }
        }

        #[test]
        fn prop_every_tag_resolves(units in arb_units()) {
            let tree = build(units, &[]);
            for node in tree.iter() {
                prop_assert_eq!(tree.find(node.tag.as_str()).unwrap(), node);
            }
        }

        #[test]
        fn prop_copy_isolation(units in arb_units(), (tags, keep) in arb_filter()) {
            let tree = build(units, &[]);
            let snapshot: Vec<_> = tree.iter().map(|n| (n.tag.clone(), n.unit_ids.clone())).collect();
            let mode = if keep { FilterMode::Keep } else { FilterMode::Remove };

            let mut copy = tree.copy().unwrap();
            copy.filter_subdomains(&tags, mode).unwrap();
            copy.destruct();

            let after: Vec<_> = tree.iter().map(|n| (n.tag.clone(), n.unit_ids.clone())).collect();
            prop_assert_eq!(snapshot, after);
            prop_assert_eq!(tree.len(), tree.iter().count());
        }
    }
}
