//! Arena-backed locality domain tree
//!
//! All domains of a tree live in one `Vec`, addressed by [`DomainId`]. A
//! domain owns its children through the arena; its parent link is a plain
//! index and never owns anything. Cloning the tree clones the arena, so the
//! parent links of a copy point at the copy's own domains.

use super::builder::balanced_split;
use super::scope::Scope;
use super::tag::DomainTag;
use crate::error::{LocalityError, Result};
use crate::team::TeamId;
use crate::unit::UnitId;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Index of a domain inside its tree
pub type DomainId = u32;

const ROOT: DomainId = 0;

/// One locality domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainNode {
    /// Granularity of this domain
    pub scope: Scope,
    /// Path of this domain in the tree
    pub tag: DomainTag,
    /// Depth below the root
    pub level: usize,
    /// Position among siblings
    pub relative_index: usize,
    /// Team the tree was built for
    pub team: TeamId,
    /// Hostname for node and module domains
    pub host: Option<String>,
    /// Cores in this domain
    pub num_cores: usize,
    /// Units in this domain
    pub num_units: usize,
    /// Nodes spanned by this domain
    pub num_nodes: usize,
    /// Memory shared by the units of this domain, in bytes
    pub shared_mem_bytes: Option<u64>,
    /// Units in this domain, in tree order
    pub unit_ids: Vec<UnitId>,
    #[serde(skip)]
    pub(crate) children: Vec<DomainId>,
    #[serde(skip)]
    pub(crate) parent: Option<DomainId>,
}

impl DomainNode {
    pub(crate) fn new(scope: Scope, tag: DomainTag, team: TeamId) -> Self {
        Self {
            scope,
            tag,
            level: 0,
            relative_index: 0,
            team,
            host: None,
            num_cores: 0,
            num_units: 0,
            num_nodes: 0,
            shared_mem_bytes: None,
            unit_ids: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    /// Number of child domains
    pub fn num_domains(&self) -> usize {
        self.children.len()
    }

    /// Ids of the child domains
    pub fn children(&self) -> &[DomainId] {
        &self.children
    }

    /// Id of the parent domain
    pub fn parent(&self) -> Option<DomainId> {
        self.parent
    }

    /// Whether the domain has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A locality domain tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainTree {
    pub(crate) nodes: Vec<DomainNode>,
    pub(crate) max_tag_len: usize,
}

impl DomainTree {
    /// Tree consisting of a single root domain tagged `"."`
    pub fn new(scope: Scope, team: TeamId, max_tag_len: usize) -> Self {
        Self {
            nodes: vec![DomainNode::new(scope, DomainTag::root(), team)],
            max_tag_len,
        }
    }

    /// Number of domains
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has been destructed
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Longest tag this tree accepts
    pub fn max_tag_len(&self) -> usize {
        self.max_tag_len
    }

    /// Id of the root domain
    pub fn root_id(&self) -> Result<DomainId> {
        if self.nodes.is_empty() {
            Err(LocalityError::EmptyTree)
        } else {
            Ok(ROOT)
        }
    }

    /// The root domain
    pub fn root(&self) -> Result<&DomainNode> {
        self.get(self.root_id()?)
    }

    /// Domain by id
    pub fn get(&self, id: DomainId) -> Result<&DomainNode> {
        if self.nodes.is_empty() {
            return Err(LocalityError::EmptyTree);
        }
        self.nodes
            .get(id as usize)
            .ok_or_else(|| LocalityError::out_of_range("domain", id as usize, self.nodes.len()))
    }

    /// Parent of a domain, `None` for the root
    pub fn parent(&self, id: DomainId) -> Result<Option<&DomainNode>> {
        match self.get(id)?.parent {
            Some(parent) => self.get(parent).map(Some),
            None => Ok(None),
        }
    }

    /// Child domains of a domain
    pub fn children(&self, id: DomainId) -> Result<Vec<&DomainNode>> {
        let node = self.get(id)?;
        Ok(node.children.iter().map(|&c| self.node(c)).collect())
    }

    pub(crate) fn node(&self, id: DomainId) -> &DomainNode {
        &self.nodes[id as usize]
    }

    pub(crate) fn node_mut(&mut self, id: DomainId) -> &mut DomainNode {
        &mut self.nodes[id as usize]
    }

    /// Append a child below `parent`, stamping tag, level, index and team
    pub(crate) fn push_child(&mut self, parent: DomainId, scope: Scope) -> Result<DomainId> {
        let (tag, level, team, index) = {
            let p = self.node(parent);
            let index = p.children.len();
            (p.tag.child(index, self.max_tag_len)?, p.level + 1, p.team, index)
        };

        self.nodes.try_reserve(1)?;
        self.node_mut(parent).children.try_reserve(1)?;

        let id = self.nodes.len() as DomainId;
        let mut child = DomainNode::new(scope, tag, team);
        child.level = level;
        child.relative_index = index;
        child.parent = Some(parent);

        self.nodes.push(child);
        self.node_mut(parent).children.push(id);
        Ok(id)
    }

    /// Pre-order iterator over all domains
    pub fn iter(&self) -> DomainIter<'_> {
        DomainIter {
            tree: self,
            stack: if self.nodes.is_empty() { Vec::new() } else { vec![ROOT] },
        }
    }

    /// Domain with the given tag
    pub fn find(&self, tag: &str) -> Result<&DomainNode> {
        let tag = DomainTag::parse(tag, self.max_tag_len)?;
        let id = self.find_from(self.root_id()?, &tag)?;
        Ok(self.node(id))
    }

    /// Id of the domain with the given tag, searching depth-first below `start`
    pub fn find_from(&self, start: DomainId, tag: &DomainTag) -> Result<DomainId> {
        self.get(start)?;

        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.tag == *tag {
                return Ok(id);
            }
            if node.tag.is_prefix_of(tag) {
                stack.extend(node.children.iter().rev().copied());
            }
        }

        Err(LocalityError::TagNotFound(tag.to_string()))
    }

    /// Deepest domain containing all given tags
    pub fn find_common_parent<S: AsRef<str>>(&self, tags: &[S]) -> Result<&DomainNode> {
        if tags.is_empty() {
            return Err(LocalityError::InvalidArgument(
                "common parent requires at least one tag".into(),
            ));
        }
        let tags = DomainTag::parse_all(tags, self.max_tag_len)?;
        let prefix = DomainTag::common_prefix(&tags);

        let root = self.root_id()?;
        if prefix.is_root() {
            return Ok(self.node(root));
        }
        let id = self.find_from(root, &prefix)?;
        Ok(self.node(id))
    }

    /// Tags of all domains at `scope`, in pre-order
    pub fn domains_at_scope(&self, scope: Scope) -> Result<Vec<DomainTag>> {
        self.root_id()?;
        Ok(self
            .iter()
            .filter(|n| n.scope == scope)
            .map(|n| n.tag.clone())
            .collect())
    }

    /// Partition the domains at `scope` into `parts` contiguous groups
    ///
    /// Group sizes differ by at most one; earlier groups get the extra
    /// domains.
    pub fn split_at_scope(&self, scope: Scope, parts: usize) -> Result<Vec<Vec<DomainTag>>> {
        let tags = self.domains_at_scope(scope)?;
        if parts == 0 || parts > tags.len() {
            return Err(LocalityError::InvalidArgument(format!(
                "cannot split {} {} domains into {} parts",
                tags.len(),
                scope,
                parts
            )));
        }

        let mut rest = tags.into_iter();
        Ok(balanced_split(rest.len(), parts)
            .into_iter()
            .map(|size| rest.by_ref().take(size).collect())
            .collect())
    }

    /// Domain tag of every unit, taken from the CORE domains
    pub fn unit_domain_tags(&self) -> Result<BTreeMap<UnitId, DomainTag>> {
        self.root_id()?;
        let mut tags = BTreeMap::new();
        for node in self.iter().filter(|n| n.scope == Scope::Core) {
            for &unit in &node.unit_ids {
                tags.insert(unit, node.tag.clone());
            }
        }
        Ok(tags)
    }

    /// Deep copy of the whole tree
    pub fn copy(&self) -> Result<DomainTree> {
        self.root_id()?;
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(self.nodes.len())?;
        nodes.extend(self.nodes.iter().cloned());
        Ok(DomainTree {
            nodes,
            max_tag_len: self.max_tag_len,
        })
    }

    /// Deep copy of the subtree below `tag`, as a tree of its own.
    ///
    /// Tags are kept, so domains of the copy can be looked up with the same
    /// tags as in the source tree.
    pub fn copy_subtree(&self, tag: &str) -> Result<DomainTree> {
        let tag = DomainTag::parse(tag, self.max_tag_len)?;
        let start = self.find_from(self.root_id()?, &tag)?;

        let mut out = DomainTree {
            nodes: Vec::new(),
            max_tag_len: self.max_tag_len,
        };
        self.copy_into(start, None, &mut out.nodes)?;
        Ok(out)
    }

    fn copy_into(&self, src: DomainId, parent: Option<DomainId>, out: &mut Vec<DomainNode>) -> Result<DomainId> {
        out.try_reserve(1)?;
        let id = out.len() as DomainId;
        let mut node = self.node(src).clone();
        node.parent = parent;
        node.children = Vec::new();
        out.push(node);

        let mut children = Vec::new();
        children.try_reserve_exact(self.node(src).children.len())?;
        for &child in &self.node(src).children {
            children.push(self.copy_into(child, Some(id), out)?);
        }
        out[id as usize].children = children;
        Ok(id)
    }

    /// Release every domain, children before parents.
    ///
    /// Calling it again on an empty tree does nothing.
    pub fn destruct(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        let order: Vec<DomainId> = self.post_order(ROOT);
        for id in order {
            let node = self.node_mut(id);
            node.children = Vec::new();
            node.unit_ids = Vec::new();
            node.parent = None;
        }
        self.nodes = Vec::new();
    }

    pub(crate) fn post_order(&self, start: DomainId) -> Vec<DomainId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(start, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(self.node(id).children.iter().rev().map(|&c| (c, false)));
            }
        }
        order
    }

    /// Verify the structural invariants of the tree
    pub fn check_invariants(&self) -> Result<()> {
        let root = self.root_id()?;
        if self.node(root).parent.is_some() {
            return Err(LocalityError::inconsistent(self.node(root).tag.as_str(), "root has a parent"));
        }

        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut reachable = 0usize;
        for id in self.post_order(root) {
            reachable += 1;
            let node = self.node(id);
            let fail = |msg: String| Err(LocalityError::inconsistent(node.tag.as_str(), msg));

            if !seen.insert(node.tag.as_str()) {
                return fail("duplicate tag".into());
            }
            if node.num_units != node.unit_ids.len() {
                return fail(format!(
                    "num_units is {} but {} unit ids are present",
                    node.num_units,
                    node.unit_ids.len()
                ));
            }

            let mut unit_sum = 0usize;
            for (index, &child_id) in node.children.iter().enumerate() {
                let child = self.node(child_id);
                unit_sum += child.num_units;

                if child.parent != Some(id) {
                    return fail(format!("child {} does not point back to its parent", child.tag));
                }
                if child.scope <= node.scope {
                    return fail(format!("child {} has scope {} not finer than {}", child.tag, child.scope, node.scope));
                }
                if child.relative_index != index || child.level != node.level + 1 {
                    return fail(format!("child {} is labelled out of position", child.tag));
                }
                if child.tag != node.tag.child(index, usize::MAX)? {
                    return fail(format!("child {} is tagged out of position", child.tag));
                }
            }

            if !node.scope.is_unit_bearing() && !node.children.is_empty() && unit_sum != node.num_units {
                return fail(format!("num_units is {} but children hold {}", node.num_units, unit_sum));
            }
        }

        if reachable != self.nodes.len() {
            return Err(LocalityError::inconsistent(
                DomainTag::ROOT,
                format!("{} of {} domains are unreachable", self.nodes.len() - reachable, self.nodes.len()),
            ));
        }

        Ok(())
    }
}

/// Pre-order iterator over the domains of a tree
pub struct DomainIter<'a> {
    tree: &'a DomainTree,
    stack: Vec<DomainId>,
}

impl<'a> Iterator for DomainIter<'a> {
    type Item = &'a DomainNode;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.node(id);
        self.stack.extend(node.children.iter().rev().copied());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// . -> .0 (units 0,1) -> .0.0 (0) .0.1 (1); .1 (unit 2)
    fn sample() -> DomainTree {
        let mut tree = DomainTree::new(Scope::Global, 5, 64);
        let n0 = tree.push_child(ROOT, Scope::Node).unwrap();
        let n1 = tree.push_child(ROOT, Scope::Node).unwrap();
        let c0 = tree.push_child(n0, Scope::Core).unwrap();
        let c1 = tree.push_child(n0, Scope::Core).unwrap();

        for (id, units) in [(ROOT, vec![0, 1, 2]), (n0, vec![0, 1]), (n1, vec![2]), (c0, vec![0]), (c1, vec![1])] {
            let node = tree.node_mut(id);
            node.num_units = units.len();
            node.unit_ids = units;
        }
        tree
    }

    #[test]
    fn test_push_child_stamps_position() {
        let tree = sample();
        let c1 = tree.find(".0.1").unwrap();
        assert_eq!(c1.level, 2);
        assert_eq!(c1.relative_index, 1);
        assert_eq!(c1.team, 5);
        assert_eq!(tree.get(c1.parent().unwrap()).unwrap().tag.as_str(), ".0");
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_find_every_tag() {
        let tree = sample();
        for node in tree.iter() {
            assert_eq!(tree.find(node.tag.as_str()).unwrap(), node);
        }
        assert_eq!(tree.find(".2").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(tree.find("0").unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_iter_is_pre_order() {
        let tags: Vec<_> = sample().iter().map(|n| n.tag.to_string()).collect();
        assert_eq!(tags, vec![".", ".0", ".0.0", ".0.1", ".1"]);
    }

    #[test]
    fn test_common_parent() {
        let tree = sample();
        assert_eq!(tree.find_common_parent(&[".0.0", ".0.1"]).unwrap().tag.as_str(), ".0");
        assert_eq!(tree.find_common_parent(&[".0.1"]).unwrap().tag.as_str(), ".0.1");
        assert!(tree.find_common_parent(&[".0.0", ".1"]).unwrap().tag.is_root());
        let empty: [&str; 0] = [];
        assert_eq!(tree.find_common_parent(&empty).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_scope_queries() {
        let tree = sample();
        let nodes = tree.domains_at_scope(Scope::Node).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(tree.domains_at_scope(Scope::Numa).unwrap().is_empty());

        let groups = tree.split_at_scope(Scope::Core, 1).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert!(tree.split_at_scope(Scope::Core, 3).is_err());
        assert!(tree.split_at_scope(Scope::Core, 0).is_err());
    }

    #[test]
    fn test_unit_domain_tags() {
        let tags = sample().unit_domain_tags().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[&1].as_str(), ".0.1");
    }

    #[test]
    fn test_copy_is_independent() {
        let tree = sample();
        let mut copy = tree.copy().unwrap();
        assert_eq!(copy, tree);

        copy.node_mut(1).unit_ids.clear();
        copy.destruct();
        assert!(copy.is_empty());
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.find(".0").unwrap().unit_ids, vec![0, 1]);
    }

    #[test]
    fn test_copy_subtree() {
        let tree = sample();
        let sub = tree.copy_subtree(".0").unwrap();
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.root().unwrap().tag.as_str(), ".0");
        assert!(sub.root().unwrap().parent().is_none());
        assert_eq!(sub.find(".0.1").unwrap().unit_ids, vec![1]);
        let child = sub.find(".0.1").unwrap();
        assert_eq!(sub.get(child.parent().unwrap()).unwrap().tag.as_str(), ".0");
    }

    #[test]
    fn test_destruct_is_idempotent() {
        let mut tree = sample();
        tree.destruct();
        tree.destruct();
        assert!(tree.is_empty());
        assert_eq!(tree.root().unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(tree.find(".").unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert!(tree.copy().is_err());
    }

    #[test]
    fn test_invariant_violation_detected() {
        let mut tree = sample();
        tree.node_mut(ROOT).num_units = 7;
        match tree.check_invariants() {
            Err(LocalityError::Inconsistent { tag, .. }) => assert_eq!(tag, "."),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_tag_limit_on_push() {
        let mut tree = DomainTree::new(Scope::Global, 0, 2);
        let n0 = tree.push_child(ROOT, Scope::Node).unwrap();
        let err = tree.push_child(n0, Scope::Module).unwrap_err();
        assert!(matches!(err, LocalityError::TagTooLong { .. }));
    }
}
