//! JSON and text views of a domain tree

use super::tree::{DomainId, DomainNode, DomainTree};
use crate::error::Result;
use console::style;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::fmt::Write as _;

/// A domain together with its subtree, serialized as nested objects
struct NestedDomain<'a> {
    tree: &'a DomainTree,
    id: DomainId,
}

impl Serialize for NestedDomain<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let node = self.tree.node(self.id);
        let children: Vec<_> = node
            .children()
            .iter()
            .map(|&id| NestedDomain { tree: self.tree, id })
            .collect();

        let mut s = serializer.serialize_struct("Domain", 13)?;
        s.serialize_field("scope", &node.scope)?;
        s.serialize_field("scope_id", &node.scope.value())?;
        s.serialize_field("tag", &node.tag)?;
        s.serialize_field("level", &node.level)?;
        s.serialize_field("relative_index", &node.relative_index)?;
        s.serialize_field("team", &node.team)?;
        s.serialize_field("host", &node.host)?;
        s.serialize_field("num_cores", &node.num_cores)?;
        s.serialize_field("num_units", &node.num_units)?;
        s.serialize_field("num_nodes", &node.num_nodes)?;
        s.serialize_field("shared_mem_bytes", &node.shared_mem_bytes)?;
        s.serialize_field("unit_ids", &node.unit_ids)?;
        s.serialize_field("domains", &children)?;
        s.end()
    }
}

/// A destructed tree serializes as `null`
impl Serialize for DomainTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.root_id() {
            Ok(id) => NestedDomain { tree: self, id }.serialize(serializer),
            Err(_) => serializer.serialize_none(),
        }
    }
}

impl DomainTree {
    /// Nested JSON rendering of the tree
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Indented plain-text rendering, one domain per line
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for node in self.iter() {
            let _ = writeln!(out, "{}{}", "  ".repeat(node.level), describe(node));
        }
        out
    }

    /// Print the tree to the terminal
    pub fn print_summary(&self) {
        let root = match self.root() {
            Ok(root) => root,
            Err(_) => {
                println!("(empty domain tree)");
                return;
            }
        };

        println!("=== Locality Domains ===\n");
        println!(
            "Team {}: {} domains, {} nodes, {} units, {} cores\n",
            root.team,
            self.len(),
            root.num_nodes,
            root.num_units,
            root.num_cores
        );

        for node in self.iter() {
            println!(
                "{}{} {}",
                "  ".repeat(node.level),
                style(node.scope.name()).cyan().bold(),
                describe(node)
            );
        }
    }
}

fn describe(node: &DomainNode) -> String {
    let mut line = node.tag.to_string();
    if let Some(host) = &node.host {
        let _ = write!(line, " [{}]", host);
    }
    let _ = write!(line, " units={:?} cores={}", node.unit_ids, node.num_cores);
    if let Some(bytes) = node.shared_mem_bytes {
        let _ = write!(line, " mem={}", humansize::format_size(bytes, humansize::BINARY));
    }
    line
}
