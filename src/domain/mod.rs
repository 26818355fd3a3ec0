//! Locality domain hierarchy
//!
//! A [`DomainTree`] describes where the units of a team live: nodes,
//! modules, NUMA domains, packages, shared caches and cores. Domains are
//! addressed by dotted [`DomainTag`]s such as `".0.1.2"`.

mod builder;
mod filter;
mod render;
mod scope;
mod tag;
mod tree;

pub use builder::{balanced_split, BuiltTree, DomainTreeBuilder};
pub use filter::{filter, FilterMode};
pub use scope::Scope;
pub use tag::DomainTag;
pub use tree::{DomainId, DomainIter, DomainNode, DomainTree};
