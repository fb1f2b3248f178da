//! Dependency Graph
//!
//! Arena-backed storage for reactive nodes and the edges between them, plus
//! the structural algorithms that never execute user code:
//!
//! - `node`: the shared node shape, state flags, and the `Link` edge record
//! - `link`: incremental edge maintenance (link / unlink / tracking passes)
//! - `propagate`: the eager downstream walk that marks dependents on write
//!
//! The lazy upstream walk (`check_dirty`) and node updates live in the
//! reactive runtime because they re-enter user closures and must therefore
//! run without a borrow of the graph held.

mod link;
mod node;
mod propagate;

pub use node::{Link, LinkKey, Node, NodeFlags, NodeKey, NodeKind};

pub(crate) use node::{any_dup, any_eq, AnyGetter, NodeBody};

use slotmap::SlotMap;

/// Owning storage for the whole dependency graph.
///
/// All cross-references are arena keys, so splicing a link in or out of its
/// two lists is O(1) pointer patching with no ownership cycles.
pub struct Graph {
    pub(crate) nodes: SlotMap<NodeKey, Node>,
    pub(crate) links: SlotMap<LinkKey, Link>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            links: SlotMap::with_key(),
        }
    }

    /// Number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live links in the arena.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Length of a node's dependency list.
    pub(crate) fn dep_count(&self, node: NodeKey) -> usize {
        let mut count = 0;
        let mut link = self.nodes.get(node).and_then(|n| n.deps_head);
        while let Some(l) = link {
            count += 1;
            link = self.links[l].next_dep;
        }
        count
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
