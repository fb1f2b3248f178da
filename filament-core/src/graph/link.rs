//! Edge Maintenance
//!
//! Incremental construction and pruning of dependency edges. Linking happens
//! while a subscriber is being tracked (its reads arrive in order, so the
//! common re-run case is a cheap tail match); unlinking happens when a
//! tracking pass ends and the tail is short of the old list, when a node is
//! disposed, or when a dependency loses its last subscriber.

use tracing::trace;

use super::node::{LinkKey, NodeFlags, NodeKey, NodeKind};
use super::{Graph, Link};

impl Graph {
    /// Record that `sub` depends on `dep`.
    ///
    /// Called only while `sub` is the active subscriber and `dep` is read.
    /// Re-linking the dependency most recently recorded in this pass is a
    /// no-op (tail match). While `sub` is being re-traversed for dirtiness
    /// verification (`RECURSED_CHECK`), a read that matches the link just
    /// past the tail advances the tail instead of allocating, so a stable
    /// dependency order costs no new links.
    pub(crate) fn link(&mut self, dep: NodeKey, sub: NodeKey) {
        let prev_dep = self.nodes[sub].deps_tail;
        if let Some(pd) = prev_dep {
            if self.links[pd].dep == dep {
                return;
            }
        }

        let recursed_check = self.nodes[sub].flags.intersects(NodeFlags::RECURSED_CHECK);
        let mut next_dep = None;
        if recursed_check {
            next_dep = match prev_dep {
                Some(pd) => self.links[pd].next_dep,
                None => self.nodes[sub].deps_head,
            };
            if let Some(nd) = next_dep {
                if self.links[nd].dep == dep {
                    self.nodes[sub].deps_tail = Some(nd);
                    return;
                }
            }
        }

        let prev_sub = self.nodes[dep].subs_tail;
        if let Some(ps) = prev_sub {
            if self.links[ps].sub == sub && (!recursed_check || self.is_valid_link(ps, sub)) {
                return;
            }
        }

        let key = self.links.insert(Link {
            dep,
            sub,
            prev_dep,
            next_dep,
            prev_sub,
            next_sub: None,
        });
        self.nodes[sub].deps_tail = Some(key);
        self.nodes[dep].subs_tail = Some(key);
        if let Some(nd) = next_dep {
            self.links[nd].prev_dep = Some(key);
        }
        match prev_dep {
            Some(pd) => self.links[pd].next_dep = Some(key),
            None => self.nodes[sub].deps_head = Some(key),
        }
        match prev_sub {
            Some(ps) => self.links[ps].next_sub = Some(key),
            None => self.nodes[dep].subs_head = Some(key),
        }
    }

    /// Remove `link` from both of its lists, patching neighbors on each
    /// side, and return the next link in the subscriber's dependency list so
    /// callers can walk-and-remove a contiguous run.
    ///
    /// Removing the last subscriber of the link's dependency triggers
    /// [`Graph::unwatched`].
    pub(crate) fn unlink(&mut self, link: LinkKey) -> Option<LinkKey> {
        let sub = self.links.get(link)?.sub;
        self.unlink_from(link, sub)
    }

    pub(crate) fn unlink_from(&mut self, link: LinkKey, sub: NodeKey) -> Option<LinkKey> {
        let Link {
            dep,
            prev_dep,
            next_dep,
            prev_sub,
            next_sub,
            ..
        } = self.links.remove(link)?;

        match next_dep {
            Some(nd) => self.links[nd].prev_dep = prev_dep,
            None => {
                if let Some(n) = self.nodes.get_mut(sub) {
                    n.deps_tail = prev_dep;
                }
            }
        }
        match prev_dep {
            Some(pd) => self.links[pd].next_dep = next_dep,
            None => {
                if let Some(n) = self.nodes.get_mut(sub) {
                    n.deps_head = next_dep;
                }
            }
        }
        match next_sub {
            Some(ns) => self.links[ns].prev_sub = prev_sub,
            None => {
                if let Some(n) = self.nodes.get_mut(dep) {
                    n.subs_tail = prev_sub;
                }
            }
        }
        match prev_sub {
            Some(ps) => self.links[ps].next_sub = next_sub,
            None => {
                if let Some(n) = self.nodes.get_mut(dep) {
                    n.subs_head = next_sub;
                    if next_sub.is_none() {
                        self.unwatched(dep);
                    }
                }
            }
        }

        next_dep
    }

    /// True if `check` lies within `sub`'s dependency list between its head
    /// and current tail. Used to distinguish a live re-collected link from a
    /// stale leftover while a check walk is in progress.
    pub(crate) fn is_valid_link(&self, check: LinkKey, sub: NodeKey) -> bool {
        let Some(tail) = self.nodes[sub].deps_tail else {
            return false;
        };
        let mut link = self.nodes[sub].deps_head;
        while let Some(l) = link {
            if l == check {
                return true;
            }
            if l == tail {
                break;
            }
            link = self.links[l].next_dep;
        }
        false
    }

    /// Begin a tracking pass for `sub`: reset the dependency tail so reads
    /// re-collect from the head, clear the staleness bits, and mark the node
    /// as being re-traversed.
    pub(crate) fn start_tracking(&mut self, sub: NodeKey) {
        let node = &mut self.nodes[sub];
        node.deps_tail = None;
        node.flags = (node.flags & !(NodeFlags::RECURSED | NodeFlags::DIRTY | NodeFlags::PENDING))
            | NodeFlags::RECURSED_CHECK;
    }

    /// End a tracking pass for `sub`: unlink every dependency past the tail
    /// (reads that did not recur this pass) and clear the traversal marker.
    pub(crate) fn end_tracking(&mut self, sub: NodeKey) {
        let Some(node) = self.nodes.get(sub) else {
            // The subscriber disposed itself during its own run.
            return;
        };
        let mut stale = match node.deps_tail {
            Some(tail) => self.links[tail].next_dep,
            None => node.deps_head,
        };
        while let Some(link) = stale {
            stale = self.unlink_from(link, sub);
        }
        if let Some(node) = self.nodes.get_mut(sub) {
            node.flags &= !NodeFlags::RECURSED_CHECK;
        }
    }

    /// A dependency just lost its last subscriber.
    ///
    /// A computed reverts to dirty and drops its own dependencies (cascading
    /// cleanup up the chain); an effect or scope is torn down entirely; a
    /// signal only goes away once its handle is also gone.
    fn unwatched(&mut self, dep: NodeKey) {
        let Some(node) = self.nodes.get(dep) else {
            return;
        };
        let kind = node.kind();
        let unreferenced = node.unreferenced;
        let mut to_remove = node.deps_head;
        match kind {
            NodeKind::Computed => {
                if to_remove.is_some() {
                    self.nodes[dep].flags = NodeFlags::MUTABLE | NodeFlags::DIRTY;
                    while let Some(link) = to_remove {
                        to_remove = self.unlink_from(link, dep);
                    }
                }
                if self.nodes.get(dep).is_some_and(|n| n.unreferenced) {
                    trace!(target: "filament::graph", ?dep, "freeing unwatched computed");
                    self.nodes.remove(dep);
                }
            }
            NodeKind::Signal => {
                if unreferenced {
                    trace!(target: "filament::graph", ?dep, "freeing unwatched signal");
                    self.nodes.remove(dep);
                }
            }
            NodeKind::Effect | NodeKind::Scope => {
                self.purge(dep);
            }
        }
    }

    /// Tear down an effect or scope: unlink all of its dependency links
    /// (cascading into child effects and unwatched dependencies), detach its
    /// own subscriber link, and remove it from the arena. Idempotent.
    pub(crate) fn purge(&mut self, node: NodeKey) {
        let mut dep = match self.nodes.get(node) {
            Some(n) => n.deps_head,
            None => return,
        };
        while let Some(link) = dep {
            dep = self.unlink_from(link, node);
        }
        if let Some(sub_link) = self.nodes.get(node).and_then(|n| n.subs_head) {
            // Detaching from the parent empties this node's subscriber list,
            // which re-enters here through `unwatched`; the second pass finds
            // nothing left to do.
            self.unlink(sub_link);
        }
        self.nodes.remove(node);
    }

    /// The last external handle to a signal or computed was dropped. The
    /// node survives while subscribers still read through it; otherwise it
    /// is freed now (a computed first releasing its own dependency list).
    pub(crate) fn release(&mut self, node: NodeKey) {
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.unreferenced = true;
        if n.subs_head.is_some() {
            // Still watched: freed later by `unwatched`.
            return;
        }
        let mut dep = n.deps_head;
        match n.kind() {
            NodeKind::Computed => {
                while let Some(link) = dep {
                    dep = self.unlink_from(link, node);
                }
                self.nodes.remove(node);
            }
            NodeKind::Signal => {
                self.nodes.remove(node);
            }
            // Effects and scopes are owned by dispose, not by handles.
            NodeKind::Effect | NodeKind::Scope => {}
        }
    }
}
