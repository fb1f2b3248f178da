//! Eager Downstream Propagation
//!
//! When a signal's value changes, every transitive subscriber must learn
//! that it *might* be stale before anything re-runs. This walk over-marks
//! with `PENDING` (the lazy upstream walk later decides what is truly dirty)
//! and enqueues watching subscribers for the next flush.
//!
//! The traversal is iterative: instead of recursing into a mutable
//! subscriber's own subscriber list, the current sibling position is pushed
//! onto an explicit stack. Graph depth and fan-out are therefore bounded by
//! heap, not by the call stack.

use std::collections::VecDeque;

use smallvec::SmallVec;

use super::node::{LinkKey, NodeFlags, NodeKey};
use super::Graph;

impl Graph {
    /// Walk the subscriber graph starting at `start` (the head of a
    /// dependency's subscriber list), marking each subscriber per the flag
    /// decision table and appending watching subscribers to `queue`.
    ///
    /// First-time visits gain `PENDING`; re-entrant visits of a node whose
    /// dependency list is mid-traversal gain `RECURSED`; already-pending
    /// revisits are no-ops, which bounds the number of visits per write.
    pub(crate) fn propagate(&mut self, start: LinkKey, queue: &mut VecDeque<NodeKey>) {
        let mut link = start;
        let mut next = self.links[link].next_sub;
        let mut stack: SmallVec<[Option<LinkKey>; 16]> = SmallVec::new();

        'top: loop {
            let sub = self.links[link].sub;
            let mut flags = self.nodes[sub].flags;

            if flags.intersects(NodeFlags::MUTABLE | NodeFlags::WATCHING) {
                if !flags.intersects(
                    NodeFlags::RECURSED_CHECK
                        | NodeFlags::RECURSED
                        | NodeFlags::DIRTY
                        | NodeFlags::PENDING,
                ) {
                    self.nodes[sub].flags = flags | NodeFlags::PENDING;
                } else if !flags.intersects(NodeFlags::RECURSED_CHECK | NodeFlags::RECURSED) {
                    flags = NodeFlags::NONE;
                } else if !flags.intersects(NodeFlags::RECURSED_CHECK) {
                    self.nodes[sub].flags = (flags & !NodeFlags::RECURSED) | NodeFlags::PENDING;
                } else if !flags.intersects(NodeFlags::DIRTY | NodeFlags::PENDING)
                    && self.is_valid_link(link, sub)
                {
                    self.nodes[sub].flags = flags | NodeFlags::RECURSED | NodeFlags::PENDING;
                    flags &= NodeFlags::MUTABLE;
                } else {
                    flags = NodeFlags::NONE;
                }

                if flags.intersects(NodeFlags::WATCHING) {
                    self.notify(sub, queue);
                }
                if flags.intersects(NodeFlags::MUTABLE) {
                    if let Some(sub_subs) = self.nodes[sub].subs_head {
                        link = sub_subs;
                        if self.links[sub_subs].next_sub.is_some() {
                            stack.push(next);
                            next = self.links[link].next_sub;
                        }
                        // Single-subscriber chains descend without growing
                        // the stack.
                        continue 'top;
                    }
                }
            }

            if let Some(sibling) = next {
                link = sibling;
                next = self.links[link].next_sub;
                continue 'top;
            }

            while let Some(saved) = stack.pop() {
                if let Some(sibling) = saved {
                    link = sibling;
                    next = self.links[link].next_sub;
                    continue 'top;
                }
            }
            break;
        }
    }

    /// One-level refinement pass: after a node's value is confirmed changed,
    /// upgrade each immediate subscriber still marked `PENDING` to `DIRTY`
    /// and enqueue it if it is watching.
    pub(crate) fn shallow_propagate(
        &mut self,
        mut link: Option<LinkKey>,
        queue: &mut VecDeque<NodeKey>,
    ) {
        while let Some(l) = link {
            let sub = self.links[l].sub;
            let next = self.links[l].next_sub;
            let flags = self.nodes[sub].flags;
            if flags & (NodeFlags::PENDING | NodeFlags::DIRTY) == NodeFlags::PENDING {
                self.nodes[sub].flags = flags | NodeFlags::DIRTY;
                if flags.intersects(NodeFlags::WATCHING) {
                    self.notify(sub, queue);
                }
            }
            link = next;
        }
    }

    /// Schedule a watching subscriber. A subscriber nested under a parent
    /// effect or scope bubbles the notification upward instead of enqueueing
    /// itself; the parent's run later walks its dependency list and runs any
    /// queued child. `QUEUED` suppresses duplicates.
    pub(crate) fn notify(&mut self, mut node: NodeKey, queue: &mut VecDeque<NodeKey>) {
        loop {
            let n = &mut self.nodes[node];
            if n.flags.intersects(NodeFlags::QUEUED) {
                return;
            }
            n.flags |= NodeFlags::QUEUED;
            match n.subs_head {
                Some(parent_link) => node = self.links[parent_link].sub,
                None => {
                    queue.push_back(node);
                    return;
                }
            }
        }
    }
}
