//! Reactive Runtime
//!
//! The runtime owns the dependency graph, the tracking context, and the
//! effect queue. One instance is one independent reactive system; handles
//! created from it hold weak references back to it, so dropping the last
//! `Runtime` clone tears the whole graph down.
//!
//! # How an update flows
//!
//! 1. Writing a signal marks it dirty and runs the eager downstream walk
//!    (`Graph::propagate`), which over-marks transitive subscribers as
//!    pending and queues watching effects.
//!
//! 2. Outside a batch the queue is flushed immediately; inside a batch it
//!    waits for the outermost `end_batch`.
//!
//! 3. Before a pending node re-runs, the lazy upstream walk ([`check_dirty`])
//!    verifies whether any input truly changed, updating dirty dependencies
//!    in place. Equal-value recomputations stop propagation right there.
//!
//! Both walks use explicit stacks; graph depth never grows the call stack.
//!
//! # Re-entrancy
//!
//! The graph borrow is held only across structural phases. Every user
//! closure (effect fn, computed getter) runs with no outstanding borrow,
//! which is what makes nested effect creation, writes during a flush, and
//! dispose-from-within-the-effect legal.
//!
//! [`check_dirty`]: RuntimeInner::check_dirty

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::graph::{Graph, LinkKey, NodeBody, NodeFlags, NodeKey, NodeKind};

use super::context::TrackingContext;
use super::error::{panic_message, ReactiveError};

/// A single-threaded reactive system instance.
///
/// Cloning is cheap and shares the same graph. See the module docs of
/// [`crate::reactive`] for an overview and examples.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) ctx: TrackingContext,
    pub(crate) queue: RefCell<VecDeque<NodeKey>>,
    pub(crate) batch_depth: Cell<usize>,
    /// Nodes whose last typed handle was dropped, swept after public ops.
    /// Deferral keeps handle drops legal while the graph is borrowed (for
    /// example when pruning a node whose closure captures other handles).
    dropped: RefCell<Vec<NodeKey>>,
    last_error: RefCell<Option<ReactiveError>>,
}

impl Runtime {
    pub fn new() -> Self {
        debug!(target: "filament::reactive", "creating reactive runtime");
        Runtime {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(Graph::new()),
                ctx: TrackingContext::new(),
                queue: RefCell::new(VecDeque::new()),
                batch_depth: Cell::new(0),
                dropped: RefCell::new(Vec::new()),
                last_error: RefCell::new(None),
            }),
        }
    }

    /// Open a batch region. Nestable; effects queued by writes inside the
    /// region run once, after the outermost [`end_batch`].
    ///
    /// [`end_batch`]: Runtime::end_batch
    pub fn start_batch(&self) {
        self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
    }

    /// Close a batch region, flushing queued effects when the outermost
    /// region ends.
    pub fn end_batch(&self) {
        let depth = self.inner.batch_depth.get();
        debug_assert!(depth > 0, "end_batch without matching start_batch");
        let depth = depth.saturating_sub(1);
        self.inner.batch_depth.set(depth);
        if depth == 0 {
            trace!(target: "filament::reactive", "batch closed, flushing");
            self.inner.flush();
            self.inner.sweep();
        }
    }

    /// Run `f` inside a batch region.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_batch();
        let result = f();
        self.end_batch();
        result
    }

    /// Suspend dependency collection until the matching
    /// [`resume_tracking`]. Reads inside the region do not subscribe.
    ///
    /// [`resume_tracking`]: Runtime::resume_tracking
    pub fn pause_tracking(&self) {
        self.inner.ctx.pause();
    }

    pub fn resume_tracking(&self) {
        self.inner.ctx.resume();
    }

    /// Run `f` with dependency collection suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.ctx.pause();
        let result = f();
        self.inner.ctx.resume();
        result
    }

    /// Take the most recent error trapped at a reactive boundary, if any.
    pub fn take_last_error(&self) -> Option<ReactiveError> {
        self.inner.last_error.borrow_mut().take()
    }

    /// Number of live nodes in the graph arena.
    pub fn node_count(&self) -> usize {
        self.inner.sweep();
        self.inner.graph.borrow().node_count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeInner {
    /// Drain the effect queue in FIFO order. `QUEUED` is cleared before an
    /// effect runs, so nodes queued again mid-flush are drained by this same
    /// pass. A panic trapped in one effect does not stop the rest of the
    /// queue.
    pub(crate) fn flush(&self) {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(effect) = next else { break };
            let flags = {
                let mut g = self.graph.borrow_mut();
                match g.nodes.get_mut(effect) {
                    Some(node) => {
                        node.flags &= !NodeFlags::QUEUED;
                        node.flags
                    }
                    // Disposed while queued.
                    None => continue,
                }
            };
            self.run_effect(effect, flags);
        }
    }

    /// Run one queued subscriber.
    ///
    /// A dirty (or verified-pending) effect re-runs its function under full
    /// tracking; stale dependencies are pruned afterwards even if the run
    /// panicked. A node that was queued only to relay for nested children
    /// (a scope, or a parent effect whose own inputs are clean) instead
    /// walks its dependency list and runs any queued child.
    pub(crate) fn run_effect(&self, effect: NodeKey, flags: NodeFlags) {
        let should_run = flags.intersects(NodeFlags::DIRTY)
            || (flags.intersects(NodeFlags::PENDING) && {
                let deps = self.graph.borrow().nodes.get(effect).and_then(|n| n.deps_head);
                match deps {
                    Some(head) => self.check_dirty(head, effect),
                    None => false,
                }
            });

        if should_run {
            let run = {
                let g = self.graph.borrow();
                let Some(node) = g.nodes.get(effect) else { return };
                let NodeBody::Effect { run } = &node.body else { return };
                Rc::clone(run)
            };
            let prev = self.ctx.set_active_sub(Some(effect));
            self.graph.borrow_mut().start_tracking(effect);
            let result = catch_unwind(AssertUnwindSafe(|| (*run)()));
            self.ctx.set_active_sub(prev);
            self.graph.borrow_mut().end_tracking(effect);
            if let Err(payload) = result {
                self.report(ReactiveError::EffectPanicked(panic_message(&*payload)));
            }
            return;
        }

        if flags.intersects(NodeFlags::PENDING) {
            if let Some(node) = self.graph.borrow_mut().nodes.get_mut(effect) {
                node.flags &= !NodeFlags::PENDING;
            }
        }

        let mut link = self.graph.borrow().nodes.get(effect).and_then(|n| n.deps_head);
        while let Some(l) = link {
            let entry = {
                let g = self.graph.borrow();
                g.links.get(l).map(|x| (x.dep, x.next_dep))
            };
            let Some((dep, next)) = entry else { break };
            let queued_flags = {
                let mut g = self.graph.borrow_mut();
                match g.nodes.get_mut(dep) {
                    Some(node) if node.flags.intersects(NodeFlags::QUEUED) => {
                        node.flags &= !NodeFlags::QUEUED;
                        Some(node.flags)
                    }
                    _ => None,
                }
            };
            if let Some(child_flags) = queued_flags {
                self.run_effect(dep, child_flags);
            }
            link = next;
        }
    }

    /// Lazy upstream walk: decide whether the pending subscriber reached
    /// through `start` is truly stale.
    ///
    /// For each dependency: already-dirty short-circuits true; a dirty
    /// mutable dependency is updated in place (and shallow-propagated to
    /// its other subscribers if it really changed); a pending mutable
    /// dependency is descended into, saving the current position on an
    /// explicit stack. Unwinding back to depth zero without a real change
    /// clears `PENDING` on the verified node.
    pub(crate) fn check_dirty(&self, start: LinkKey, start_sub: NodeKey) -> bool {
        enum Step {
            DirtySub,
            Update(NodeKey),
            Descend(NodeKey),
            Clean,
        }

        let mut link = start;
        let mut sub = start_sub;
        let mut stack: SmallVec<[LinkKey; 16]> = SmallVec::new();
        let mut check_depth: usize = 0;

        'top: loop {
            let step = {
                let g = self.graph.borrow();
                let dep = g.links[link].dep;
                let dep_flags = g.nodes[dep].flags;
                if g.nodes[sub].flags.intersects(NodeFlags::DIRTY) {
                    Step::DirtySub
                } else if dep_flags.contains(NodeFlags::MUTABLE | NodeFlags::DIRTY) {
                    Step::Update(dep)
                } else if dep_flags.contains(NodeFlags::MUTABLE | NodeFlags::PENDING) {
                    Step::Descend(dep)
                } else {
                    Step::Clean
                }
            };

            let mut dirty = false;
            match step {
                Step::DirtySub => dirty = true,
                Step::Update(dep) => {
                    if self.update_node(dep) {
                        self.shallow_propagate_shared(dep);
                        dirty = true;
                    }
                }
                Step::Descend(dep) => {
                    let descend = {
                        let g = self.graph.borrow();
                        let shared =
                            g.links[link].next_sub.is_some() || g.links[link].prev_sub.is_some();
                        g.nodes[dep].deps_head.map(|head| (head, shared))
                    };
                    if let Some((head, shared)) = descend {
                        if shared {
                            stack.push(link);
                        }
                        link = head;
                        sub = dep;
                        check_depth += 1;
                        continue 'top;
                    }
                    // Pending but dependency-free: nothing to verify.
                }
                Step::Clean => {}
            }

            if !dirty {
                if let Some(next) = self.graph.borrow().links[link].next_dep {
                    link = next;
                    continue 'top;
                }
            }

            while check_depth > 0 {
                check_depth -= 1;

                let (first_sub, shared) = {
                    let g = self.graph.borrow();
                    let fs = g.nodes[sub]
                        .subs_head
                        .expect("pending node must have a subscriber");
                    (fs, g.links[fs].next_sub.is_some())
                };
                link = if shared {
                    stack.pop().expect("check walk stack underflow")
                } else {
                    first_sub
                };

                if dirty {
                    if self.update_node(sub) {
                        if shared {
                            self.shallow_propagate_from(first_sub);
                        }
                        sub = self.graph.borrow().links[link].sub;
                        continue;
                    }
                } else {
                    let mut g = self.graph.borrow_mut();
                    let flags = g.nodes[sub].flags;
                    g.nodes[sub].flags = flags & !NodeFlags::PENDING;
                }

                sub = self.graph.borrow().links[link].sub;
                if let Some(next) = self.graph.borrow().links[link].next_dep {
                    link = next;
                    continue 'top;
                }
                dirty = false;
            }

            return dirty;
        }
    }

    /// Re-resolve a node's value, returning whether it actually changed.
    /// The answer drives whether propagation continues further downstream.
    pub(crate) fn update_node(&self, node: NodeKey) -> bool {
        let kind = self.graph.borrow().nodes.get(node).map(|n| n.kind());
        match kind {
            Some(NodeKind::Signal) => self.update_signal(node),
            Some(NodeKind::Computed) => self.update_computed(node),
            _ => false,
        }
    }

    /// Sync a signal's `previous` snapshot with its current value. Changed
    /// means a write since the last resolution really altered the value.
    pub(crate) fn update_signal(&self, node: NodeKey) -> bool {
        let mut g = self.graph.borrow_mut();
        let Some(n) = g.nodes.get_mut(node) else {
            return false;
        };
        n.flags = NodeFlags::MUTABLE;
        let NodeBody::Signal { value, previous, eq, dup } = &mut n.body else {
            return false;
        };
        if (eq)(&**previous, &**value) {
            false
        } else {
            *previous = (dup)(&**value);
            true
        }
    }

    /// Re-evaluate a computed under tracking, against its previous cached
    /// value. A panic during re-evaluation keeps the old value and reports
    /// the node unchanged; a panic on the first evaluation (no cache to
    /// fall back to) is re-raised to the caller.
    pub(crate) fn update_computed(&self, node: NodeKey) -> bool {
        let (getter, old) = {
            let mut g = self.graph.borrow_mut();
            g.start_tracking(node);
            let NodeBody::Computed { value, getter, .. } = &mut g.nodes[node].body else {
                unreachable!("update_computed on a non-computed node");
            };
            (Rc::clone(getter), value.take())
        };

        let prev = self.ctx.set_active_sub(Some(node));
        let result = catch_unwind(AssertUnwindSafe(|| (*getter)(old.as_deref())));
        self.ctx.set_active_sub(prev);

        match result {
            Ok(new_value) => {
                let mut g = self.graph.borrow_mut();
                g.end_tracking(node);
                let Some(n) = g.nodes.get_mut(node) else {
                    return false;
                };
                let NodeBody::Computed { value, eq, .. } = &mut n.body else {
                    unreachable!("update_computed on a non-computed node");
                };
                let changed = match &old {
                    Some(previous) => !(eq)(&**previous, &*new_value),
                    None => true,
                };
                *value = Some(new_value);
                changed
            }
            Err(payload) => {
                self.graph.borrow_mut().end_tracking(node);
                match old {
                    Some(previous) => {
                        if let Some(n) = self.graph.borrow_mut().nodes.get_mut(node) {
                            if let NodeBody::Computed { value, .. } = &mut n.body {
                                *value = Some(previous);
                            }
                        }
                        self.report(ReactiveError::ComputedPanicked(panic_message(&*payload)));
                        false
                    }
                    None => {
                        // First evaluation failed: leave the node dirty so a
                        // later read retries instead of finding no cache.
                        if let Some(n) = self.graph.borrow_mut().nodes.get_mut(node) {
                            n.flags |= NodeFlags::DIRTY;
                        }
                        resume_unwind(payload)
                    }
                }
            }
        }
    }

    /// Shallow-propagate from `dep`'s subscriber list when it has more than
    /// one subscriber (the single subscriber is the one already being
    /// walked).
    fn shallow_propagate_shared(&self, dep: NodeKey) {
        let mut g = self.graph.borrow_mut();
        let Some(subs) = g.nodes.get(dep).and_then(|n| n.subs_head) else {
            return;
        };
        if g.links[subs].next_sub.is_some() {
            let mut queue = self.queue.borrow_mut();
            g.shallow_propagate(Some(subs), &mut queue);
        }
    }

    fn shallow_propagate_from(&self, link: LinkKey) {
        let mut g = self.graph.borrow_mut();
        let mut queue = self.queue.borrow_mut();
        g.shallow_propagate(Some(link), &mut queue);
    }

    /// Record a trapped failure: logged, and retained for
    /// [`Runtime::take_last_error`].
    pub(crate) fn report(&self, err: ReactiveError) {
        error!(target: "filament::reactive", %err, "trapped panic at reactive boundary");
        *self.last_error.borrow_mut() = Some(err);
    }

    /// Defer freeing a node whose last handle was dropped. Handle drops may
    /// fire while the graph is borrowed (a pruned node's closure drops the
    /// handles it captured), so the actual release happens in [`sweep`].
    ///
    /// [`sweep`]: RuntimeInner::sweep
    pub(crate) fn defer_release(&self, key: NodeKey) {
        self.dropped.borrow_mut().push(key);
    }

    pub(crate) fn sweep(&self) {
        loop {
            let key = self.dropped.borrow_mut().pop();
            match key {
                Some(k) => self.graph.borrow_mut().release(k),
                None => break,
            }
        }
    }
}

/// Shared core of the typed `Signal`/`Computed` handles: a weak reference
/// to the runtime plus the node's arena key. Dropping the last clone defers
/// the node for release.
pub(crate) struct NodeRef {
    rt: Weak<RuntimeInner>,
    key: NodeKey,
}

impl NodeRef {
    pub(crate) fn new(rt: &Rc<RuntimeInner>, key: NodeKey) -> Self {
        NodeRef {
            rt: Rc::downgrade(rt),
            key,
        }
    }

    pub(crate) fn key(&self) -> NodeKey {
        self.key
    }

    pub(crate) fn runtime(&self) -> Rc<RuntimeInner> {
        self.rt.upgrade().expect("reactive runtime dropped")
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.defer_release(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_depth_nests() {
        let rt = Runtime::new();
        rt.start_batch();
        rt.start_batch();
        assert_eq!(rt.inner.batch_depth.get(), 2);
        rt.end_batch();
        assert_eq!(rt.inner.batch_depth.get(), 1);
        rt.end_batch();
        assert_eq!(rt.inner.batch_depth.get(), 0);
    }

    #[test]
    fn flush_skips_disposed_nodes() {
        let rt = Runtime::new();
        let stale = {
            let mut g = rt.inner.graph.borrow_mut();
            let key = g.nodes.insert(crate::graph::Node::effect(Rc::new(|| {
                panic!("must not run");
            })));
            g.nodes.remove(key);
            key
        };
        rt.inner.queue.borrow_mut().push_back(stale);
        rt.inner.flush();
    }

    #[test]
    fn report_retains_most_recent_error() {
        let rt = Runtime::new();
        rt.inner.report(ReactiveError::EffectPanicked("first".into()));
        rt.inner.report(ReactiveError::EffectPanicked("second".into()));
        assert_eq!(
            rt.take_last_error(),
            Some(ReactiveError::EffectPanicked("second".into()))
        );
        assert_eq!(rt.take_last_error(), None);
    }

    #[test]
    fn runtime_clones_share_state() {
        let rt = Runtime::new();
        let rt2 = rt.clone();
        rt.start_batch();
        assert_eq!(rt2.inner.batch_depth.get(), 1);
        rt2.end_batch();
        assert_eq!(rt.inner.batch_depth.get(), 0);
    }
}
