//! Signals
//!
//! A [`Signal`] is a writable reactive cell, the only place where change
//! enters the graph. Reads inside a tracked execution subscribe the reader;
//! writes mark subscribers stale and, outside a batch, flush the effect
//! queue before returning.
//!
//! Handles are cheap to clone and share one underlying node. The node is
//! released from the arena once the last handle is dropped and nothing in
//! the graph subscribes to it anymore.

use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

use crate::graph::{any_dup, any_eq, Node, NodeBody, NodeFlags};

use super::runtime::{NodeRef, Runtime, RuntimeInner};

/// A writable reactive value.
pub struct Signal<T: 'static> {
    node: Rc<NodeRef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal {
            node: Rc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl Runtime {
    /// Create a writable signal holding `value`.
    pub fn signal<T: Clone + PartialEq + 'static>(&self, value: T) -> Signal<T> {
        let key = self.inner.graph.borrow_mut().nodes.insert(Node::signal(
            Box::new(value.clone()),
            Box::new(value),
            any_eq::<T>,
            any_dup::<T>,
        ));
        trace!(target: "filament::reactive", ?key, "created signal");
        Signal {
            node: Rc::new(NodeRef::new(&self.inner, key)),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Read the current value, subscribing the active subscriber if one is
    /// collecting dependencies.
    pub fn get(&self) -> T {
        let rt = self.node.runtime();
        let key = self.node.key();

        // A dirty signal read before its subscribers flushed resolves
        // itself and upgrades still-pending subscribers on the spot.
        let flags = rt.graph.borrow().nodes[key].flags;
        if flags.intersects(NodeFlags::DIRTY) && rt.update_signal(key) {
            let subs = rt.graph.borrow().nodes[key].subs_head;
            if let Some(subs) = subs {
                let mut g = rt.graph.borrow_mut();
                let mut queue = rt.queue.borrow_mut();
                g.shallow_propagate(Some(subs), &mut queue);
            }
        }

        if let Some(sub) = rt.ctx.active_sub() {
            rt.graph.borrow_mut().link(key, sub);
        }

        self.read(&rt)
    }

    /// Read the current value without subscribing anyone.
    pub fn get_untracked(&self) -> T {
        let rt = self.node.runtime();
        self.read(&rt)
    }

    /// Write a new value. Equal values are a no-op; otherwise subscribers
    /// are marked stale and, outside a batch, the effect queue is flushed
    /// before this returns.
    pub fn set(&self, value: T) {
        let rt = self.node.runtime();
        let key = self.node.key();

        let subs = {
            let mut g = rt.graph.borrow_mut();
            let node = &mut g.nodes[key];
            let NodeBody::Signal { value: current, .. } = &mut node.body else {
                unreachable!("signal handle bound to a non-signal node");
            };
            let current = current
                .downcast_mut::<T>()
                .expect("signal value type mismatch");
            if *current == value {
                None
            } else {
                *current = value;
                node.flags = NodeFlags::MUTABLE | NodeFlags::DIRTY;
                node.subs_head
            }
        };

        if let Some(subs) = subs {
            {
                let mut g = rt.graph.borrow_mut();
                let mut queue = rt.queue.borrow_mut();
                g.propagate(subs, &mut queue);
            }
            if rt.batch_depth.get() == 0 {
                rt.flush();
            }
        }
        rt.sweep();
    }

    /// Write a value derived from the current one. The read does not
    /// subscribe the caller.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.get_untracked();
        self.set(f(&current));
    }

    fn read(&self, rt: &RuntimeInner) -> T {
        let g = rt.graph.borrow();
        let NodeBody::Signal { value, .. } = &g.nodes[self.node.key()].body else {
            unreachable!("signal handle bound to a non-signal node");
        };
        value
            .downcast_ref::<T>()
            .expect("signal value type mismatch")
            .clone()
    }
}

impl<T: 'static> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("key", &self.node.key()).finish()
    }
}
