//! Computed Values
//!
//! A [`Computed`] is a cached derivation. Nothing evaluates until the value
//! is first read, and a re-read after upstream writes only re-runs the
//! getter when the lazy upstream check confirms an input really changed.
//! When re-evaluation yields an equal value, downstream subscribers are not
//! disturbed at all.
//!
//! The getter receives its previous cached value (`None` on the first run),
//! which makes incremental derivations like counters and reducers natural
//! to write.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

use crate::graph::{any_eq, AnyGetter, Node, NodeBody, NodeFlags};

use super::runtime::{NodeRef, Runtime};

/// A lazily evaluated, cached reactive derivation.
pub struct Computed<T: 'static> {
    node: Rc<NodeRef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Computed {
            node: Rc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl Runtime {
    /// Create a computed value. `getter` runs under dependency tracking and
    /// receives the previous cached value, or `None` on the first
    /// evaluation.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn(Option<&T>) -> T + 'static,
    {
        let erased: AnyGetter = Rc::new(move |previous: Option<&dyn Any>| {
            let previous = previous.map(|p| {
                p.downcast_ref::<T>()
                    .expect("computed cache type mismatch")
            });
            Box::new(getter(previous)) as Box<dyn Any>
        });
        let key = self
            .inner
            .graph
            .borrow_mut()
            .nodes
            .insert(Node::computed(erased, any_eq::<T>));
        trace!(target: "filament::reactive", ?key, "created computed");
        Computed {
            node: Rc::new(NodeRef::new(&self.inner, key)),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Read the cached value, re-evaluating first if an input changed.
    /// Subscribes the active subscriber, or the active scope when read at
    /// scope setup time.
    pub fn get(&self) -> T {
        let rt = self.node.runtime();
        let key = self.node.key();

        let flags = rt.graph.borrow().nodes[key].flags;
        let mut should_update = flags.intersects(NodeFlags::DIRTY);
        if !should_update && flags.intersects(NodeFlags::PENDING) {
            let deps = rt.graph.borrow().nodes[key].deps_head;
            should_update = match deps {
                Some(head) => rt.check_dirty(head, key),
                None => false,
            };
            if !should_update {
                if let Some(node) = rt.graph.borrow_mut().nodes.get_mut(key) {
                    node.flags &= !NodeFlags::PENDING;
                }
            }
        }

        if should_update && rt.update_computed(key) {
            let subs = rt.graph.borrow().nodes[key].subs_head;
            if let Some(subs) = subs {
                let mut g = rt.graph.borrow_mut();
                let mut queue = rt.queue.borrow_mut();
                g.shallow_propagate(Some(subs), &mut queue);
            }
        }

        {
            let mut g = rt.graph.borrow_mut();
            if let Some(sub) = rt.ctx.active_sub() {
                g.link(key, sub);
            } else if let Some(scope) = rt.ctx.active_scope() {
                g.link(key, scope);
            }
        }

        let g = rt.graph.borrow();
        let NodeBody::Computed { value, .. } = &g.nodes[key].body else {
            unreachable!("computed handle bound to a non-computed node");
        };
        value
            .as_ref()
            .expect("computed value present after evaluation")
            .downcast_ref::<T>()
            .expect("computed value type mismatch")
            .clone()
    }
}

impl<T: 'static> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed").field("key", &self.node.key()).finish()
    }
}
