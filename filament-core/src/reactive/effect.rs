//! Effects
//!
//! An [`Effect`] runs a function immediately, records every signal and
//! computed it reads, and re-runs whenever one of those inputs actually
//! changes. Effects are the only graph nodes that execute on their own;
//! everything upstream of them stays lazy.
//!
//! An effect created inside another effect (or inside a scope) becomes a
//! child of it: notifications bubble to the outermost parent so an update
//! pass runs parents before children, and disposing the parent disposes the
//! whole subtree.
//!
//! Unlike signal and computed handles, dropping an [`Effect`] handle does
//! not stop the effect. Call [`Effect::dispose`] to detach it.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::graph::{Node, NodeKey};

use super::runtime::{Runtime, RuntimeInner};

/// Handle to a running effect.
#[derive(Clone)]
pub struct Effect {
    rt: Weak<RuntimeInner>,
    key: NodeKey,
}

impl Runtime {
    /// Create an effect and run it once immediately. The initial run is not
    /// trapped: a panic during it propagates to the caller and no effect is
    /// registered as watching.
    pub fn effect(&self, f: impl Fn() + 'static) -> Effect {
        let run: Rc<dyn Fn()> = Rc::new(f);
        let key = self
            .inner
            .graph
            .borrow_mut()
            .nodes
            .insert(Node::effect(Rc::clone(&run)));
        {
            let mut g = self.inner.graph.borrow_mut();
            if let Some(parent) = self.inner.ctx.active_sub() {
                g.link(key, parent);
            } else if let Some(scope) = self.inner.ctx.active_scope() {
                g.link(key, scope);
            }
        }
        trace!(target: "filament::reactive", ?key, "created effect");

        let prev = self.inner.ctx.set_active_sub(Some(key));
        let result = catch_unwind(AssertUnwindSafe(|| (*run)()));
        self.inner.ctx.set_active_sub(prev);
        if let Err(payload) = result {
            self.inner.graph.borrow_mut().purge(key);
            resume_unwind(payload);
        }

        Effect {
            rt: Rc::downgrade(&self.inner),
            key,
        }
    }
}

impl Effect {
    /// Detach the effect: unsubscribe from all dependencies, dispose any
    /// child effects, and free the node. Idempotent; it never re-runs
    /// afterwards.
    pub fn dispose(&self) {
        let Some(rt) = self.rt.upgrade() else { return };
        trace!(target: "filament::reactive", key = ?self.key, "disposing effect");
        rt.graph.borrow_mut().purge(self.key);
        rt.sweep();
    }

    pub fn is_disposed(&self) -> bool {
        match self.rt.upgrade() {
            Some(rt) => rt.graph.borrow().nodes.get(self.key).is_none(),
            None => true,
        }
    }

    /// Number of dependencies recorded by the most recent run. Repeated
    /// reads of the same source within one run collapse to a single edge.
    pub fn dependency_count(&self) -> usize {
        match self.rt.upgrade() {
            Some(rt) => rt.graph.borrow().dep_count(self.key),
            None => 0,
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("key", &self.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
