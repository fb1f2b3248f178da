//! Effect Scopes
//!
//! An [`EffectScope`] groups the effects created while its setup closure
//! runs so they can all be disposed with one call. Scopes nest: disposing
//! an outer scope tears down inner scopes and their effects too.
//!
//! The setup closure runs with no active subscriber, so reads inside it do
//! not subscribe the scope itself; the scope only collects the effects (and
//! nested scopes) created under it.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::graph::{Node, NodeKey};

use super::runtime::{Runtime, RuntimeInner};

/// Handle to a group of effects with shared teardown.
#[derive(Clone)]
pub struct EffectScope {
    rt: Weak<RuntimeInner>,
    key: NodeKey,
}

impl Runtime {
    /// Run `f` inside a new scope and return its handle. Effects created
    /// during `f` (at any nesting depth not captured by a closer scope)
    /// belong to it.
    pub fn effect_scope(&self, f: impl FnOnce()) -> EffectScope {
        let key = self.inner.graph.borrow_mut().nodes.insert(Node::scope());
        {
            let mut g = self.inner.graph.borrow_mut();
            if let Some(parent) = self.inner.ctx.active_scope() {
                g.link(key, parent);
            }
        }
        trace!(target: "filament::reactive", ?key, "created effect scope");

        let prev_sub = self.inner.ctx.set_active_sub(None);
        let prev_scope = self.inner.ctx.set_active_scope(Some(key));
        let result = catch_unwind(AssertUnwindSafe(f));
        self.inner.ctx.set_active_scope(prev_scope);
        self.inner.ctx.set_active_sub(prev_sub);
        if let Err(payload) = result {
            self.inner.graph.borrow_mut().purge(key);
            resume_unwind(payload);
        }

        EffectScope {
            rt: Rc::downgrade(&self.inner),
            key,
        }
    }
}

impl EffectScope {
    /// Dispose every effect and nested scope collected by this scope, then
    /// free the scope itself. Idempotent.
    pub fn dispose(&self) {
        let Some(rt) = self.rt.upgrade() else { return };
        trace!(target: "filament::reactive", key = ?self.key, "disposing effect scope");
        rt.graph.borrow_mut().purge(self.key);
        rt.sweep();
    }

    pub fn is_disposed(&self) -> bool {
        match self.rt.upgrade() {
            Some(rt) => rt.graph.borrow().nodes.get(self.key).is_none(),
            None => true,
        }
    }
}

impl std::fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScope")
            .field("key", &self.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
