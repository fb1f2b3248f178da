//! Tracking Context
//!
//! The tracking context records which subscriber is currently executing.
//! This enables automatic dependency collection: when a signal or computed
//! is read, the graph links the active subscriber as a dependent.
//!
//! One context exists per [`crate::reactive::Runtime`] instance; there is no
//! process-global state. Nested tracked executions (a computed evaluated
//! inside an effect, an effect created inside another effect) save and
//! restore the previous register around themselves, and a pause stack lets
//! code read reactive values without subscribing.

use std::cell::{Cell, RefCell};

use crate::graph::NodeKey;

/// The per-runtime tracking registers.
#[derive(Default)]
pub(crate) struct TrackingContext {
    /// Subscriber whose dependencies are currently being collected.
    active_sub: Cell<Option<NodeKey>>,
    /// Scope that newly created effects attach to.
    active_scope: Cell<Option<NodeKey>>,
    /// Saved subscribers for pause/resume regions.
    pause_stack: RefCell<Vec<Option<NodeKey>>>,
}

impl TrackingContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn active_sub(&self) -> Option<NodeKey> {
        self.active_sub.get()
    }

    pub(crate) fn active_scope(&self) -> Option<NodeKey> {
        self.active_scope.get()
    }

    /// Install `sub` as the active subscriber, returning the previous one so
    /// the caller can restore it after the nested execution.
    pub(crate) fn set_active_sub(&self, sub: Option<NodeKey>) -> Option<NodeKey> {
        self.active_sub.replace(sub)
    }

    /// Install `scope` as the active scope, returning the previous one.
    pub(crate) fn set_active_scope(&self, scope: Option<NodeKey>) -> Option<NodeKey> {
        self.active_scope.replace(scope)
    }

    /// Suspend dependency collection until the matching [`resume`].
    ///
    /// [`resume`]: TrackingContext::resume
    pub(crate) fn pause(&self) {
        let prev = self.set_active_sub(None);
        self.pause_stack.borrow_mut().push(prev);
    }

    /// Restore the subscriber saved by the matching [`pause`]. Unbalanced
    /// resumes leave tracking suspended rather than resurrecting a stale
    /// subscriber.
    ///
    /// [`pause`]: TrackingContext::pause
    pub(crate) fn resume(&self) {
        let prev = self.pause_stack.borrow_mut().pop().flatten();
        self.set_active_sub(prev);
    }
}
