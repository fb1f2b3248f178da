//! Graph Nodes
//!
//! This module defines the shared node shape for the four reactive variants
//! (signal, computed, effect, effect scope) and the `Link` edge record that
//! connects them.
//!
//! Nodes and links live in generational arenas (`slotmap`) and refer to each
//! other by key, never by reference. A stale key resolves to `None` instead
//! of aliasing a reused slot, which is what makes disposal during re-entrant
//! execution safe.

use std::any::Any;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};
use std::rc::Rc;

use slotmap::new_key_type;

new_key_type! {
    /// Key of a [`Node`] in the node arena.
    pub struct NodeKey;

    /// Key of a [`Link`] in the link arena.
    pub struct LinkKey;
}

/// Per-node state bits.
///
/// The bits encode the small state machine driving propagation:
///
/// - clean (`DIRTY`/`PENDING` unset): any cached value is valid;
/// - `DIRTY`: definitely stale, must recompute/re-run on next use;
/// - `PENDING`: possibly stale, must be resolved by the lazy upstream walk;
/// - `RECURSED_CHECK`/`RECURSED`: transient markers for re-entrant visits
///   while a subscriber's dependency list is being re-traversed;
/// - `QUEUED`: the node is already in the flush queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// The node carries a value others may depend on (signal or computed).
    pub const MUTABLE: NodeFlags = NodeFlags(1);
    /// The node runs user code when its inputs change (effect).
    pub const WATCHING: NodeFlags = NodeFlags(1 << 1);
    pub const RECURSED_CHECK: NodeFlags = NodeFlags(1 << 2);
    pub const RECURSED: NodeFlags = NodeFlags(1 << 3);
    pub const DIRTY: NodeFlags = NodeFlags(1 << 4);
    pub const PENDING: NodeFlags = NodeFlags(1 << 5);
    pub const QUEUED: NodeFlags = NodeFlags(1 << 6);

    /// True if any bit of `other` is set in `self`.
    pub fn intersects(self, other: NodeFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeFlags {
    fn bitor_assign(&mut self, rhs: NodeFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for NodeFlags {
    type Output = NodeFlags;
    fn bitand(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 & rhs.0)
    }
}

impl BitAndAssign for NodeFlags {
    fn bitand_assign(&mut self, rhs: NodeFlags) {
        self.0 &= rhs.0;
    }
}

impl Not for NodeFlags {
    type Output = NodeFlags;
    fn not(self) -> NodeFlags {
        NodeFlags(!self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mutable leaf value. Has subscribers, never has dependencies.
    Signal,
    /// A cached derived value. Has both dependencies and subscribers.
    Computed,
    /// A side-effecting subscriber. Has dependencies; gains a subscriber
    /// link only when nested under another effect or scope.
    Effect,
    /// A grouping container for bulk disposal of child effects.
    Scope,
}

/// Type-erased equality used when a node's old and new values are compared.
pub(crate) type AnyEq = fn(&dyn Any, &dyn Any) -> bool;

/// Type-erased clone used to sync a signal's `previous` snapshot.
pub(crate) type AnyDup = fn(&dyn Any) -> Box<dyn Any>;

/// Type-erased computed getter: previous cached value in, new value out.
pub(crate) type AnyGetter = Rc<dyn Fn(Option<&dyn Any>) -> Box<dyn Any>>;

pub(crate) fn any_eq<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn any_dup<T: Clone + 'static>(value: &dyn Any) -> Box<dyn Any> {
    Box::new(
        value
            .downcast_ref::<T>()
            .expect("node value type mismatch")
            .clone(),
    )
}

/// Variant payload of a node.
pub(crate) enum NodeBody {
    Signal {
        /// Current value, updated eagerly on write.
        value: Box<dyn Any>,
        /// Value as of the last resolved update, compared against `value`
        /// to decide whether a write really changed anything downstream.
        previous: Box<dyn Any>,
        eq: AnyEq,
        dup: AnyDup,
    },
    Computed {
        /// Cache; `None` until the first evaluation.
        value: Option<Box<dyn Any>>,
        getter: AnyGetter,
        eq: AnyEq,
    },
    Effect {
        run: Rc<dyn Fn()>,
    },
    Scope,
}

/// A node in the dependency graph.
pub struct Node {
    pub(crate) flags: NodeFlags,
    /// Head/tail of this node's own dependency list (horizontal).
    pub(crate) deps_head: Option<LinkKey>,
    pub(crate) deps_tail: Option<LinkKey>,
    /// Head/tail of this node's subscriber list (vertical).
    pub(crate) subs_head: Option<LinkKey>,
    pub(crate) subs_tail: Option<LinkKey>,
    /// Set once the last external handle to this node has been dropped;
    /// the node is removed from the arena when it also loses its last
    /// subscriber.
    pub(crate) unreferenced: bool,
    pub(crate) body: NodeBody,
}

impl Node {
    fn with_body(flags: NodeFlags, body: NodeBody) -> Self {
        Self {
            flags,
            deps_head: None,
            deps_tail: None,
            subs_head: None,
            subs_tail: None,
            unreferenced: false,
            body,
        }
    }

    /// A signal node starts resolved: `previous` mirrors the initial value.
    pub(crate) fn signal(
        value: Box<dyn Any>,
        previous: Box<dyn Any>,
        eq: AnyEq,
        dup: AnyDup,
    ) -> Self {
        Self::with_body(
            NodeFlags::MUTABLE,
            NodeBody::Signal { value, previous, eq, dup },
        )
    }

    /// A computed node starts dirty so the first read evaluates it.
    pub(crate) fn computed(getter: AnyGetter, eq: AnyEq) -> Self {
        Self::with_body(
            NodeFlags::MUTABLE | NodeFlags::DIRTY,
            NodeBody::Computed { value: None, getter, eq },
        )
    }

    pub(crate) fn effect(run: Rc<dyn Fn()>) -> Self {
        Self::with_body(NodeFlags::WATCHING, NodeBody::Effect { run })
    }

    pub(crate) fn scope() -> Self {
        Self::with_body(NodeFlags::NONE, NodeBody::Scope)
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Signal { .. } => NodeKind::Signal,
            NodeBody::Computed { .. } => NodeKind::Computed,
            NodeBody::Effect { .. } => NodeKind::Effect,
            NodeBody::Scope => NodeKind::Scope,
        }
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind())
            .field("flags", &self.flags)
            .field("deps_head", &self.deps_head)
            .field("subs_head", &self.subs_head)
            .finish()
    }
}

/// An edge record connecting one dependency to one subscriber.
///
/// Every link is simultaneously an entry in two doubly-linked lists: the
/// dependency's subscriber list (`prev_sub`/`next_sub`) and the subscriber's
/// dependency list (`prev_dep`/`next_dep`). A link is uniquely identified by
/// its `(dep, sub)` pair; duplicates must never coexist.
#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub(crate) dep: NodeKey,
    pub(crate) sub: NodeKey,
    pub(crate) prev_dep: Option<LinkKey>,
    pub(crate) next_dep: Option<LinkKey>,
    pub(crate) prev_sub: Option<LinkKey>,
    pub(crate) next_sub: Option<LinkKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_ops() {
        let f = NodeFlags::MUTABLE | NodeFlags::DIRTY;
        assert!(f.intersects(NodeFlags::DIRTY));
        assert!(f.contains(NodeFlags::MUTABLE | NodeFlags::DIRTY));
        assert!(!f.contains(NodeFlags::MUTABLE | NodeFlags::PENDING));
        assert!((f & !NodeFlags::DIRTY) == NodeFlags::MUTABLE);
        assert!(NodeFlags::NONE.is_empty());
    }

    #[test]
    fn flag_assign_ops() {
        let mut f = NodeFlags::WATCHING;
        f |= NodeFlags::QUEUED;
        assert!(f.contains(NodeFlags::WATCHING | NodeFlags::QUEUED));
        f &= !NodeFlags::QUEUED;
        assert_eq!(f, NodeFlags::WATCHING);
    }

    #[test]
    fn node_kinds() {
        let s = Node::signal(Box::new(1i32), Box::new(1i32), any_eq::<i32>, any_dup::<i32>);
        assert_eq!(s.kind(), NodeKind::Signal);
        assert_eq!(s.flags(), NodeFlags::MUTABLE);

        let c = Node::computed(Rc::new(|_| Box::new(0i32) as Box<dyn Any>), any_eq::<i32>);
        assert_eq!(c.kind(), NodeKind::Computed);
        assert!(c.flags().contains(NodeFlags::MUTABLE | NodeFlags::DIRTY));

        let e = Node::effect(Rc::new(|| {}));
        assert_eq!(e.kind(), NodeKind::Effect);
        assert_eq!(e.flags(), NodeFlags::WATCHING);

        assert_eq!(Node::scope().kind(), NodeKind::Scope);
        assert!(Node::scope().flags().is_empty());
    }

    #[test]
    fn erased_eq_and_dup() {
        let a: Box<dyn Any> = Box::new(String::from("x"));
        let b: Box<dyn Any> = Box::new(String::from("x"));
        let c: Box<dyn Any> = Box::new(String::from("y"));
        assert!(any_eq::<String>(&*a, &*b));
        assert!(!any_eq::<String>(&*a, &*c));

        let d = any_dup::<String>(&*c);
        assert!(any_eq::<String>(&*c, &*d));
    }
}
