//! Reactive Primitives
//!
//! This module implements the user-facing reactive system: signals,
//! computeds, effects, and effect scopes, all owned by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. Reading it inside a
//! tracked execution (a computed getter or an effect function) subscribes
//! the reader; writing a different value marks subscribers stale.
//!
//! ## Computeds
//!
//! A [`Computed`] is a cached derivation. It evaluates lazily on first read
//! and re-evaluates only when an input actually changed. A re-evaluation
//! that produces an equal value stops staleness from spreading further.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting subscriber. It runs once on creation
//! and re-runs after flushes in which one of its inputs truly changed.
//! [`EffectScope`] groups effects for collective disposal.
//!
//! # Implementation Notes
//!
//! Dependency collection is automatic: the runtime's tracking context
//! records which subscriber is executing, and every read links an edge.
//! Each run replaces the previous run's edges, so dependencies follow
//! control flow from run to run.
//!
//! Updates are push-pull. A write eagerly marks downstream subscribers as
//! possibly stale and queues watching effects; before anything re-runs, a
//! lazy upstream check confirms whether an input really changed, skipping
//! work whenever equal values cut the chain. This model is the one used by
//! SolidJS, Vue 3, and Preact Signals.
//!
//! A [`Runtime`] is single-threaded by construction (`Rc` handles, no
//! `Send`); independent runtimes can live on different threads.

mod computed;
mod context;
mod effect;
mod error;
mod runtime;
mod scope;
mod signal;

pub use computed::Computed;
pub use effect::Effect;
pub use error::ReactiveError;
pub use runtime::Runtime;
pub use scope::EffectScope;
pub use signal::Signal;
