//! Error Types
//!
//! Panics raised by user closures during a *re-run* are trapped at the
//! effect/getter call boundary so one failing subscriber cannot abort a
//! flush or corrupt the graph. The trapped payload is converted into a
//! [`ReactiveError`], reported through `tracing`, and retained on the
//! runtime for inspection. Panics during an initial run propagate to the
//! caller unchanged.

use std::any::Any;

use thiserror::Error;

/// A failure trapped at a reactive call boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// An effect's function panicked while re-running during a flush.
    #[error("effect panicked during re-run: {0}")]
    EffectPanicked(String),

    /// A computed's getter panicked while re-evaluating; the previous cached
    /// value was kept and the node treated as unchanged.
    #[error("computed getter panicked during re-evaluation: {0}")]
    ComputedPanicked(String),
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
