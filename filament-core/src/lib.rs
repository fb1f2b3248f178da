//! Filament Core
//!
//! This crate provides a fine-grained push-pull reactive engine:
//!
//! - Reactive primitives (signals, computeds, effects, effect scopes)
//! - An arena-backed dependency graph with intrusive doubly-linked edges
//! - Iterative propagation and staleness-checking walks
//! - A FIFO effect scheduler with batching
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the user-facing primitives and the runtime that owns them
//! - `graph`: the node arena, edge maintenance, and propagation walks
//!
//! # Example
//!
//! ```rust
//! use filament_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(0);
//!
//! // Create a derived value
//! let count2 = count.clone();
//! let doubled = rt.computed(move |_| count2.get() * 2);
//!
//! // Create an effect
//! let doubled2 = doubled.clone();
//! let effect = rt.effect(move || {
//!     println!("doubled: {}", doubled2.get());
//! });
//!
//! // Update the signal; the effect re-runs before `set` returns
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//!
//! effect.dispose();
//! ```

pub mod graph;
pub mod reactive;
