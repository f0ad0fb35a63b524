//! Register allocation.
//!
//! This module contains the data structures and algorithms that map the
//! unbounded temps of a procedure onto the target's register file:
//! per-instruction liveness, an interference graph colored with iterated
//! coalescing, and a spill rewriter that the [`Context`] drives to a
//! fixpoint.

pub mod liveness;

mod coloring;
mod context;
mod spilling;

pub use self::context::Context;

use crate::temp::Temp;
use rustc_hash::FxHashMap;

/// The final assignment: every temp occurring in the instruction list maps
/// to the physical-register temp it was colored with.
pub type Allocation = FxHashMap<Temp, Temp>;
