//! The tree intermediate representation.
//!
//! Every pass of the backend between translation and instruction selection
//! manipulates this small tree language. Canonicalization rewrites trees
//! into the restricted form instruction selection expects; see
//! [`crate::canon`] for the invariants.

mod tree;

pub use self::tree::{seq, BinOp, Expr, RelOp, Stmt};
