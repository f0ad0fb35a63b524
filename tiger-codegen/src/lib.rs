//! Tiger code generation library.
//!
//! The backend of a Tiger compiler: it takes the lowered form of a
//! type-checked program, built through the constructors in
//! [`translate`], and turns it into assembly text for a target machine.
//!
//! The pipeline, per procedure:
//!
//! 1. [`translate`] produces tree-IR fragments with frame and static-link
//!    bookkeeping;
//! 2. [`canon`] linearizes the trees, forms basic blocks, and schedules
//!    traces;
//! 3. the target's instruction selector ([`isa`]) tiles the canonical
//!    trees into instructions over virtual registers;
//! 4. [`regalloc`] colors the interference graph, spilling through the
//!    frame until everything fits the register file.
//!
//! [`Context`] drives the whole thing and renders the result.

#![deny(missing_docs, trivial_numeric_casts)]
#![warn(unused_import_braces)]

pub mod canon;
pub mod flowgraph;
pub mod frame;
pub mod inst;
pub mod ir;
pub mod isa;
pub mod regalloc;
pub mod temp;
pub mod translate;

mod context;
mod result;

pub use crate::context::{CompiledModule, Context};
pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
