//! Target machine abstraction.
//!
//! The frame module and the instruction selector are parameterized by a
//! target description: word size, register file, calling convention, and
//! the entry/exit conventions of a procedure. A `TargetIsa` trait object is
//! immutable and can serve any number of concurrent compilations.
//!
//! Obtain one with [`lookup`]:
//!
//! ```
//! let isa = tiger_codegen::isa::lookup("riscv64".parse().unwrap()).unwrap();
//! assert_eq!(isa.name(), "riscv");
//! ```

pub mod registers;
pub mod riscv;

use crate::frame::Frame;
use crate::inst::Inst;
use crate::ir::Stmt;
use crate::result::CodegenResult;
use crate::temp::{Label, Temp, TempCtx};
use core::fmt;
use target_lexicon::{Architecture, Triple};

pub use self::registers::RegInfo;

/// Methods implemented by every supported target.
pub trait TargetIsa {
    /// Short name of this ISA.
    fn name(&self) -> &'static str;

    /// The target triple this ISA was built for.
    fn triple(&self) -> &Triple;

    /// Size in bytes of a machine word (and of every Tiger value).
    fn word_size(&self) -> i32;

    /// Description of the target's register file. The low temp numbers are
    /// reserved for these registers.
    fn register_info(&self) -> &RegInfo;

    /// The frame pointer. Reserved; variable accesses are addressed off it.
    fn frame_pointer(&self) -> Temp;

    /// The stack pointer. Reserved.
    fn stack_pointer(&self) -> Temp;

    /// The register holding a function's result.
    fn return_value(&self) -> Temp;

    /// The register holding the return address after a call.
    fn return_address(&self) -> Temp;

    /// Argument registers in passing order. The static link travels in the
    /// first one.
    fn arg_regs(&self) -> &[Temp];

    /// Registers a function must preserve, the return address included.
    /// Stage 1 of `proc_entry_exit` saves these into fresh temps.
    fn callee_saved(&self) -> &[Temp];

    /// Registers a call may clobber.
    fn caller_saved(&self) -> &[Temp];

    /// Registers available to the allocator, in preference order. Their
    /// count is the `K` of graph coloring.
    fn allocatable(&self) -> &[Temp];

    /// Stage 1: wrap a procedure body with the moves that shift incoming
    /// arguments into their accesses and save/restore the callee-saved
    /// registers through coalescable temps.
    fn proc_entry_exit1(&self, frame: &Frame, tmp: &mut TempCtx, body: Stmt) -> Stmt;

    /// Tile a canonical statement sequence into target instructions.
    fn codegen(&self, tmp: &mut TempCtx, stmts: &[Stmt]) -> CodegenResult<Vec<Inst>>;

    /// Stage 2: append the epilogue marker announcing which registers stay
    /// live out of the procedure body.
    fn proc_entry_exit2(&self, insts: &mut Vec<Inst>);

    /// Stage 3: wrap the rendered body with prologue and epilogue text.
    fn proc_entry_exit3(&self, frame: &Frame, tmp: &TempCtx, body: Vec<String>) -> Vec<String>;

    /// A load of a spilled temp from its frame slot, for use by the
    /// allocator's rewrite pass.
    fn spill_load(&self, offset: i32, dst: Temp) -> Inst;

    /// A store of a spilled temp to its frame slot.
    fn spill_store(&self, offset: i32, src: Temp) -> Inst;

    /// Data directives for one string literal: its label, a length word,
    /// and the bytes.
    fn codegen_data(&self, tmp: &TempCtx, label: Label, literal: &str) -> Vec<String>;
}

/// Describes reasons for target lookup failures.
#[derive(Debug, PartialEq, Eq)]
pub enum LookupError {
    /// The requested target isn't supported.
    Unsupported,
}

impl std::error::Error for LookupError {}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::Unsupported => write!(f, "support for this target is not implemented"),
        }
    }
}

/// Look up an ISA implementation for the given target triple.
pub fn lookup(triple: Triple) -> Result<Box<dyn TargetIsa>, LookupError> {
    match triple.architecture {
        Architecture::Riscv64(_) => Ok(Box::new(riscv::Riscv64::new(triple))),
        _ => Err(LookupError::Unsupported),
    }
}
