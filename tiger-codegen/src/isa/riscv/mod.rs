//! RISC-V 64 target.
//!
//! The integer subset of RV64 with the M extension for multiply and
//! divide. Every Tiger value is one 64-bit word, so there is a single
//! register class and no floating-point support.

mod abi;
mod lower;
pub mod registers;

use crate::frame::Frame;
use crate::inst::Inst;
use crate::ir::Stmt;
use crate::isa::{RegInfo, TargetIsa};
use crate::result::CodegenResult;
use crate::temp::{Label, Temp, TempCtx};
use target_lexicon::Triple;

use self::registers::{areg, fp, ra, sp, sreg, treg, REG_NAMES};

/// The RV64 target description.
pub struct Riscv64 {
    triple: Triple,
    reg_info: RegInfo,
    pub(super) arg_regs: Vec<Temp>,
    pub(super) callee_saved: Vec<Temp>,
    pub(super) caller_saved: Vec<Temp>,
    pub(super) allocatable: Vec<Temp>,
}

impl Riscv64 {
    /// Create a target description for the given triple.
    pub fn new(triple: Triple) -> Self {
        let arg_regs: Vec<Temp> = (0..8).map(areg).collect();
        // `ra` rides with the callee-saved registers so stage 1 preserves
        // the return address through the body.
        let mut callee_saved = vec![ra()];
        callee_saved.extend((1..=11).map(sreg));
        let mut caller_saved = vec![ra()];
        caller_saved.extend((0..7).map(treg));
        caller_saved.extend(arg_regs.iter().copied());
        let mut allocatable: Vec<Temp> = (0..7).map(treg).collect();
        allocatable.extend(arg_regs.iter().copied());
        allocatable.extend((1..=11).map(sreg));
        Self {
            triple,
            reg_info: RegInfo::new(&REG_NAMES),
            arg_regs,
            callee_saved,
            caller_saved,
            allocatable,
        }
    }
}

impl TargetIsa for Riscv64 {
    fn name(&self) -> &'static str {
        "riscv"
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }

    fn word_size(&self) -> i32 {
        8
    }

    fn register_info(&self) -> &RegInfo {
        &self.reg_info
    }

    fn frame_pointer(&self) -> Temp {
        fp()
    }

    fn stack_pointer(&self) -> Temp {
        sp()
    }

    fn return_value(&self) -> Temp {
        areg(0)
    }

    fn return_address(&self) -> Temp {
        ra()
    }

    fn arg_regs(&self) -> &[Temp] {
        &self.arg_regs
    }

    fn callee_saved(&self) -> &[Temp] {
        &self.callee_saved
    }

    fn caller_saved(&self) -> &[Temp] {
        &self.caller_saved
    }

    fn allocatable(&self) -> &[Temp] {
        &self.allocatable
    }

    fn proc_entry_exit1(&self, frame: &Frame, tmp: &mut TempCtx, body: Stmt) -> Stmt {
        abi::proc_entry_exit1(self, frame, tmp, body)
    }

    fn codegen(&self, tmp: &mut TempCtx, stmts: &[Stmt]) -> CodegenResult<Vec<Inst>> {
        lower::codegen(self, tmp, stmts)
    }

    fn proc_entry_exit2(&self, insts: &mut Vec<Inst>) {
        abi::proc_entry_exit2(self, insts)
    }

    fn proc_entry_exit3(&self, frame: &Frame, tmp: &TempCtx, body: Vec<String>) -> Vec<String> {
        abi::proc_entry_exit3(frame, tmp, body)
    }

    fn spill_load(&self, offset: i32, dst: Temp) -> Inst {
        abi::spill_load(offset, dst)
    }

    fn spill_store(&self, offset: i32, src: Temp) -> Inst {
        abi::spill_store(offset, src)
    }

    fn codegen_data(&self, tmp: &TempCtx, label: Label, literal: &str) -> Vec<String> {
        abi::codegen_data(tmp, label, literal)
    }
}
