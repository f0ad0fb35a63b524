//! Backend compilation context and main entry point.
//!
//! The `Context` drives one procedure fragment at a time through the whole
//! pipeline (linearize, basic blocks, trace scheduling, instruction
//! selection, the epilogue marker, register allocation, prologue and
//! epilogue text) and lowers string fragments to data directives. It owns
//! no target state: the ISA is passed in and can serve several contexts.

use crate::canon;
use crate::frame::{Fragment, FrameRef};
use crate::inst::Inst;
use crate::ir::Stmt;
use crate::isa::TargetIsa;
use crate::regalloc;
use crate::result::CodegenResult;
use crate::temp::TempCtx;

/// The rendered output of one compilation: assembly text and data lines.
pub struct CompiledModule {
    /// Procedure text, in fragment order.
    pub text: Vec<String>,
    /// Data directives for the string literals.
    pub data: Vec<String>,
}

/// Persistent state for compiling a stream of fragments.
pub struct Context {
    regalloc: regalloc::Context,
}

impl Context {
    /// Allocate a new compilation context.
    pub fn new() -> Self {
        Self {
            regalloc: regalloc::Context::new(),
        }
    }

    /// Compile every fragment of a program.
    ///
    /// `tmp` must be the supply the fragments were translated with, so the
    /// backend's fresh temps and labels stay distinct from translation's.
    pub fn compile(
        &mut self,
        isa: &dyn TargetIsa,
        fragments: Vec<Fragment>,
        tmp: &mut TempCtx,
    ) -> CodegenResult<CompiledModule> {
        let mut text = Vec::new();
        let mut data = Vec::new();
        for fragment in fragments {
            match fragment {
                Fragment::Proc { body, frame } => {
                    text.extend(self.compile_proc(isa, body, &frame, tmp)?);
                }
                Fragment::Str(label, literal) => {
                    data.extend(isa.codegen_data(tmp, label, &literal));
                }
            }
        }
        Ok(CompiledModule { text, data })
    }

    fn compile_proc(
        &mut self,
        isa: &dyn TargetIsa,
        body: Stmt,
        frame: &FrameRef,
        tmp: &mut TempCtx,
    ) -> CodegenResult<Vec<String>> {
        log::debug!("compiling {}", tmp.label_name(frame.borrow().name()));

        let stmts = canon::linearize(body, tmp);
        #[cfg(debug_assertions)]
        canon::verify_canonical(&stmts);

        let (blocks, done) = canon::basic_blocks(stmts, tmp);
        #[cfg(debug_assertions)]
        canon::verify_blocks(&blocks);

        let trace = canon::trace_schedule(blocks, done, tmp);
        #[cfg(debug_assertions)]
        {
            canon::verify_canonical(&trace);
            canon::verify_trace(&trace);
        }

        let mut insts = isa.codegen(tmp, &trace)?;
        isa.proc_entry_exit2(&mut insts);
        let (insts, alloc) = self.regalloc.run(isa, frame, tmp, insts);

        let reg_info = isa.register_info();
        let reg_name = |t: crate::temp::Temp| reg_info.name(alloc[&t]).to_string();
        let mut lines = Vec::with_capacity(insts.len());
        for inst in &insts {
            match inst {
                Inst::Label { .. } => lines.push(inst.format(&reg_name)),
                // A copy whose ends were colored alike has done its job.
                Inst::Move { dst, src, .. } if alloc[dst] == alloc[src] => {}
                Inst::Oper { asm, .. } if asm.is_empty() => {}
                _ => lines.push(format!("    {}", inst.format(&reg_name))),
            }
        }
        Ok(isa.proc_entry_exit3(&frame.borrow(), tmp, lines))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
