//! Register allocator context and main loop.
//!
//! Build liveness, color the interference graph, and, when actual spills
//! come back, rewrite the program and start over. The loop terminates
//! because every round moves the spilled values into frame slots whose
//! replacement temps have single-instruction live ranges.

use crate::flowgraph::ControlFlowGraph;
use crate::frame::FrameRef;
use crate::inst::Inst;
use crate::isa::TargetIsa;
use crate::regalloc::coloring;
use crate::regalloc::liveness::Liveness;
use crate::regalloc::spilling;
use crate::regalloc::Allocation;
use crate::temp::TempCtx;

/// Register allocation entry point.
pub struct Context {}

impl Context {
    /// Create a new context for register allocation.
    pub fn new() -> Self {
        Self {}
    }

    /// Allocate registers for `insts`.
    ///
    /// Returns the (possibly rewritten) instruction list and a total map
    /// from every occurring temp to its physical register.
    pub fn run(
        &mut self,
        isa: &dyn TargetIsa,
        frame: &FrameRef,
        tmp: &mut TempCtx,
        mut insts: Vec<Inst>,
    ) -> (Vec<Inst>, Allocation) {
        loop {
            let cfg = ControlFlowGraph::with_insts(&insts);
            let liveness = Liveness::compute(&insts, &cfg);
            let result = coloring::color(&insts, &liveness, isa);
            if result.spills.is_empty() {
                log::debug!(
                    "allocated {} instructions, {} temps",
                    insts.len(),
                    result.colors.len()
                );
                return (insts, result.colors);
            }
            log::debug!("spilling {} temps, rewriting", result.spills.len());
            insts = spilling::rewrite_spills(insts, &result.spills, frame, tmp, isa);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
