//! Per-instruction liveness analysis.
//!
//! The classic backward dataflow problem:
//!
//! ```text
//! live_in(i)  = use(i) ∪ (live_out(i) − def(i))
//! live_out(i) = ⋃ live_in(s)   over the successors s of i
//! ```
//!
//! iterated to a fixpoint, visiting instructions in reverse order so most
//! procedures converge in two sweeps.

use crate::flowgraph::ControlFlowGraph;
use crate::inst::Inst;
use crate::temp::Temp;
use rustc_hash::FxHashSet;

/// The result of liveness analysis: for each instruction, the temps live
/// on its out-edges.
pub struct Liveness {
    live_out: Vec<FxHashSet<Temp>>,
}

impl Liveness {
    /// Solve the dataflow equations for `insts`.
    pub fn compute(insts: &[Inst], cfg: &ControlFlowGraph) -> Self {
        let n = insts.len();
        let mut live_in: Vec<FxHashSet<Temp>> = vec![FxHashSet::default(); n];
        let mut live_out: Vec<FxHashSet<Temp>> = vec![FxHashSet::default(); n];

        let mut changed = true;
        while changed {
            changed = false;
            for i in (0..n).rev() {
                let mut out = FxHashSet::default();
                for &s in cfg.succs(i) {
                    out.extend(live_in[s].iter().copied());
                }
                let mut inn: FxHashSet<Temp> = insts[i].uses().iter().copied().collect();
                for &t in &out {
                    if !insts[i].defs().contains(&t) {
                        inn.insert(t);
                    }
                }
                if out != live_out[i] || inn != live_in[i] {
                    changed = true;
                    live_out[i] = out;
                    live_in[i] = inn;
                }
            }
        }

        Self { live_out }
    }

    /// Temps live out of instruction `i`.
    pub fn live_out(&self, i: usize) -> &FxHashSet<Temp> {
        &self.live_out[i]
    }
}
