//! A control flow graph over an instruction list.
//!
//! Nodes are instruction positions. An instruction with explicit branch
//! targets has exactly those targets as successors; any other instruction
//! falls through to the next position. The graph is the substrate for
//! liveness analysis.

use crate::inst::Inst;
use crate::temp::Label;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Control flow between the instructions of one procedure.
pub struct ControlFlowGraph {
    succs: Vec<SmallVec<[usize; 2]>>,
    preds: Vec<SmallVec<[usize; 2]>>,
}

impl ControlFlowGraph {
    /// Compute the control flow graph for `insts`.
    ///
    /// Every branch target must be defined by a `LABEL` instruction in the
    /// same list; a dangling target is a compiler bug and panics.
    pub fn with_insts(insts: &[Inst]) -> Self {
        let mut label_at: FxHashMap<Label, usize> = FxHashMap::default();
        for (i, inst) in insts.iter().enumerate() {
            if let Inst::Label { label, .. } = inst {
                label_at.insert(*label, i);
            }
        }

        let mut succs: Vec<SmallVec<[usize; 2]>> = vec![SmallVec::new(); insts.len()];
        let mut preds: Vec<SmallVec<[usize; 2]>> = vec![SmallVec::new(); insts.len()];
        for (i, inst) in insts.iter().enumerate() {
            let jumps = inst.jumps();
            if jumps.is_empty() {
                if i + 1 < insts.len() {
                    succs[i].push(i + 1);
                }
            } else {
                for target in jumps {
                    let j = *label_at
                        .get(target)
                        .unwrap_or_else(|| panic!("jump to undefined label {}", target));
                    succs[i].push(j);
                }
            }
        }
        for (i, ss) in succs.iter().enumerate() {
            for &j in ss {
                preds[j].push(i);
            }
        }

        Self { succs, preds }
    }

    /// Number of nodes (instructions).
    pub fn len(&self) -> usize {
        self.succs.len()
    }

    /// Is the graph empty?
    pub fn is_empty(&self) -> bool {
        self.succs.is_empty()
    }

    /// Successor positions of instruction `i`.
    pub fn succs(&self, i: usize) -> &[usize] {
        &self.succs[i]
    }

    /// Predecessor positions of instruction `i`.
    pub fn preds(&self, i: usize) -> &[usize] {
        &self.preds[i]
    }
}
