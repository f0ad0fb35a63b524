//! Spill-code insertion.
//!
//! Each actual spill gets a frame slot. Every instruction that reads a
//! spilled temp loads it into a fresh temp just beforehand, and every
//! instruction that writes one stores the fresh temp just afterward. The
//! fresh temps have tiny live ranges, so the next coloring round has far
//! less pressure to contend with.

use crate::frame::{Access, FrameRef};
use crate::inst::Inst;
use crate::isa::TargetIsa;
use crate::temp::{Temp, TempCtx};
use rustc_hash::FxHashMap;

/// Rewrite `insts`, inserting loads and stores around each occurrence of a
/// spilled temp.
pub(crate) fn rewrite_spills(
    insts: Vec<Inst>,
    spills: &[Temp],
    frame: &FrameRef,
    tmp: &mut TempCtx,
    isa: &dyn TargetIsa,
) -> Vec<Inst> {
    let mut slots: FxHashMap<Temp, i32> = FxHashMap::default();
    for &spill in spills {
        match frame.borrow_mut().alloc_local(tmp, true) {
            Access::Frame(offset) => {
                slots.insert(spill, offset);
            }
            Access::Reg(_) => unreachable!("escaping local allocated to a register"),
        }
    }

    let mut out = Vec::with_capacity(insts.len() + 2 * spills.len());
    for mut inst in insts {
        // Spilled temps occurring in this instruction, in operand order.
        let mut present: Vec<Temp> = Vec::new();
        for &t in inst.uses().iter().chain(inst.defs()) {
            if slots.contains_key(&t) && !present.contains(&t) {
                present.push(t);
            }
        }
        if present.is_empty() {
            out.push(inst);
            continue;
        }

        let mut stores: Vec<Inst> = Vec::new();
        for t in present {
            let fresh = tmp.make_temp();
            let offset = slots[&t];
            if inst.uses().contains(&t) {
                out.push(isa.spill_load(offset, fresh));
            }
            if inst.defs().contains(&t) {
                stores.push(isa.spill_store(offset, fresh));
            }
            inst.rename(t, fresh);
        }
        out.push(inst);
        out.extend(stores);
    }
    out
}
