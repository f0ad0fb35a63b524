//! Trace scheduling.
//!
//! Orders basic blocks so that the false target of every conditional jump
//! follows it directly, matching the fall-through of the branch
//! instructions most ISAs provide. Unconditional jumps onto the very next
//! label are dropped along the way.

use crate::ir::{Expr, Stmt};
use crate::temp::{Label, TempCtx};
use rustc_hash::FxHashMap;

use super::Block;

/// Flatten `blocks` into one statement stream ordered by traces, ending
/// with `done`.
pub fn trace_schedule(blocks: Vec<Block>, done: Label, tmp: &mut TempCtx) -> Vec<Stmt> {
    let index: FxHashMap<Label, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.label, i))
        .collect();
    let mut scheduled = vec![false; blocks.len()];
    let mut order = Vec::with_capacity(blocks.len());

    // Grow a trace from each not-yet-scheduled block, following jumps into
    // unscheduled successors; prefer the false arm of a conditional so it
    // can fall through.
    for start in 0..blocks.len() {
        let mut current = start;
        while !scheduled[current] {
            scheduled[current] = true;
            order.push(current);
            let next = match blocks[current].stmts.last() {
                Some(Stmt::Jump(e, _)) => match &**e {
                    Expr::Name(l) => index.get(l).copied().filter(|&b| !scheduled[b]),
                    _ => None,
                },
                Some(Stmt::CJump(_, _, _, t, f)) => index
                    .get(f)
                    .copied()
                    .filter(|&b| !scheduled[b])
                    .or_else(|| index.get(t).copied().filter(|&b| !scheduled[b])),
                other => unreachable!("block without terminal jump: {:?}", other),
            };
            match next {
                Some(block) => current = block,
                None => break,
            }
        }
    }

    stitch(blocks, order, done, tmp)
}

/// Emit the ordered blocks, repairing each terminal against what actually
/// follows it.
fn stitch(blocks: Vec<Block>, order: Vec<usize>, done: Label, tmp: &mut TempCtx) -> Vec<Stmt> {
    let mut slots: Vec<Option<Block>> = blocks.into_iter().map(Some).collect();
    let mut out = Vec::new();

    for (pos, &bi) in order.iter().enumerate() {
        let block = slots[bi].take().expect("block scheduled twice");
        let next_label = order.get(pos + 1).map(|&j| {
            slots[j]
                .as_ref()
                .expect("later block already emitted")
                .label
        });

        out.push(Stmt::Label(block.label));
        let mut stmts = block.stmts;
        let terminal = stmts.pop().expect("empty block");
        out.extend(stmts);

        match terminal {
            Stmt::Jump(e, targets) => {
                if matches!(&*e, Expr::Name(l) if Some(*l) == next_label) {
                    // Falls through; the jump is redundant.
                } else {
                    out.push(Stmt::Jump(e, targets));
                }
            }
            Stmt::CJump(op, a, b, t, f) => {
                if Some(f) == next_label {
                    out.push(Stmt::CJump(op, a, b, t, f));
                } else if Some(t) == next_label {
                    // Flip the condition so the scheduled successor is the
                    // false arm.
                    out.push(Stmt::CJump(op.complement(), a, b, f, t));
                } else {
                    // Neither arm follows: branch through a fresh
                    // trampoline label.
                    let f2 = tmp.make_label();
                    out.push(Stmt::CJump(op, a, b, t, f2));
                    out.push(Stmt::Label(f2));
                    out.push(Stmt::Jump(Box::new(Expr::Name(f)), vec![f]));
                }
            }
            other => unreachable!("block without terminal jump: {}", other),
        }
    }

    out.push(Stmt::Label(done));
    out
}
