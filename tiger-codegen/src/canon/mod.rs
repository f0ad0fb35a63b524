//! Canonicalization of the tree IR.
//!
//! Three passes run in sequence before instruction selection:
//!
//! 1. [`linearize`] removes every `ESEQ` and lifts nested calls, yielding a
//!    flat statement list;
//! 2. [`basic_blocks`] partitions that list into labeled blocks, each
//!    ending in exactly one jump;
//! 3. [`trace_schedule`] orders the blocks into traces so that every
//!    conditional jump's false target follows it directly.
//!
//! The verification helpers at the bottom assert the invariants each stage
//! establishes; the driver runs them under `debug_assertions` and the
//! tests use them directly.

mod blocks;
mod linearize;
mod trace;

pub use self::blocks::{basic_blocks, Block};
pub use self::linearize::linearize;
pub use self::trace::trace_schedule;

use crate::ir::{Expr, Stmt};

/// Assert that `stmts` is in canonical form: no `SEQ`, no `ESEQ`, and
/// every `CALL` directly under a `MOVE` into a temp or an `EXP`.
pub fn verify_canonical(stmts: &[Stmt]) {
    for stmt in stmts {
        match stmt {
            Stmt::Seq(..) => panic!("SEQ in linearized code: {}", stmt),
            Stmt::Move(dst, src) => {
                no_call(dst);
                match (&**dst, &**src) {
                    (Expr::Temp(_), Expr::Call(callee, args)) => {
                        no_call(callee);
                        args.iter().for_each(no_call);
                    }
                    _ => no_call(src),
                }
            }
            Stmt::Exp(e) => {
                if let Expr::Call(callee, args) = &**e {
                    no_call(callee);
                    args.iter().for_each(no_call);
                } else {
                    no_call(e);
                }
            }
            Stmt::Jump(e, _) => no_call(e),
            Stmt::CJump(_, a, b, _, _) => {
                no_call(a);
                no_call(b);
            }
            Stmt::Label(_) => {}
        }
    }
}

fn no_call(e: &Expr) {
    match e {
        Expr::ESeq(..) => panic!("ESEQ in linearized code: {}", e),
        Expr::Call(..) => panic!("CALL outside MOVE/EXP position: {}", e),
        Expr::BinOp(_, a, b) => {
            no_call(a);
            no_call(b);
        }
        Expr::Mem(a) => no_call(a),
        Expr::Const(_) | Expr::Name(_) | Expr::Temp(_) => {}
    }
}

/// Assert the basic-block shape: no interior label, no interior jump, and
/// a terminal `JUMP` or `CJUMP` as the one exit.
pub fn verify_blocks(blocks: &[Block]) {
    for block in blocks {
        let (terminal, interior) = block
            .stmts
            .split_last()
            .unwrap_or_else(|| panic!("block {} is empty", block.label));
        assert!(
            matches!(terminal, Stmt::Jump(..) | Stmt::CJump(..)),
            "block {} does not end in a jump: {}",
            block.label,
            terminal
        );
        for stmt in interior {
            assert!(
                !matches!(stmt, Stmt::Label(_) | Stmt::Jump(..) | Stmt::CJump(..)),
                "block {} has an interior label or jump: {}",
                block.label,
                stmt
            );
        }
    }
}

/// Assert the trace invariant: every `CJUMP` is immediately followed by
/// its false label.
pub fn verify_trace(stmts: &[Stmt]) {
    for (i, stmt) in stmts.iter().enumerate() {
        if let Stmt::CJump(_, _, _, _, f) = stmt {
            match stmts.get(i + 1) {
                Some(Stmt::Label(l)) if l == f => {}
                other => panic!(
                    "CJUMP false target {} does not follow it (next is {:?})",
                    f, other
                ),
            }
        }
    }
}
