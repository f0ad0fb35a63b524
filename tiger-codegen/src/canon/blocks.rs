//! Basic-block construction.

use crate::ir::{Expr, Stmt};
use crate::temp::{Label, TempCtx};

/// A basic block: straight-line code entered only at its label and left
/// only by its terminal jump.
///
/// The label is kept apart from the body; `stmts` holds no `LABEL` and
/// ends with the block's one `JUMP` or `CJUMP`.
pub struct Block {
    /// The block's entry label.
    pub label: Label,
    /// The block body, terminal jump included.
    pub stmts: Vec<Stmt>,
}

/// Partition a linearized statement list into basic blocks.
///
/// A block opens at each label (a synthetic one is invented when control
/// can reach a statement without one) and closes at the first jump. Blocks
/// that fall into a following label get a synthetic jump to it, and the
/// last block jumps to the returned `done` label, which the caller places
/// at the end of the scheduled procedure.
pub fn basic_blocks(stmts: Vec<Stmt>, tmp: &mut TempCtx) -> (Vec<Block>, Label) {
    let done = tmp.make_label();
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;

    for stmt in stmts {
        match stmt {
            Stmt::Label(label) => {
                if let Some(mut block) = current.take() {
                    // Fall-through into the label becomes an explicit jump.
                    block.stmts.push(jump_to(label));
                    blocks.push(block);
                }
                current = Some(Block {
                    label,
                    stmts: Vec::new(),
                });
            }
            stmt @ (Stmt::Jump(..) | Stmt::CJump(..)) => {
                let mut block = current.take().unwrap_or_else(|| fresh_block(tmp));
                block.stmts.push(stmt);
                blocks.push(block);
            }
            stmt => {
                current
                    .get_or_insert_with(|| fresh_block(tmp))
                    .stmts
                    .push(stmt);
            }
        }
    }

    if let Some(mut block) = current.take() {
        block.stmts.push(jump_to(done));
        blocks.push(block);
    }

    (blocks, done)
}

fn fresh_block(tmp: &mut TempCtx) -> Block {
    Block {
        label: tmp.make_label(),
        stmts: Vec::new(),
    }
}

fn jump_to(label: Label) -> Stmt {
    Stmt::Jump(Box::new(Expr::Name(label)), vec![label])
}
