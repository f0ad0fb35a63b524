//! Target instructions over virtual registers.
//!
//! Instruction selection emits these; register allocation reads their
//! def/use/jump sets, rewrites them when spilling, and the driver renders
//! them to text once every temp has a register. The assembly text is a
//! template with positional holes (`{d0}`, `{s1}`) referring to the
//! destination and source lists, so the same instruction can be printed
//! before and after allocation.

use crate::temp::{Label, Temp};
use smallvec::SmallVec;

/// Destination operands of one instruction.
pub type DstVec = SmallVec<[Temp; 2]>;
/// Source operands of one instruction.
pub type SrcVec = SmallVec<[Temp; 3]>;
/// Branch targets of one instruction.
pub type JumpVec = SmallVec<[Label; 2]>;

/// One target instruction.
#[derive(Clone, Debug)]
pub enum Inst {
    /// An ordinary operation.
    Oper {
        /// Assembly template with `{dN}`/`{sN}` holes.
        asm: String,
        /// Temps written.
        dst: DstVec,
        /// Temps read.
        src: SrcVec,
        /// Possible branch targets. Empty means control falls through.
        jumps: JumpVec,
    },
    /// A register-to-register copy. Kept distinct so the allocator can
    /// coalesce the two temps and drop the instruction.
    Move {
        /// Assembly template with one `{d0}` and one `{s0}` hole.
        asm: String,
        /// The temp written.
        dst: Temp,
        /// The temp read.
        src: Temp,
    },
    /// A label definition.
    Label {
        /// The rendered label text, including the trailing colon.
        asm: String,
        /// The label being defined.
        label: Label,
    },
}

impl Inst {
    /// Temps written by this instruction.
    pub fn defs(&self) -> &[Temp] {
        match self {
            Inst::Oper { dst, .. } => dst,
            Inst::Move { dst, .. } => std::slice::from_ref(dst),
            Inst::Label { .. } => &[],
        }
    }

    /// Temps read by this instruction.
    pub fn uses(&self) -> &[Temp] {
        match self {
            Inst::Oper { src, .. } => src,
            Inst::Move { src, .. } => std::slice::from_ref(src),
            Inst::Label { .. } => &[],
        }
    }

    /// Branch targets. An empty list means execution falls through.
    pub fn jumps(&self) -> &[Label] {
        match self {
            Inst::Oper { jumps, .. } => jumps,
            _ => &[],
        }
    }

    /// Is this a coalescable register-to-register copy?
    pub fn is_move(&self) -> bool {
        matches!(self, Inst::Move { .. })
    }

    /// Replace every occurrence of the temp `from` with `to`.
    pub fn rename(&mut self, from: Temp, to: Temp) {
        match self {
            Inst::Oper { dst, src, .. } => {
                for t in dst.iter_mut().chain(src.iter_mut()) {
                    if *t == from {
                        *t = to;
                    }
                }
            }
            Inst::Move { dst, src, .. } => {
                if *dst == from {
                    *dst = to;
                }
                if *src == from {
                    *src = to;
                }
            }
            Inst::Label { .. } => {}
        }
    }

    /// Render the instruction, substituting each operand hole with the
    /// name `regs` gives for the corresponding temp.
    pub fn format(&self, regs: &dyn Fn(Temp) -> String) -> String {
        let (asm, dst, src): (&str, &[Temp], &[Temp]) = match self {
            Inst::Oper { asm, dst, src, .. } => (asm, dst, src),
            Inst::Move { asm, dst, src } => {
                (asm, std::slice::from_ref(dst), std::slice::from_ref(src))
            }
            Inst::Label { asm, .. } => return asm.clone(),
        };
        let mut out = String::with_capacity(asm.len());
        let mut chars = asm.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '{' {
                out.push(c);
                continue;
            }
            let kind = chars.next().expect("truncated operand hole");
            let mut index = 0usize;
            for d in chars.by_ref() {
                if d == '}' {
                    break;
                }
                index = index * 10
                    + d.to_digit(10).unwrap_or_else(|| {
                        panic!("bad operand hole in template {:?}", asm)
                    }) as usize;
            }
            let temp = match kind {
                'd' => dst[index],
                's' => src[index],
                _ => panic!("bad operand kind {:?} in template {:?}", kind, asm),
            };
            out.push_str(&regs(temp));
        }
        out
    }
}
