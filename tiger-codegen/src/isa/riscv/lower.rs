//! Instruction selection for RV64.
//!
//! Maximal munch over the canonical tree: at each node the largest
//! matching tile is consumed and one instruction is emitted. The
//! interesting tiles fold constants into the 12-bit immediate forms
//! (`addi`, loads and stores with displacements, shift immediates);
//! everything else falls through to the three-register form with operands
//! munched into fresh temps.

use crate::inst::{DstVec, Inst, JumpVec, SrcVec};
use crate::ir::{BinOp, Expr, RelOp, Stmt};
use crate::result::CodegenResult;
use crate::temp::{Temp, TempCtx};
use smallvec::{smallvec, SmallVec};

use super::Riscv64;

pub(super) fn codegen(isa: &Riscv64, tmp: &mut TempCtx, stmts: &[Stmt]) -> CodegenResult<Vec<Inst>> {
    let mut muncher = Muncher {
        isa,
        tmp,
        insts: Vec::new(),
    };
    for stmt in stmts {
        muncher.munch_stmt(stmt);
    }
    Ok(muncher.insts)
}

fn imm12(c: i64) -> bool {
    (-2048..=2047).contains(&c)
}

fn mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "sll",
        BinOp::UShr => "srl",
        BinOp::SShr => "sra",
    }
}

fn branch_mnemonic(op: RelOp) -> &'static str {
    match op {
        RelOp::Eq => "beq",
        RelOp::Ne => "bne",
        RelOp::Lt => "blt",
        RelOp::Ge => "bge",
        RelOp::Le => "ble",
        RelOp::Gt => "bgt",
        RelOp::Ult => "bltu",
        RelOp::Uge => "bgeu",
        RelOp::Ule => "bleu",
        RelOp::Ugt => "bgtu",
    }
}

struct Muncher<'a> {
    isa: &'a Riscv64,
    tmp: &'a mut TempCtx,
    insts: Vec<Inst>,
}

impl<'a> Muncher<'a> {
    fn emit(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    fn oper(&mut self, asm: String, dst: DstVec, src: SrcVec) {
        self.emit(Inst::Oper {
            asm,
            dst,
            src,
            jumps: JumpVec::new(),
        });
    }

    fn mv(&mut self, dst: Temp, src: Temp) {
        self.emit(Inst::Move {
            asm: "mv {d0}, {s0}".to_string(),
            dst,
            src,
        });
    }

    fn result(&mut self, f: impl FnOnce(&mut Self, Temp)) -> Temp {
        let t = self.tmp.make_temp();
        f(self, t);
        t
    }

    fn munch_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Label(l) => {
                let asm = format!("{}:", self.tmp.label_name(*l));
                self.emit(Inst::Label { asm, label: *l });
            }
            Stmt::Move(dst, src) => self.munch_move(dst, src),
            Stmt::Exp(e) => match &**e {
                Expr::Call(callee, args) => self.munch_call(None, callee, args),
                Expr::Const(_) => {}
                other => {
                    self.munch_expr(other);
                }
            },
            Stmt::Jump(e, targets) => match &**e {
                Expr::Name(l) => {
                    let asm = format!("j {}", self.tmp.label_name(*l));
                    self.emit(Inst::Oper {
                        asm,
                        dst: DstVec::new(),
                        src: SrcVec::new(),
                        jumps: smallvec![*l],
                    });
                }
                other => {
                    let t = self.munch_expr(other);
                    self.emit(Inst::Oper {
                        asm: "jr {s0}".to_string(),
                        dst: DstVec::new(),
                        src: smallvec![t],
                        jumps: JumpVec::from_slice(targets),
                    });
                }
            },
            Stmt::CJump(op, a, b, t_lab, f_lab) => {
                // Canonicalization put the false label right after this
                // statement, so a single conditional branch suffices.
                let ta = self.munch_expr(a);
                let tb = self.munch_expr(b);
                let asm = format!(
                    "{} {{s0}}, {{s1}}, {}",
                    branch_mnemonic(*op),
                    self.tmp.label_name(*t_lab)
                );
                self.emit(Inst::Oper {
                    asm,
                    dst: DstVec::new(),
                    src: smallvec![ta, tb],
                    jumps: smallvec![*t_lab, *f_lab],
                });
            }
            Stmt::Seq(..) => unreachable!("SEQ reached instruction selection: {}", stmt),
        }
    }

    fn munch_move(&mut self, dst: &Expr, src: &Expr) {
        match dst {
            Expr::Temp(d) => match src {
                Expr::Call(callee, args) => self.munch_call(Some(*d), callee, args),
                Expr::Temp(s) => self.mv(*d, *s),
                other => self.munch_expr_into(*d, other),
            },
            Expr::Mem(addr) => {
                let value = self.munch_expr(src);
                let (base, offset) = self.munch_addr(addr);
                self.oper(
                    format!("sd {{s0}}, {}({{s1}})", offset),
                    DstVec::new(),
                    smallvec![value, base],
                );
            }
            other => unreachable!("malformed MOVE destination: {}", other),
        }
    }

    /// Split an address into a base temp and a displacement that fits the
    /// load/store immediate field.
    fn munch_addr(&mut self, addr: &Expr) -> (Temp, i64) {
        if let Expr::BinOp(BinOp::Add, a, b) = addr {
            match (&**a, &**b) {
                (e, Expr::Const(c)) if imm12(*c) => return (self.munch_expr(e), *c),
                (Expr::Const(c), e) if imm12(*c) => return (self.munch_expr(e), *c),
                _ => {}
            }
        }
        (self.munch_expr(addr), 0)
    }

    fn munch_expr(&mut self, e: &Expr) -> Temp {
        if let Expr::Temp(t) = e {
            return *t;
        }
        self.result(|m, d| m.munch_expr_into(d, e))
    }

    fn munch_expr_into(&mut self, d: Temp, e: &Expr) {
        match e {
            Expr::Const(c) => self.oper(format!("li {{d0}}, {}", c), smallvec![d], SrcVec::new()),
            Expr::Name(l) => {
                let asm = format!("la {{d0}}, {}", self.tmp.label_name(*l));
                self.oper(asm, smallvec![d], SrcVec::new());
            }
            Expr::Temp(s) => self.mv(d, *s),
            Expr::Mem(addr) => {
                let (base, offset) = self.munch_addr(addr);
                self.oper(
                    format!("ld {{d0}}, {}({{s0}})", offset),
                    smallvec![d],
                    smallvec![base],
                );
            }
            Expr::BinOp(op, a, b) => self.munch_binop(d, *op, a, b),
            Expr::Call(..) => {
                unreachable!("CALL in operand position after canonicalization: {}", e)
            }
            Expr::ESeq(..) => unreachable!("ESEQ survived linearization: {}", e),
        }
    }

    fn munch_binop(&mut self, d: Temp, op: BinOp, a: &Expr, b: &Expr) {
        use BinOp::*;

        if let Expr::Const(c) = b {
            let tile = match op {
                Add if imm12(*c) => Some(("addi", *c)),
                Sub if *c != i64::MIN && imm12(-*c) => Some(("addi", -*c)),
                And if imm12(*c) => Some(("andi", *c)),
                Or if imm12(*c) => Some(("ori", *c)),
                Xor if imm12(*c) => Some(("xori", *c)),
                Shl if (0..64).contains(c) => Some(("slli", *c)),
                UShr if (0..64).contains(c) => Some(("srli", *c)),
                SShr if (0..64).contains(c) => Some(("srai", *c)),
                _ => None,
            };
            if let Some((mnem, imm)) = tile {
                let ta = self.munch_expr(a);
                self.oper(
                    format!("{} {{d0}}, {{s0}}, {}", mnem, imm),
                    smallvec![d],
                    smallvec![ta],
                );
                return;
            }
        }

        // The commutative immediate tiles, constant on the left.
        if let Expr::Const(c) = a {
            let mnem = match op {
                Add if imm12(*c) => Some("addi"),
                And if imm12(*c) => Some("andi"),
                Or if imm12(*c) => Some("ori"),
                Xor if imm12(*c) => Some("xori"),
                _ => None,
            };
            if let Some(mnem) = mnem {
                let tb = self.munch_expr(b);
                self.oper(
                    format!("{} {{d0}}, {{s0}}, {}", mnem, c),
                    smallvec![d],
                    smallvec![tb],
                );
                return;
            }
        }

        let ta = self.munch_expr(a);
        let tb = self.munch_expr(b);
        self.oper(
            format!("{} {{d0}}, {{s0}}, {{s1}}", mnemonic(op)),
            smallvec![d],
            smallvec![ta, tb],
        );
    }

    fn munch_call(&mut self, dst: Option<Temp>, callee: &Expr, args: &[Expr]) {
        let f = match callee {
            Expr::Name(l) => *l,
            other => unreachable!("call through computed address: {}", other),
        };
        assert!(
            args.len() <= self.isa.arg_regs.len(),
            "call to {} passes {} arguments",
            self.tmp.label_name(f),
            args.len()
        );
        let mut used = SrcVec::new();
        for (i, arg) in args.iter().enumerate() {
            let t = self.munch_expr(arg);
            let a = self.isa.arg_regs[i];
            self.mv(a, t);
            used.push(a);
        }
        let asm = format!("call {}", self.tmp.label_name(f));
        self.emit(Inst::Oper {
            asm,
            dst: SmallVec::from_slice(&self.isa.caller_saved),
            src: used,
            jumps: JumpVec::new(),
        });
        if let Some(d) = dst {
            let rv = self.isa.arg_regs[0];
            self.mv(d, rv);
        }
    }
}
