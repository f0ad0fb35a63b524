//! RISC-V calling convention: procedure entry/exit, spill slots, and data
//! directives.
//!
//! The stack frame follows the RV64 ABI picture. The stack grows down and
//! stays 16-byte aligned; `fp` points at the top of the frame (the
//! caller's `sp`), the caller's frame pointer is saved at the bottom, and
//! frame slots for escaping variables and spills sit at negative offsets
//! from `fp`:
//!
//! ```text
//!   | caller's frame      |
//!   +---------------------+ <- fp (old sp)
//!   | frame slots         |    fp-8, fp-16, ...
//!   | ...                 |
//!   | saved caller fp     | <- sp
//!   +---------------------+
//! ```
//!
//! The return address and the `s` registers are not stored by the
//! prologue: stage 1 moves them into fresh temps, so the register
//! allocator either keeps them in place (the moves coalesce away) or
//! spills exactly the ones the body clobbers.

use crate::frame::Frame;
use crate::inst::{DstVec, Inst, JumpVec, SrcVec};
use crate::ir::{seq, Expr, Stmt};
use crate::isa::TargetIsa;
use crate::temp::{Label, Temp, TempCtx};
use smallvec::smallvec;

use super::registers::fp;
use super::Riscv64;

fn frame_size(frame: &Frame) -> i32 {
    // One extra slot for the saved frame pointer, rounded to the ABI's
    // 16-byte stack alignment.
    (frame.locals_size() + 8 + 15) & !15
}

pub(super) fn proc_entry_exit1(
    isa: &Riscv64,
    frame: &Frame,
    tmp: &mut TempCtx,
    body: Stmt,
) -> Stmt {
    let mut stmts = Vec::new();

    // Preserve ra and the s registers in fresh temps. The allocator
    // coalesces the pairs that survive in place and spills the rest.
    let saved: Vec<(Temp, Temp)> = isa
        .callee_saved
        .iter()
        .map(|&reg| (tmp.make_temp(), reg))
        .collect();
    for &(temp, reg) in &saved {
        stmts.push(Stmt::Move(
            Box::new(Expr::Temp(temp)),
            Box::new(Expr::Temp(reg)),
        ));
    }

    // Shift the incoming arguments into their accesses.
    for (i, access) in frame.formals().iter().enumerate() {
        stmts.push(Stmt::Move(
            Box::new(access.expr(Expr::Temp(fp()))),
            Box::new(Expr::Temp(isa.arg_regs[i])),
        ));
    }

    stmts.push(body);

    for &(temp, reg) in saved.iter().rev() {
        stmts.push(Stmt::Move(
            Box::new(Expr::Temp(reg)),
            Box::new(Expr::Temp(temp)),
        ));
    }

    seq(stmts)
}

pub(super) fn proc_entry_exit2(isa: &Riscv64, insts: &mut Vec<Inst>) {
    // A zero-length instruction whose sources are everything the epilogue
    // and the caller expect to find intact. It keeps those registers live
    // to the end of the body.
    let mut src = SrcVec::new();
    src.push(isa.return_value());
    src.push(isa.stack_pointer());
    src.push(isa.frame_pointer());
    src.extend(isa.callee_saved.iter().copied());
    insts.push(Inst::Oper {
        asm: String::new(),
        dst: DstVec::new(),
        src,
        jumps: JumpVec::new(),
    });
}

pub(super) fn proc_entry_exit3(frame: &Frame, tmp: &TempCtx, body: Vec<String>) -> Vec<String> {
    let name = tmp.label_name(frame.name());
    let fs = frame_size(frame);
    let mut out = vec![
        ".text".to_string(),
        format!(".globl {}", name),
        format!("{}:", name),
        format!("    addi sp, sp, -{}", fs),
        "    sd fp, 0(sp)".to_string(),
        format!("    addi fp, sp, {}", fs),
    ];
    out.extend(body);
    out.push("    ld fp, 0(sp)".to_string());
    out.push(format!("    addi sp, sp, {}", fs));
    out.push("    ret".to_string());
    out.push(String::new());
    out
}

pub(super) fn spill_load(offset: i32, dst: Temp) -> Inst {
    Inst::Oper {
        asm: format!("ld {{d0}}, {}({{s0}})", offset),
        dst: smallvec![dst],
        src: smallvec![fp()],
        jumps: JumpVec::new(),
    }
}

pub(super) fn spill_store(offset: i32, src: Temp) -> Inst {
    Inst::Oper {
        asm: format!("sd {{s0}}, {}({{s1}})", offset),
        dst: DstVec::new(),
        src: smallvec![src, fp()],
        jumps: JumpVec::new(),
    }
}

pub(super) fn codegen_data(tmp: &TempCtx, label: Label, literal: &str) -> Vec<String> {
    vec![
        ".data".to_string(),
        ".balign 8".to_string(),
        format!("{}:", tmp.label_name(label)),
        format!("    .quad {}", literal.len()),
        format!("    .ascii \"{}\"", escape(literal)),
    ]
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Access;
    use crate::isa::TargetIsa;
    use tiger_entity::EntityRef;

    fn isa() -> Riscv64 {
        Riscv64::new("riscv64".parse().unwrap())
    }

    #[test]
    fn frame_size_is_aligned() {
        let isa = isa();
        let mut tmp = TempCtx::new(isa.register_info().len());
        let name = tmp.named_label("f");
        let frame = Frame::new(&isa, &mut tmp, name, &[true]).unwrap();
        assert_eq!(frame_size(&frame.borrow()), 16);
        frame.borrow_mut().alloc_local(&mut tmp, true);
        assert_eq!(frame_size(&frame.borrow()), 32);
    }

    #[test]
    fn entry_exit1_shifts_args_and_saves() {
        let isa = isa();
        let mut tmp = TempCtx::new(isa.register_info().len());
        let name = tmp.named_label("f");
        let frame = Frame::new(&isa, &mut tmp, name, &[true, false]).unwrap();
        let body = Stmt::Exp(Box::new(Expr::Const(0)));
        let wrapped = proc_entry_exit1(&isa, &frame.borrow(), &mut tmp, body);

        // Flatten and count the top-level moves: 12 saves, 2 argument
        // shifts, the body, 12 restores.
        let mut stmts = Vec::new();
        fn flatten(s: Stmt, out: &mut Vec<Stmt>) {
            if let Stmt::Seq(a, b) = s {
                flatten(*a, out);
                flatten(*b, out);
            } else {
                out.push(s);
            }
        }
        flatten(wrapped, &mut stmts);
        assert_eq!(stmts.len(), 12 + 2 + 1 + 12);

        // The static link (escaping formal #0) is stored through fp.
        match &stmts[12] {
            Stmt::Move(dst, src) => {
                assert!(matches!(&**dst, Expr::Mem(_)));
                assert_eq!(**src, Expr::Temp(areg_0()));
            }
            other => panic!("expected static-link shift, got {}", other),
        }

        let reg_access = frame.borrow().formals()[1];
        match (&stmts[13], reg_access) {
            (Stmt::Move(dst, _), Access::Reg(t)) => assert_eq!(**dst, Expr::Temp(t)),
            (other, _) => panic!("expected formal shift, got {}", other),
        }
    }

    fn areg_0() -> Temp {
        Temp::new(10)
    }

    #[test]
    fn data_directives_carry_length_and_bytes() {
        let mut tmp = TempCtx::new(0);
        let label = tmp.make_label();
        let lines = codegen_data(&tmp, label, "hello");
        assert_eq!(lines[3], "    .quad 5");
        assert_eq!(lines[4], "    .ascii \"hello\"");
    }

    #[test]
    fn data_escapes_specials() {
        let mut tmp = TempCtx::new(0);
        let label = tmp.make_label();
        let lines = codegen_data(&tmp, label, "a\"b\\c\nd\u{1}");
        assert_eq!(lines[4], "    .ascii \"a\\\"b\\\\c\\nd\\001\"");
    }
}
