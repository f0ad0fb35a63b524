//! `ESEQ` and `CALL` elimination.
//!
//! A term-rewriting pass over the algebraic identities
//!
//! ```text
//! ESEQ(s, ESEQ(s', e))      = ESEQ(SEQ(s, s'), e)
//! BINOP(op, ESEQ(s, a), b)  = ESEQ(s, BINOP(op, a, b))        when s and b commute
//! BINOP(op, ESEQ(s, a), b)  = ESEQ(SEQ(MOVE(t, a)?, ...), …)  otherwise, via a fresh temp
//! ```
//!
//! Commutation is judged conservatively: a constant or a name commutes
//! with any statement, everything else is assumed to conflict. A call in
//! any operand position is hoisted into `MOVE(TEMP t, CALL …)` so that two
//! calls never race for the same return-value register.

use crate::ir::{Expr, Stmt};
use crate::temp::TempCtx;

/// Rewrite `stmt` into an equivalent flat list with no `SEQ`, no `ESEQ`,
/// and every call in `MOVE`/`EXP` position.
///
/// Running the pass over its own output changes nothing.
pub fn linearize(stmt: Stmt, tmp: &mut TempCtx) -> Vec<Stmt> {
    let mut out = Vec::new();
    flatten(do_stmt(stmt, tmp), &mut out);
    out
}

fn flatten(stmt: Stmt, out: &mut Vec<Stmt>) {
    if let Stmt::Seq(a, b) = stmt {
        flatten(*a, out);
        flatten(*b, out);
    } else {
        out.push(stmt);
    }
}

fn nop() -> Stmt {
    Stmt::Exp(Box::new(Expr::Const(0)))
}

fn is_nop(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Exp(e) if matches!(**e, Expr::Const(_)))
}

fn join(a: Stmt, b: Stmt) -> Stmt {
    if is_nop(&a) {
        b
    } else if is_nop(&b) {
        a
    } else {
        Stmt::Seq(Box::new(a), Box::new(b))
    }
}

fn commutes(stmt: &Stmt, e: &Expr) -> bool {
    is_nop(stmt) || matches!(e, Expr::Name(_) | Expr::Const(_))
}

fn do_stmt(stmt: Stmt, tmp: &mut TempCtx) -> Stmt {
    match stmt {
        Stmt::Seq(a, b) => join(do_stmt(*a, tmp), do_stmt(*b, tmp)),
        Stmt::Jump(e, labels) => {
            let (s, e) = do_expr(*e, tmp);
            join(s, Stmt::Jump(Box::new(e), labels))
        }
        Stmt::CJump(op, a, b, t, f) => {
            let (s, mut es) = reorder(vec![*a, *b], tmp);
            let b = es.pop().unwrap();
            let a = es.pop().unwrap();
            join(s, Stmt::CJump(op, Box::new(a), Box::new(b), t, f))
        }
        Stmt::Move(dst, src) => match (*dst, *src) {
            (Expr::Temp(t), Expr::Call(callee, args)) => {
                let (s, mut es) = reorder_call(*callee, args, tmp);
                let callee = es.remove(0);
                join(
                    s,
                    Stmt::Move(
                        Box::new(Expr::Temp(t)),
                        Box::new(Expr::Call(Box::new(callee), es)),
                    ),
                )
            }
            (Expr::Temp(t), src) => {
                let (s, e) = do_expr(src, tmp);
                join(s, Stmt::Move(Box::new(Expr::Temp(t)), Box::new(e)))
            }
            (Expr::Mem(addr), src) => {
                let (s, mut es) = reorder(vec![*addr, src], tmp);
                let src = es.pop().unwrap();
                let addr = es.pop().unwrap();
                join(
                    s,
                    Stmt::Move(
                        Box::new(Expr::Mem(Box::new(addr))),
                        Box::new(src),
                    ),
                )
            }
            (Expr::ESeq(s, dst), src) => do_stmt(
                Stmt::Seq(s, Box::new(Stmt::Move(dst, Box::new(src)))),
                tmp,
            ),
            (dst, _) => unreachable!("malformed MOVE destination: {}", dst),
        },
        Stmt::Exp(e) => match *e {
            Expr::Call(callee, args) => {
                let (s, mut es) = reorder_call(*callee, args, tmp);
                let callee = es.remove(0);
                join(s, Stmt::Exp(Box::new(Expr::Call(Box::new(callee), es))))
            }
            e => {
                let (s, e) = do_expr(e, tmp);
                join(s, Stmt::Exp(Box::new(e)))
            }
        },
        stmt @ Stmt::Label(_) => stmt,
    }
}

fn do_expr(e: Expr, tmp: &mut TempCtx) -> (Stmt, Expr) {
    match e {
        Expr::BinOp(op, a, b) => {
            let (s, mut es) = reorder(vec![*a, *b], tmp);
            let b = es.pop().unwrap();
            let a = es.pop().unwrap();
            (s, Expr::BinOp(op, Box::new(a), Box::new(b)))
        }
        Expr::Mem(a) => {
            let (s, mut es) = reorder(vec![*a], tmp);
            (s, Expr::Mem(Box::new(es.pop().unwrap())))
        }
        Expr::ESeq(s, e) => {
            let s1 = do_stmt(*s, tmp);
            let (s2, e) = do_expr(*e, tmp);
            (join(s1, s2), e)
        }
        Expr::Call(callee, args) => {
            // A call reaching here sits in an operand position: hoist it
            // into a fresh temp so it can't clobber another call's result.
            let (s, mut es) = reorder_call(*callee, args, tmp);
            let callee = es.remove(0);
            let t = tmp.make_temp();
            let moved = Stmt::Move(
                Box::new(Expr::Temp(t)),
                Box::new(Expr::Call(Box::new(callee), es)),
            );
            (join(s, moved), Expr::Temp(t))
        }
        e @ (Expr::Const(_) | Expr::Name(_) | Expr::Temp(_)) => (nop(), e),
    }
}

/// Reorder a callee and its arguments as one operand list.
fn reorder_call(callee: Expr, args: Vec<Expr>, tmp: &mut TempCtx) -> (Stmt, Vec<Expr>) {
    let mut exprs = Vec::with_capacity(args.len() + 1);
    exprs.push(callee);
    exprs.extend(args);
    reorder(exprs, tmp)
}

/// Pull the side effects of an operand list out in front, preserving
/// evaluation order. When an operand's statement cannot be moved past an
/// earlier operand's value, the value is parked in a fresh temp.
fn reorder(exprs: Vec<Expr>, tmp: &mut TempCtx) -> (Stmt, Vec<Expr>) {
    let results: Vec<(Stmt, Expr)> = exprs.into_iter().map(|e| do_expr(e, tmp)).collect();
    let mut acc = nop();
    let mut out = std::collections::VecDeque::with_capacity(results.len());
    for (s, e) in results.into_iter().rev() {
        // `acc` is the combined statement of the operands to the right of
        // this one; it runs after `e` is evaluated.
        if commutes(&acc, &e) {
            acc = join(s, acc);
            out.push_front(e);
        } else {
            let t = tmp.make_temp();
            let park = Stmt::Move(Box::new(Expr::Temp(t)), Box::new(e));
            acc = join(s, join(park, acc));
            out.push_front(Expr::Temp(t));
        }
    }
    (acc, out.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::verify_canonical;
    use crate::ir::BinOp;

    fn ctx() -> TempCtx {
        TempCtx::new(0)
    }

    fn eseq(s: Stmt, e: Expr) -> Expr {
        Expr::ESeq(Box::new(s), Box::new(e))
    }

    fn move_temp(tmp: &mut TempCtx, e: Expr) -> Stmt {
        let t = tmp.make_temp();
        Stmt::Move(Box::new(Expr::Temp(t)), Box::new(e))
    }

    #[test]
    fn eseq_is_eliminated() {
        let mut tmp = ctx();
        let t = tmp.make_temp();
        let inner = move_temp(&mut tmp, Expr::Const(1));
        let e = Expr::BinOp(
            BinOp::Add,
            Box::new(eseq(inner, Expr::Temp(t))),
            Box::new(Expr::Const(2)),
        );
        let stmts = linearize(move_temp(&mut tmp, e), &mut tmp);
        verify_canonical(&stmts);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn nested_call_is_hoisted() {
        let mut tmp = ctx();
        let f = tmp.named_label("f");
        let call = Expr::Call(Box::new(Expr::Name(f)), vec![]);
        let e = Expr::BinOp(BinOp::Add, Box::new(call), Box::new(Expr::Const(1)));
        let stmts = linearize(move_temp(&mut tmp, e), &mut tmp);
        verify_canonical(&stmts);
        // The call is now a top-level MOVE of its own.
        assert!(stmts.iter().any(|s| matches!(
            s,
            Stmt::Move(dst, src)
                if matches!(&**dst, Expr::Temp(_)) && matches!(&**src, Expr::Call(..))
        )));
    }

    #[test]
    fn call_result_position_is_hoisted() {
        // ESEQ(s, CALL …) as an operand: the call must still end up in a
        // sanctioned position.
        let mut tmp = ctx();
        let f = tmp.named_label("f");
        let g = tmp.named_label("g");
        let call_f = Expr::Call(Box::new(Expr::Name(f)), vec![]);
        let call_g = Expr::Call(Box::new(Expr::Name(g)), vec![]);
        let wrapped = eseq(Stmt::Exp(Box::new(call_f)), call_g);
        let e = Expr::BinOp(BinOp::Add, Box::new(wrapped), Box::new(Expr::Const(3)));
        let stmts = linearize(move_temp(&mut tmp, e), &mut tmp);
        verify_canonical(&stmts);
    }

    #[test]
    fn non_commuting_operand_is_parked() {
        // MEM(t0) + ESEQ(MOVE(MEM(t0), 1), 2): the load must happen before
        // the store, so the left operand lands in a temp.
        let mut tmp = ctx();
        let t0 = tmp.make_temp();
        let load = Expr::Mem(Box::new(Expr::Temp(t0)));
        let store = Stmt::Move(
            Box::new(Expr::Mem(Box::new(Expr::Temp(t0)))),
            Box::new(Expr::Const(1)),
        );
        let e = Expr::BinOp(
            BinOp::Add,
            Box::new(load),
            Box::new(eseq(store, Expr::Const(2))),
        );
        let stmts = linearize(move_temp(&mut tmp, e), &mut tmp);
        verify_canonical(&stmts);
        // First the parked load, then the store, then the add.
        assert_eq!(stmts.len(), 3);
        assert!(
            matches!(&stmts[0], Stmt::Move(_, src) if matches!(&**src, Expr::Mem(_))),
            "expected the load to be parked first, got {}",
            stmts[0]
        );
    }

    #[test]
    fn constants_commute_without_parking() {
        let mut tmp = ctx();
        let t0 = tmp.make_temp();
        let store = Stmt::Move(
            Box::new(Expr::Mem(Box::new(Expr::Temp(t0)))),
            Box::new(Expr::Const(1)),
        );
        let e = Expr::BinOp(
            BinOp::Add,
            Box::new(Expr::Const(5)),
            Box::new(eseq(store, Expr::Const(2))),
        );
        let stmts = linearize(move_temp(&mut tmp, e), &mut tmp);
        verify_canonical(&stmts);
        // The constant left operand commutes with the store: no park.
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn linearize_is_idempotent() {
        let mut tmp = ctx();
        let t = tmp.make_temp();
        let f = tmp.named_label("f");
        let call = Expr::Call(Box::new(Expr::Name(f)), vec![Expr::Const(1)]);
        let inner = move_temp(&mut tmp, Expr::Const(1));
        let e = Expr::BinOp(
            BinOp::Mul,
            Box::new(eseq(inner, Expr::Temp(t))),
            Box::new(call),
        );
        let once = linearize(move_temp(&mut tmp, e), &mut tmp);
        let twice = linearize(crate::ir::seq(once.clone()), &mut tmp);
        assert_eq!(once, twice);
    }
}
