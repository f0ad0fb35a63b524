//! End-to-end pipeline tests.
//!
//! Each test plays the role of the semantic analyzer for one small Tiger
//! program, drives the translation constructors, and runs the result
//! through the full backend, checking the pipeline's observable
//! guarantees along the way.

use tiger_codegen::canon;
use tiger_codegen::frame::Fragment;
use tiger_codegen::ir::{BinOp, RelOp, Stmt};
use tiger_codegen::isa::{self, TargetIsa};
use tiger_codegen::translate::Translator;
use tiger_codegen::Context;

fn rv64() -> Box<dyn TargetIsa> {
    let _ = env_logger::builder().is_test(true).try_init();
    isa::lookup("riscv64".parse().unwrap()).unwrap()
}

/// Run a fragment's body through canonicalization, asserting the
/// invariants of each stage, and hand back the scheduled statements.
fn canonicalize(
    body: Stmt,
    tmp: &mut tiger_codegen::temp::TempCtx,
) -> Vec<Stmt> {
    let stmts = canon::linearize(body, tmp);
    canon::verify_canonical(&stmts);
    let relinearized = canon::linearize(tiger_codegen::ir::seq(stmts.clone()), tmp);
    assert_eq!(stmts, relinearized, "linearize must be idempotent");
    let (blocks, done) = canon::basic_blocks(stmts, tmp);
    canon::verify_blocks(&blocks);
    let trace = canon::trace_schedule(blocks, done, tmp);
    canon::verify_canonical(&trace);
    canon::verify_trace(&trace);
    trace
}

#[test]
fn empty_program() {
    // let in () end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();
    let body = tr.unit();
    tr.proc_entry_exit(&main, body);
    let (frags, mut tmp) = tr.finish();

    assert_eq!(frags.len(), 1, "exactly one PROC fragment for main");
    let module = Context::new().compile(&*isa, frags, &mut tmp).unwrap();
    assert!(module.data.is_empty());
    assert!(module.text.iter().any(|l| l == "main:"));
    assert!(module.text.iter().any(|l| l.trim() == "ret"));
    // Nothing but prologue, epilogue, labels, and the trace's jump to the
    // done label should remain.
    for line in module
        .text
        .iter()
        .filter(|l| !l.is_empty() && !l.ends_with(':') && !l.starts_with('.'))
    {
        let op = line.trim().split_whitespace().next().unwrap();
        assert!(
            matches!(op, "addi" | "sd" | "ld" | "ret" | "j"),
            "unexpected instruction in empty program: {}",
            line
        );
    }
}

#[test]
fn arithmetic() {
    // let var x := 1 + 2 * 3 in x end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();
    let x = tr.alloc_local(&main, false);

    let two_times_three = {
        let two = tr.int_lit(2);
        let three = tr.int_lit(3);
        tr.binop(BinOp::Mul, two, three)
    };
    let one = tr.int_lit(1);
    let sum = tr.binop(BinOp::Add, one, two_times_three);
    let init = {
        let dst = tr.simple_var(&x, &main);
        tr.assign(dst, sum)
    };
    let result = tr.simple_var(&x, &main);
    let body = tr.seq_exp(vec![init, result], true);
    tr.proc_entry_exit(&main, body);

    let (mut frags, mut tmp) = tr.finish();
    match frags.pop().unwrap() {
        Fragment::Proc { body, frame } => {
            canonicalize(body.clone(), &mut tmp);
            let module = Context::new()
                .compile(
                    &*isa,
                    vec![Fragment::Proc { body, frame }],
                    &mut tmp,
                )
                .unwrap();
            assert!(module.text.iter().any(|l| l.contains("mul")));
            // The constant 1 folds into an immediate add.
            assert!(module.text.iter().any(|l| l.contains("addi")));
        }
        Fragment::Str(..) => panic!("no string fragments expected"),
    }
}

#[test]
fn nested_function_uses_static_link() {
    // let var a := 5 function f() : int = a in f() end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();
    let a = tr.alloc_local(&main, true);

    let f_name = tr.named_label("f");
    let f_level = tr.new_level(&main, f_name, &[]).unwrap();
    let f_body = tr.simple_var(&a, &f_level);
    tr.proc_entry_exit(&f_level, f_body);

    let five = tr.int_lit(5);
    let init = {
        let dst = tr.simple_var(&a, &main);
        tr.assign(dst, five)
    };
    let call = tr.call(f_name, &f_level, &main, vec![], true);
    let body = tr.seq_exp(vec![init, call], true);
    tr.proc_entry_exit(&main, body);

    let (frags, mut tmp) = tr.finish();
    assert_eq!(frags.len(), 2);
    let module = Context::new().compile(&*isa, frags, &mut tmp).unwrap();
    assert!(module.text.iter().any(|l| l == "f:"));
    assert!(module.text.iter().any(|l| l == "main:"));
    assert!(module.text.iter().any(|l| l.trim() == "call f"));
    // f dereferences the static link it received as formal #0: the link
    // lands in its frame at fp-8 and a's slot in main's frame is also at
    // fp-8, so the access is two loads through -8 displacements.
    assert!(
        module
            .text
            .iter()
            .filter(|l| l.contains("ld ") && l.contains("-8("))
            .count()
            >= 2
    );
}

#[test]
fn if_else_value() {
    // let var x := if 1 < 2 then 10 else 20 in x end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();
    let x = tr.alloc_local(&main, false);

    let cond = {
        let one = tr.int_lit(1);
        let two = tr.int_lit(2);
        tr.relop(RelOp::Lt, one, two)
    };
    let ten = tr.int_lit(10);
    let twenty = tr.int_lit(20);
    let chosen = tr.if_exp(cond, ten, Some(twenty));
    let init = {
        let dst = tr.simple_var(&x, &main);
        tr.assign(dst, chosen)
    };
    let result = tr.simple_var(&x, &main);
    let body = tr.seq_exp(vec![init, result], true);
    tr.proc_entry_exit(&main, body);

    let (mut frags, mut tmp) = tr.finish();
    let (body, frame) = match frags.pop().unwrap() {
        Fragment::Proc { body, frame } => (body, frame),
        Fragment::Str(..) => panic!("no string fragments expected"),
    };

    // The comparison lowers to a CJUMP, and after scheduling its false
    // label follows it directly (checked inside canonicalize).
    let trace = canonicalize(body.clone(), &mut tmp);
    assert!(trace
        .iter()
        .any(|s| matches!(s, Stmt::CJump(RelOp::Lt, ..))));

    let module = Context::new()
        .compile(&*isa, vec![Fragment::Proc { body, frame }], &mut tmp)
        .unwrap();
    assert!(module.text.iter().any(|l| l.contains("blt")));
}

#[test]
fn string_literal_data() {
    // let var s := "hello" in s end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();
    let s = tr.alloc_local(&main, false);
    let lit = tr.string_lit("hello");
    let init = {
        let dst = tr.simple_var(&s, &main);
        tr.assign(dst, lit)
    };
    let result = tr.simple_var(&s, &main);
    let body = tr.seq_exp(vec![init, result], true);
    tr.proc_entry_exit(&main, body);

    let (frags, mut tmp) = tr.finish();
    assert_eq!(frags.len(), 2, "one PROC and one STRING fragment");

    let module = Context::new().compile(&*isa, frags, &mut tmp).unwrap();
    assert!(module.data.iter().any(|l| l == "    .quad 5"));
    assert!(module.data.iter().any(|l| l == "    .ascii \"hello\""));
    // The body references the literal's label.
    let la_line = module
        .text
        .iter()
        .find(|l| l.trim().starts_with("la "))
        .expect("the body should take the literal's address");
    let label = la_line.trim().rsplit(' ').next().unwrap();
    assert!(
        module.data.iter().any(|l| l == &format!("{}:", label)),
        "label {} is not defined in the data section",
        label
    );
}

#[test]
fn register_pressure_spills_and_terminates() {
    // A straight-line program with K+3 simultaneously live locals.
    let isa = rv64();
    let k = isa.allocatable().len();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();

    let vars: Vec<_> = (0..k + 3).map(|_| tr.alloc_local(&main, false)).collect();
    let mut stmts = Vec::new();
    for (i, v) in vars.iter().enumerate() {
        let value = tr.int_lit(i as i64 + 1);
        let dst = tr.simple_var(v, &main);
        stmts.push(tr.assign(dst, value));
    }
    // Sum them all, using every variable after every definition.
    let mut sum = tr.simple_var(&vars[0], &main);
    for v in &vars[1..] {
        let next = tr.simple_var(v, &main);
        sum = tr.binop(BinOp::Add, sum, next);
    }
    stmts.push(sum);
    let body = tr.seq_exp(stmts, true);
    tr.proc_entry_exit(&main, body);

    let (frags, mut tmp) = tr.finish();
    let module = Context::new().compile(&*isa, frags, &mut tmp).unwrap();

    // Spill code made it into the text: stores to and loads from frame
    // slots. (The prologue/epilogue contribute one sd/ld pair for fp;
    // spills add more.)
    let stores = module
        .text
        .iter()
        .filter(|l| l.trim().starts_with("sd "))
        .count();
    let loads = module
        .text
        .iter()
        .filter(|l| l.trim().starts_with("ld "))
        .count();
    assert!(stores >= 4, "expected spill stores, saw {}", stores);
    assert!(loads >= 4, "expected spill reloads, saw {}", loads);
}

#[test]
fn while_loop_with_break() {
    // let var i := 0 in while 1 do (i := i + 1; if i = 10 then break) end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();
    let i = tr.alloc_local(&main, false);

    let done = tr.new_label();
    let incr = {
        let lhs = tr.simple_var(&i, &main);
        let one = tr.int_lit(1);
        let sum = tr.binop(BinOp::Add, lhs, one);
        let dst = tr.simple_var(&i, &main);
        tr.assign(dst, sum)
    };
    let escape = {
        let lhs = tr.simple_var(&i, &main);
        let ten = tr.int_lit(10);
        let cond = tr.relop(RelOp::Eq, lhs, ten);
        let brk = tr.break_exp(done);
        tr.if_exp(cond, brk, None)
    };
    let body = tr.seq_exp(vec![incr, escape], false);
    let cond = tr.int_lit(1);
    let whole = tr.while_exp(cond, body, done);
    tr.proc_entry_exit(&main, whole);

    let (mut frags, mut tmp) = tr.finish();
    let (body, frame) = match frags.pop().unwrap() {
        Fragment::Proc { body, frame } => (body, frame),
        Fragment::Str(..) => panic!("no string fragments expected"),
    };
    canonicalize(body.clone(), &mut tmp);
    let module = Context::new()
        .compile(&*isa, vec![Fragment::Proc { body, frame }], &mut tmp)
        .unwrap();
    assert!(module.text.iter().any(|l| l.contains("beq")));
}

#[test]
fn records_arrays_and_loops() {
    // let type intArray = array of int
    //     var arr := intArray [10] of 0
    //     var r := {a=1, b=2}
    //     var s := "done"
    // in
    //     for i := 0 to 9 do arr[i] := r.a;
    //     if s = "done" then print(s)
    // end
    let isa = rv64();
    let mut tr = Translator::new(&*isa);
    let main = tr.outermost();

    let arr = tr.alloc_local(&main, false);
    let arr_init = {
        let size = tr.int_lit(10);
        let zero = tr.int_lit(0);
        let value = tr.array(size, zero);
        let dst = tr.simple_var(&arr, &main);
        tr.assign(dst, value)
    };

    let rec = tr.alloc_local(&main, false);
    let rec_init = {
        let one = tr.int_lit(1);
        let two = tr.int_lit(2);
        let value = tr.record(vec![one, two]);
        let dst = tr.simple_var(&rec, &main);
        tr.assign(dst, value)
    };

    let i = tr.alloc_local(&main, false);
    let loop_done = tr.new_label();
    let loop_body = {
        let base = tr.simple_var(&arr, &main);
        let index = tr.simple_var(&i, &main);
        let element = tr.subscript_var(base, index);
        let rec_val = tr.simple_var(&rec, &main);
        let field = tr.field_var(rec_val, 0);
        tr.assign(element, field)
    };
    let lo = tr.int_lit(0);
    let hi = tr.int_lit(9);
    let the_loop = tr.for_exp(&i, &main, lo, hi, loop_body, loop_done);

    let s = tr.alloc_local(&main, false);
    let s_init = {
        let lit = tr.string_lit("done");
        let dst = tr.simple_var(&s, &main);
        tr.assign(dst, lit)
    };
    let report = {
        let lhs = tr.simple_var(&s, &main);
        let lit = tr.string_lit("done");
        let cond = tr.string_relop(RelOp::Eq, lhs, lit);
        let arg = tr.simple_var(&s, &main);
        let print = tr.runtime_call("print", vec![arg], false);
        tr.if_exp(cond, print, None)
    };

    let body = tr.seq_exp(vec![arr_init, rec_init, the_loop, s_init, report], false);
    tr.proc_entry_exit(&main, body);

    let (frags, mut tmp) = tr.finish();
    // One PROC plus one pooled string literal.
    assert_eq!(frags.len(), 2);
    let module = Context::new().compile(&*isa, frags, &mut tmp).unwrap();
    for callee in ["initArray", "initRecord", "stringEqual", "print"] {
        assert!(
            module
                .text
                .iter()
                .any(|l| l.trim() == format!("call {}", callee)),
            "missing runtime call to {}",
            callee
        );
    }
    // The subscript scales by the word size.
    assert!(module.text.iter().any(|l| l.contains("mul")));
    assert!(module.data.iter().any(|l| l == "    .quad 4"));
}

#[test]
fn pipeline_is_deterministic() {
    let build = || {
        let isa = rv64();
        let mut tr = Translator::new(&*isa);
        let main = tr.outermost();
        let x = tr.alloc_local(&main, true);
        let f_name = tr.named_label("helper");
        let f = tr.new_level(&main, f_name, &[false]).unwrap();
        let f_formal = tr.formals(&f).pop().unwrap();
        let f_body = {
            let arg = tr.simple_var(&f_formal, &f);
            let outer = tr.simple_var(&x, &f);
            tr.binop(BinOp::Add, arg, outer)
        };
        tr.proc_entry_exit(&f, f_body);
        let seven = tr.int_lit(7);
        let init = {
            let dst = tr.simple_var(&x, &main);
            tr.assign(dst, seven)
        };
        let arg = tr.int_lit(35);
        let call = tr.call(f_name, &f, &main, vec![arg], true);
        let body = tr.seq_exp(vec![init, call], true);
        tr.proc_entry_exit(&main, body);
        let (frags, mut tmp) = tr.finish();
        let module = Context::new().compile(&*isa, frags, &mut tmp).unwrap();
        (module.text, module.data)
    };
    assert_eq!(build(), build());
}
