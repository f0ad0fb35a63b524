//! Translation of the typed syntax tree into tree IR.
//!
//! Semantic analysis walks the program and drives the constructors here,
//! one per language form; translation accumulates a `PROC` fragment per
//! function and a `STRING` fragment per distinct literal.
//!
//! A lowered expression is one of three things:
//!
//! - `Ex`, an expression yielding a value;
//! - `Nx`, a statement executed for effect;
//! - `Cx`, a conditional: a deferred function from a (true, false) label
//!   pair to the statement that branches to one of them.
//!
//! Comparisons and boolean operators build `Cx` directly, so an `if` can
//! wire its labels straight into the condition without materializing a
//! boolean. Converting a `Cx` to a value costs a temp and two labels;
//! converting a statement to a value is a type error upstream and panics
//! here.

mod level;

pub use self::level::{Level, VarAccess};

use crate::frame::{external_call, Fragment, Frame};
use crate::ir::{seq, BinOp, Expr, RelOp, Stmt};
use crate::isa::TargetIsa;
use crate::result::CodegenResult;
use crate::temp::{Label, TempCtx};

/// A deferred conditional: given the true and false labels, produce the
/// branching statement.
pub type CondFn = Box<dyn FnOnce(Label, Label) -> Stmt>;

/// A lowered source expression.
pub enum Exp {
    /// Yields a value.
    Ex(Expr),
    /// A pure statement.
    Nx(Stmt),
    /// A conditional, waiting for its labels.
    Cx(CondFn),
}

impl Exp {
    /// The value of this expression.
    pub(crate) fn un_ex(self, tmp: &mut TempCtx) -> Expr {
        match self {
            Exp::Ex(e) => e,
            Exp::Nx(s) => panic!("statement used as a value: {}", s),
            Exp::Cx(gen) => {
                let r = tmp.make_temp();
                let t = tmp.make_label();
                let f = tmp.make_label();
                Expr::ESeq(
                    Box::new(seq(vec![
                        Stmt::Move(Box::new(Expr::Temp(r)), Box::new(Expr::Const(1))),
                        gen(t, f),
                        Stmt::Label(f),
                        Stmt::Move(Box::new(Expr::Temp(r)), Box::new(Expr::Const(0))),
                        Stmt::Label(t),
                    ])),
                    Box::new(Expr::Temp(r)),
                )
            }
        }
    }

    /// This expression as a statement, discarding any value.
    pub(crate) fn un_nx(self, tmp: &mut TempCtx) -> Stmt {
        match self {
            Exp::Ex(e) => Stmt::Exp(Box::new(e)),
            Exp::Nx(s) => s,
            Exp::Cx(gen) => {
                let l = tmp.make_label();
                Stmt::Seq(Box::new(gen(l, l)), Box::new(Stmt::Label(l)))
            }
        }
    }

    /// This expression as a conditional.
    pub(crate) fn un_cx(self) -> CondFn {
        match self {
            Exp::Ex(Expr::Const(0)) => Box::new(move |_t, f| jump_to(f)),
            Exp::Ex(Expr::Const(_)) => Box::new(move |t, _f| jump_to(t)),
            Exp::Ex(e) => Box::new(move |t, f| {
                Stmt::CJump(RelOp::Ne, Box::new(e), Box::new(Expr::Const(0)), t, f)
            }),
            Exp::Nx(s) => panic!("statement used as a condition: {}", s),
            Exp::Cx(gen) => gen,
        }
    }
}

fn jump_to(label: Label) -> Stmt {
    Stmt::Jump(Box::new(Expr::Name(label)), vec![label])
}

/// Accumulates fragments while the semantic analyzer walks a program.
pub struct Translator<'a> {
    isa: &'a dyn TargetIsa,
    tmp: TempCtx,
    frags: Vec<Fragment>,
    outermost: Level,
    next_level_id: u32,
}

impl<'a> Translator<'a> {
    /// Create a translator for one program.
    ///
    /// The outermost level carries the frame of `main`: no formals, no
    /// static link, and the whole program body as its body.
    pub fn new(isa: &'a dyn TargetIsa) -> Self {
        let mut tmp = TempCtx::new(isa.register_info().len());
        let name = tmp.named_label("main");
        let frame = Frame::new(isa, &mut tmp, name, &[])
            .expect("the outermost frame has no formals");
        Self {
            isa,
            tmp,
            frags: Vec::new(),
            outermost: Level::new(None, frame, 0),
            next_level_id: 1,
        }
    }

    /// The level of `main`.
    pub fn outermost(&self) -> Level {
        self.outermost.clone()
    }

    /// Create a fresh unnamed label.
    pub fn new_label(&mut self) -> Label {
        self.tmp.make_label()
    }

    /// Create a fresh label carrying a symbolic name.
    pub fn named_label(&mut self, name: &str) -> Label {
        self.tmp.named_label(name)
    }

    /// Create the level for a function declared under `parent`.
    ///
    /// A `true` is prepended to `formals_escape` for the static link, so
    /// the link is formal #0 of the new frame and always escapes.
    pub fn new_level(
        &mut self,
        parent: &Level,
        name: Label,
        formals_escape: &[bool],
    ) -> CodegenResult<Level> {
        let mut escapes = Vec::with_capacity(formals_escape.len() + 1);
        escapes.push(true);
        escapes.extend_from_slice(formals_escape);
        let frame = Frame::new(self.isa, &mut self.tmp, name, &escapes)?;
        let id = self.next_level_id;
        self.next_level_id += 1;
        Ok(Level::new(Some(parent.clone()), frame, id))
    }

    /// The user-visible formals of `level`, static link elided.
    pub fn formals(&self, level: &Level) -> Vec<VarAccess> {
        let frame = level.frame().borrow();
        let formals = frame.formals();
        assert!(!formals.is_empty(), "level has no static link");
        formals[1..]
            .iter()
            .map(|&access| VarAccess {
                level: level.clone(),
                access,
            })
            .collect()
    }

    /// Allocate a local variable in `level`.
    pub fn alloc_local(&mut self, level: &Level, escapes: bool) -> VarAccess {
        let access = level
            .frame()
            .borrow_mut()
            .alloc_local(&mut self.tmp, escapes);
        VarAccess {
            level: level.clone(),
            access,
        }
    }

    /// An expression for the frame pointer of `target`'s frame as seen
    /// from code running in `from`, following static links as needed.
    fn frame_ptr(&self, target: &Level, from: &Level) -> Expr {
        let mut addr = Expr::Temp(self.isa.frame_pointer());
        let mut level = from.clone();
        while level != *target {
            let link = {
                let frame = level.frame().borrow();
                let formals = frame.formals();
                assert!(!formals.is_empty(), "static link chase entered a level without one");
                formals[0]
            };
            addr = link.expr(addr);
            level = level
                .parent()
                .expect("static link chase ran past the outermost level")
                .clone();
        }
        addr
    }

    /// Read a variable from code running in `from`.
    pub fn simple_var(&self, var: &VarAccess, from: &Level) -> Exp {
        Exp::Ex(var.access.expr(self.frame_ptr(&var.level, from)))
    }

    /// Read field number `index` of a record.
    pub fn field_var(&mut self, record: Exp, index: usize) -> Exp {
        let base = record.un_ex(&mut self.tmp);
        let offset = index as i64 * self.isa.word_size() as i64;
        Exp::Ex(Expr::Mem(Box::new(Expr::BinOp(
            BinOp::Add,
            Box::new(base),
            Box::new(Expr::Const(offset)),
        ))))
    }

    /// Index an array.
    pub fn subscript_var(&mut self, array: Exp, index: Exp) -> Exp {
        let base = array.un_ex(&mut self.tmp);
        let index = index.un_ex(&mut self.tmp);
        let scaled = Expr::BinOp(
            BinOp::Mul,
            Box::new(index),
            Box::new(Expr::Const(self.isa.word_size() as i64)),
        );
        Exp::Ex(Expr::Mem(Box::new(Expr::BinOp(
            BinOp::Add,
            Box::new(base),
            Box::new(scaled),
        ))))
    }

    /// An integer literal.
    pub fn int_lit(&self, value: i64) -> Exp {
        Exp::Ex(Expr::Const(value))
    }

    /// The value `nil`.
    pub fn nil(&self) -> Exp {
        Exp::Ex(Expr::Const(0))
    }

    /// The unit value `()`.
    pub fn unit(&self) -> Exp {
        Exp::Nx(Stmt::Exp(Box::new(Expr::Const(0))))
    }

    /// A string literal. Literals are pooled: the same text always names
    /// the same data label.
    pub fn string_lit(&mut self, text: &str) -> Exp {
        for frag in &self.frags {
            if let Fragment::Str(label, existing) = frag {
                if existing == text {
                    return Exp::Ex(Expr::Name(*label));
                }
            }
        }
        let label = self.tmp.make_label();
        self.frags.push(Fragment::Str(label, text.to_string()));
        Exp::Ex(Expr::Name(label))
    }

    /// An arithmetic or bitwise operation.
    pub fn binop(&mut self, op: BinOp, left: Exp, right: Exp) -> Exp {
        let l = left.un_ex(&mut self.tmp);
        let r = right.un_ex(&mut self.tmp);
        Exp::Ex(Expr::BinOp(op, Box::new(l), Box::new(r)))
    }

    /// Unary negation.
    pub fn neg(&mut self, value: Exp) -> Exp {
        let e = value.un_ex(&mut self.tmp);
        Exp::Ex(Expr::BinOp(
            BinOp::Sub,
            Box::new(Expr::Const(0)),
            Box::new(e),
        ))
    }

    /// An integer comparison, as a conditional.
    pub fn relop(&mut self, op: RelOp, left: Exp, right: Exp) -> Exp {
        let l = left.un_ex(&mut self.tmp);
        let r = right.un_ex(&mut self.tmp);
        Exp::Cx(Box::new(move |t, f| {
            Stmt::CJump(op, Box::new(l), Box::new(r), t, f)
        }))
    }

    /// A string comparison, through the runtime.
    pub fn string_relop(&mut self, op: RelOp, left: Exp, right: Exp) -> Exp {
        let l = left.un_ex(&mut self.tmp);
        let r = right.un_ex(&mut self.tmp);
        match op {
            RelOp::Eq | RelOp::Ne => {
                let call = external_call(&mut self.tmp, "stringEqual", vec![l, r]);
                // stringEqual answers 1 for equal strings.
                let branch = if op == RelOp::Eq { RelOp::Ne } else { RelOp::Eq };
                Exp::Cx(Box::new(move |t, f| {
                    Stmt::CJump(branch, Box::new(call), Box::new(Expr::Const(0)), t, f)
                }))
            }
            _ => {
                let call = external_call(&mut self.tmp, "stringCompare", vec![l, r]);
                Exp::Cx(Box::new(move |t, f| {
                    Stmt::CJump(op, Box::new(call), Box::new(Expr::Const(0)), t, f)
                }))
            }
        }
    }

    /// A record literal: allocate, then fill each field in order.
    pub fn record(&mut self, fields: Vec<Exp>) -> Exp {
        let word = self.isa.word_size() as i64;
        let r = self.tmp.make_temp();
        let size = fields.len() as i64 * word;
        let alloc = external_call(&mut self.tmp, "initRecord", vec![Expr::Const(size)]);
        let mut stmts = vec![Stmt::Move(Box::new(Expr::Temp(r)), Box::new(alloc))];
        for (i, field) in fields.into_iter().enumerate() {
            let value = field.un_ex(&mut self.tmp);
            stmts.push(Stmt::Move(
                Box::new(Expr::Mem(Box::new(Expr::BinOp(
                    BinOp::Add,
                    Box::new(Expr::Temp(r)),
                    Box::new(Expr::Const(i as i64 * word)),
                )))),
                Box::new(value),
            ));
        }
        Exp::Ex(Expr::ESeq(Box::new(seq(stmts)), Box::new(Expr::Temp(r))))
    }

    /// An array literal: size and initial element value.
    pub fn array(&mut self, size: Exp, init: Exp) -> Exp {
        let size = size.un_ex(&mut self.tmp);
        let init = init.un_ex(&mut self.tmp);
        Exp::Ex(external_call(&mut self.tmp, "initArray", vec![size, init]))
    }

    /// An assignment.
    pub fn assign(&mut self, dst: Exp, src: Exp) -> Exp {
        let dst = dst.un_ex(&mut self.tmp);
        let src = src.un_ex(&mut self.tmp);
        Exp::Nx(Stmt::Move(Box::new(dst), Box::new(src)))
    }

    /// An `if` expression. Branches must agree about yielding a value;
    /// the type checker saw to that.
    pub fn if_exp(&mut self, cond: Exp, then: Exp, els: Option<Exp>) -> Exp {
        let gen = cond.un_cx();
        match els {
            None => {
                let t = self.tmp.make_label();
                let done = self.tmp.make_label();
                let then_s = then.un_nx(&mut self.tmp);
                Exp::Nx(seq(vec![
                    gen(t, done),
                    Stmt::Label(t),
                    then_s,
                    Stmt::Label(done),
                ]))
            }
            Some(els) => match (then, els) {
                (Exp::Nx(then_s), Exp::Nx(els_s)) => {
                    let t = self.tmp.make_label();
                    let f = self.tmp.make_label();
                    let done = self.tmp.make_label();
                    Exp::Nx(seq(vec![
                        gen(t, f),
                        Stmt::Label(t),
                        then_s,
                        jump_to(done),
                        Stmt::Label(f),
                        els_s,
                        Stmt::Label(done),
                    ]))
                }
                (Exp::Nx(s), _) | (_, Exp::Nx(s)) => {
                    panic!("if branches disagree about yielding a value: {}", s)
                }
                (then, els) => {
                    let r = self.tmp.make_temp();
                    let t = self.tmp.make_label();
                    let f = self.tmp.make_label();
                    let done = self.tmp.make_label();
                    let then_e = then.un_ex(&mut self.tmp);
                    let els_e = els.un_ex(&mut self.tmp);
                    Exp::Ex(Expr::ESeq(
                        Box::new(seq(vec![
                            gen(t, f),
                            Stmt::Label(t),
                            Stmt::Move(Box::new(Expr::Temp(r)), Box::new(then_e)),
                            jump_to(done),
                            Stmt::Label(f),
                            Stmt::Move(Box::new(Expr::Temp(r)), Box::new(els_e)),
                            Stmt::Label(done),
                        ])),
                        Box::new(Expr::Temp(r)),
                    ))
                }
            },
        }
    }

    /// A `while` loop. `done` is the loop's break target, created with
    /// [`Translator::new_label`] before the body is translated.
    pub fn while_exp(&mut self, cond: Exp, body: Exp, done: Label) -> Exp {
        let test = self.tmp.make_label();
        let body_l = self.tmp.make_label();
        let gen = cond.un_cx();
        let body_s = body.un_nx(&mut self.tmp);
        Exp::Nx(seq(vec![
            Stmt::Label(test),
            gen(body_l, done),
            Stmt::Label(body_l),
            body_s,
            jump_to(test),
            Stmt::Label(done),
        ]))
    }

    /// A `for` loop over an inclusive range. The loop variable was
    /// allocated in `level` by the caller.
    pub fn for_exp(
        &mut self,
        var: &VarAccess,
        level: &Level,
        lo: Exp,
        hi: Exp,
        body: Exp,
        done: Label,
    ) -> Exp {
        let i = match self.simple_var(var, level) {
            Exp::Ex(e) => e,
            _ => unreachable!("variable access is always a value"),
        };
        let limit = self.tmp.make_temp();
        let body_l = self.tmp.make_label();
        let incr = self.tmp.make_label();
        let lo = lo.un_ex(&mut self.tmp);
        let hi = hi.un_ex(&mut self.tmp);
        let body_s = body.un_nx(&mut self.tmp);
        // Test the increment separately so a limit of maxint can't wrap.
        Exp::Nx(seq(vec![
            Stmt::Move(Box::new(i.clone()), Box::new(lo)),
            Stmt::Move(Box::new(Expr::Temp(limit)), Box::new(hi)),
            Stmt::CJump(
                RelOp::Le,
                Box::new(i.clone()),
                Box::new(Expr::Temp(limit)),
                body_l,
                done,
            ),
            Stmt::Label(body_l),
            body_s,
            Stmt::CJump(
                RelOp::Lt,
                Box::new(i.clone()),
                Box::new(Expr::Temp(limit)),
                incr,
                done,
            ),
            Stmt::Label(incr),
            Stmt::Move(
                Box::new(i.clone()),
                Box::new(Expr::BinOp(
                    BinOp::Add,
                    Box::new(i),
                    Box::new(Expr::Const(1)),
                )),
            ),
            jump_to(body_l),
            Stmt::Label(done),
        ]))
    }

    /// A `break`: jump to the enclosing loop's done label.
    pub fn break_exp(&self, done: Label) -> Exp {
        Exp::Nx(jump_to(done))
    }

    /// A call of the user function entered at `func`, declared at
    /// `callee_level`, from code running in `caller_level`.
    ///
    /// The static link, the frame pointer of the callee's *enclosing*
    /// function, is passed as the hidden first argument.
    pub fn call(
        &mut self,
        func: Label,
        callee_level: &Level,
        caller_level: &Level,
        args: Vec<Exp>,
        returns_value: bool,
    ) -> Exp {
        let parent = callee_level
            .parent()
            .expect("user functions always have an enclosing level")
            .clone();
        let link = self.frame_ptr(&parent, caller_level);
        let mut ir_args = Vec::with_capacity(args.len() + 1);
        ir_args.push(link);
        for arg in args {
            ir_args.push(arg.un_ex(&mut self.tmp));
        }
        let call = Expr::Call(Box::new(Expr::Name(func)), ir_args);
        if returns_value {
            Exp::Ex(call)
        } else {
            Exp::Nx(Stmt::Exp(Box::new(call)))
        }
    }

    /// A call of a runtime routine. No static link is passed.
    pub fn runtime_call(&mut self, name: &str, args: Vec<Exp>, returns_value: bool) -> Exp {
        let mut ir_args = Vec::with_capacity(args.len());
        for arg in args {
            ir_args.push(arg.un_ex(&mut self.tmp));
        }
        let call = external_call(&mut self.tmp, name, ir_args);
        if returns_value {
            Exp::Ex(call)
        } else {
            Exp::Nx(Stmt::Exp(Box::new(call)))
        }
    }

    /// A sequence of expressions, yielding the last one's value when
    /// `gives_value` holds.
    pub fn seq_exp(&mut self, mut exps: Vec<Exp>, gives_value: bool) -> Exp {
        let last = match exps.pop() {
            Some(last) => last,
            None => return self.unit(),
        };
        let mut stmts: Vec<Stmt> = Vec::with_capacity(exps.len());
        for e in exps {
            stmts.push(e.un_nx(&mut self.tmp));
        }
        if gives_value {
            let value = last.un_ex(&mut self.tmp);
            if stmts.is_empty() {
                Exp::Ex(value)
            } else {
                Exp::Ex(Expr::ESeq(Box::new(seq(stmts)), Box::new(value)))
            }
        } else {
            stmts.push(last.un_nx(&mut self.tmp));
            Exp::Nx(seq(stmts))
        }
    }

    /// Finish one function: move its result into the return register,
    /// apply the target's stage-1 entry/exit wrapping, and record the
    /// `PROC` fragment.
    pub fn proc_entry_exit(&mut self, level: &Level, body: Exp) {
        let body_stmt = match body {
            Exp::Nx(s) => s,
            other => {
                let rv = self.isa.return_value();
                let value = other.un_ex(&mut self.tmp);
                Stmt::Move(Box::new(Expr::Temp(rv)), Box::new(value))
            }
        };
        let wrapped =
            self.isa
                .proc_entry_exit1(&level.frame().borrow(), &mut self.tmp, body_stmt);
        log::debug!(
            "translated {}",
            self.tmp.label_name(level.frame().borrow().name())
        );
        self.frags.push(Fragment::Proc {
            body: wrapped,
            frame: level.frame().clone(),
        });
    }

    /// Hand over the fragments and the temp supply for the backend passes.
    pub fn finish(self) -> (Vec<Fragment>, TempCtx) {
        (self.frags, self.tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa;

    fn setup() -> Box<dyn TargetIsa> {
        isa::lookup("riscv64".parse().unwrap()).unwrap()
    }

    fn mem_depth(e: &Expr) -> usize {
        match e {
            Expr::Mem(inner) => 1 + mem_depth(inner),
            Expr::BinOp(_, a, b) => mem_depth(a).max(mem_depth(b)),
            _ => 0,
        }
    }

    #[test]
    fn same_level_access_is_direct() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let main = tr.outermost();
        let var = tr.alloc_local(&main, true);
        match tr.simple_var(&var, &main) {
            Exp::Ex(e) => assert_eq!(mem_depth(&e), 1),
            _ => panic!("variable access should be a value"),
        }
    }

    #[test]
    fn register_local_is_a_temp() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let main = tr.outermost();
        let var = tr.alloc_local(&main, false);
        match tr.simple_var(&var, &main) {
            Exp::Ex(Expr::Temp(_)) => {}
            _ => panic!("non-escaping local should live in a temp"),
        }
    }

    #[test]
    fn nested_access_chases_one_link() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let main = tr.outermost();
        let var = tr.alloc_local(&main, true);
        let f_name = tr.named_label("f");
        let f = tr.new_level(&main, f_name, &[]).unwrap();
        match tr.simple_var(&var, &f) {
            // One MEM for the static link, one for the variable itself.
            Exp::Ex(e) => assert_eq!(mem_depth(&e), 2),
            _ => panic!("variable access should be a value"),
        }
    }

    #[test]
    fn formals_elide_the_static_link() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let main = tr.outermost();
        let f_name = tr.named_label("f");
        let f = tr.new_level(&main, f_name, &[false, true]).unwrap();
        assert_eq!(tr.formals(&f).len(), 2);
        assert_eq!(f.frame().borrow().formals().len(), 3);
    }

    #[test]
    fn string_literals_are_pooled() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let a = match tr.string_lit("hello") {
            Exp::Ex(Expr::Name(l)) => l,
            _ => panic!("string literal should be a name"),
        };
        let b = match tr.string_lit("hello") {
            Exp::Ex(Expr::Name(l)) => l,
            _ => panic!("string literal should be a name"),
        };
        let c = match tr.string_lit("world") {
            Exp::Ex(Expr::Name(l)) => l,
            _ => panic!("string literal should be a name"),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
        let (frags, _) = tr.finish();
        assert_eq!(frags.len(), 2);
    }

    #[test]
    fn call_passes_the_static_link_first() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let main = tr.outermost();
        let f_name = tr.named_label("f");
        let f = tr.new_level(&main, f_name, &[]).unwrap();
        let one = tr.int_lit(1);
        match tr.call(f_name, &f, &main, vec![one], true) {
            Exp::Ex(Expr::Call(_, args)) => {
                assert_eq!(args.len(), 2, "static link plus one argument");
                // Called from f's own parent: the link is the caller's fp.
                assert_eq!(args[0], Expr::Temp(isa.frame_pointer()));
            }
            _ => panic!("call should be a value"),
        }
    }

    #[test]
    #[should_panic(expected = "statement used as a value")]
    fn un_ex_of_statement_is_fatal() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let stmt = tr.unit();
        let main = tr.outermost();
        let var = tr.alloc_local(&main, false);
        let _ = tr.assign(tr.simple_var(&var, &main), stmt);
    }

    #[test]
    fn comparison_is_a_conditional() {
        let isa = setup();
        let mut tr = Translator::new(&*isa);
        let lhs = tr.int_lit(1);
        let rhs = tr.int_lit(2);
        let cx = tr.relop(RelOp::Lt, lhs, rhs);
        let gen = match cx {
            Exp::Cx(gen) => gen,
            _ => panic!("comparison should be a conditional"),
        };
        let t = tr.new_label();
        let f = tr.new_label();
        match gen(t, f) {
            Stmt::CJump(RelOp::Lt, _, _, t2, f2) => {
                assert_eq!((t2, f2), (t, f));
            }
            other => panic!("expected a conditional jump, got {}", other),
        }
    }
}
