//! Activation records and compilation fragments.
//!
//! A [`Frame`] describes one function's activation record: its entry label,
//! an access for every formal parameter (the static link is formal #0 of
//! every nested function), and the local slots handed out so far. The frame
//! does not know the target's full stack layout; it only tracks offsets
//! relative to the frame pointer, and the target's prologue/epilogue code
//! turns those into a concrete stack frame.
//!
//! Frames are shared between the lexical level that created them and the
//! `PROC` fragment that carries the function body to the backend, and they
//! keep growing while either party allocates slots (spilling allocates
//! through the fragment's handle). They therefore live behind
//! `Rc<RefCell<_>>`.

use crate::ir::{BinOp, Expr, Stmt};
use crate::isa::TargetIsa;
use crate::result::{CodegenError, CodegenResult};
use crate::temp::{Label, Temp, TempCtx};
use std::cell::RefCell;
use std::rc::Rc;

/// Where a variable lives.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Access {
    /// In a virtual register.
    Reg(Temp),
    /// In the frame, at the given byte offset from the frame pointer.
    /// Offsets are negative: the frame grows downward.
    Frame(i32),
}

impl Access {
    /// The tree expression reading this variable, given an expression that
    /// computes the frame pointer of the frame the access belongs to.
    ///
    /// For an access in the current frame the frame-pointer temp is passed
    /// directly; for an access in an enclosing frame the caller passes the
    /// static-link chain that reaches it.
    pub fn expr(&self, fp: Expr) -> Expr {
        match *self {
            Access::Reg(t) => Expr::Temp(t),
            Access::Frame(offset) => Expr::Mem(Box::new(Expr::BinOp(
                BinOp::Add,
                Box::new(fp),
                Box::new(Expr::Const(offset as i64)),
            ))),
        }
    }
}

/// A function's activation record.
pub struct Frame {
    name: Label,
    formals: Vec<Access>,
    next_local: i32,
    locals_size: i32,
    word_size: i32,
}

/// A shared, mutable handle to a frame.
pub type FrameRef = Rc<RefCell<Frame>>;

impl Frame {
    /// Create a frame for a function named `name` whose formals have the
    /// given escape flags. The caller is responsible for including the
    /// static link as the first formal where one exists.
    ///
    /// Escaping formals get frame slots; the rest live in fresh temps. The
    /// target's entry code moves each incoming argument register into its
    /// access. Functions with more formals than the target passes in
    /// registers are rejected.
    pub fn new(
        isa: &dyn TargetIsa,
        tmp: &mut TempCtx,
        name: Label,
        formals_escape: &[bool],
    ) -> CodegenResult<FrameRef> {
        if formals_escape.len() > isa.arg_regs().len() {
            return Err(CodegenError::Unsupported(format!(
                "function {} has {} parameters; at most {} fit in argument registers",
                tmp.label_name(name),
                formals_escape.len(),
                isa.arg_regs().len(),
            )));
        }
        let mut frame = Frame {
            name,
            formals: Vec::with_capacity(formals_escape.len()),
            next_local: -isa.word_size(),
            locals_size: 0,
            word_size: isa.word_size(),
        };
        for &escapes in formals_escape {
            let access = frame.alloc(tmp, escapes);
            frame.formals.push(access);
        }
        Ok(Rc::new(RefCell::new(frame)))
    }

    /// The function's entry label.
    pub fn name(&self) -> Label {
        self.name
    }

    /// Accesses for all formals, the static link included.
    pub fn formals(&self) -> &[Access] {
        &self.formals
    }

    /// Allocate a new local variable.
    ///
    /// An escaping local gets the next frame slot; a non-escaping one gets
    /// a fresh temp.
    pub fn alloc_local(&mut self, tmp: &mut TempCtx, escapes: bool) -> Access {
        self.alloc(tmp, escapes)
    }

    fn alloc(&mut self, tmp: &mut TempCtx, escapes: bool) -> Access {
        if escapes {
            let offset = self.next_local;
            self.next_local -= self.word_size;
            self.locals_size += self.word_size;
            Access::Frame(offset)
        } else {
            Access::Reg(tmp.make_temp())
        }
    }

    /// Total bytes of frame slots allocated so far.
    pub fn locals_size(&self) -> i32 {
        self.locals_size
    }
}

/// A compilation unit produced by translation.
pub enum Fragment {
    /// A compiled function body, not yet canonicalized.
    Proc {
        /// The function body, wrapped with the entry/exit moves of stage 1.
        body: Stmt,
        /// The function's frame.
        frame: FrameRef,
    },
    /// A string literal to be placed in the data section.
    Str(Label, String),
}

/// A call to a named routine in the Tiger runtime.
///
/// Runtime routines follow the target's normal calling convention but take
/// no static link.
pub fn external_call(tmp: &mut TempCtx, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Box::new(Expr::Name(tmp.named_label(name))), args)
}
