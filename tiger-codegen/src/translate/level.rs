//! Lexical levels.
//!
//! A level wraps one function's frame together with the level of the
//! enclosing function. Semantic environments hold levels by cheap clone;
//! identity is the stored id, not structure, so two distinct instantiations
//! of textually identical functions stay distinct.

use crate::frame::{Access, FrameRef};
use std::rc::Rc;

/// One function's place in the lexical nesting.
#[derive(Clone)]
pub struct Level {
    inner: Rc<LevelData>,
}

struct LevelData {
    parent: Option<Level>,
    frame: FrameRef,
    id: u32,
}

impl Level {
    pub(crate) fn new(parent: Option<Level>, frame: FrameRef, id: u32) -> Self {
        Self {
            inner: Rc::new(LevelData { parent, frame, id }),
        }
    }

    /// The level of the enclosing function; `None` at the outermost level.
    pub fn parent(&self) -> Option<&Level> {
        self.inner.parent.as_ref()
    }

    /// The frame of the function this level wraps.
    pub fn frame(&self) -> &FrameRef {
        &self.inner.frame
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Level {}

/// A variable's definition: the level it was declared at paired with its
/// access in that level's frame. Following parent links from a use level
/// to `level` walks the chain of static links at run time.
#[derive(Clone)]
pub struct VarAccess {
    /// The declaring level.
    pub level: Level,
    /// Where the variable lives in that level's frame.
    pub access: Access,
}
