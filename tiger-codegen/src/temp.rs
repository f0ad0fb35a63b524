//! Temporaries, labels, and the supply that creates them.
//!
//! A *temp* names a virtual register. The supply of temps is unlimited
//! until register allocation maps them onto the target's register file; the
//! target reserves the low temp numbers for its physical registers, and the
//! allocator treats those as precolored.
//!
//! A *label* names a code or data address. Labels that must appear as
//! symbols in the assembly output (function entry points, runtime routines,
//! string data) carry a name; all others render as numbered local labels.

use tiger_entity::{entity_impl, EntityRef, PrimaryMap};

/// An opaque reference to a virtual register.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(u32);
entity_impl!(Temp, "t");

/// An opaque reference to a code or data address.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);
entity_impl!(Label, "L");

/// Supply of fresh temps and labels for one compilation.
///
/// The supply is threaded mutably through translation and the
/// per-procedure backend passes. There is no global state: handing a
/// deterministically seeded supply to the pipeline makes repeated runs
/// produce identical ids, and an orchestrator compiling procedures in
/// parallel shards by giving each its own supply.
pub struct TempCtx {
    next_temp: u32,
    labels: PrimaryMap<Label, Option<String>>,
}

impl TempCtx {
    /// Create a supply whose first `reserved_temps` temp numbers are left
    /// for the target's physical registers.
    pub fn new(reserved_temps: usize) -> Self {
        Self {
            next_temp: reserved_temps as u32,
            labels: PrimaryMap::new(),
        }
    }

    /// Create a fresh temp, distinct from all previously created temps.
    pub fn make_temp(&mut self) -> Temp {
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    /// Create a fresh, unnamed label. It renders as a numbered local
    /// label (`.L7`).
    pub fn make_label(&mut self) -> Label {
        self.labels.push(None)
    }

    /// Create a fresh label carrying a symbolic name.
    ///
    /// Names are not interned: two calls with the same name yield distinct
    /// labels that render identically, which is what calls to the same
    /// runtime routine want.
    pub fn named_label(&mut self, name: &str) -> Label {
        self.labels.push(Some(name.to_string()))
    }

    /// The number of temps created so far, including the reserved ones.
    pub fn temp_count(&self) -> usize {
        self.next_temp as usize
    }

    /// The textual form of `label` in assembly output: its symbolic name,
    /// or `.LN` for unnamed labels.
    pub fn label_name(&self, label: Label) -> String {
        match self.labels.get(label) {
            Some(Some(name)) => name.clone(),
            _ => format!(".L{}", label.index()),
        }
    }
}
