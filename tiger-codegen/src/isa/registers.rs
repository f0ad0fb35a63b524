//! Register file descriptions.
//!
//! Physical registers are temps: a target reserves the low temp numbers,
//! one per register, and publishes its names here. Everything above the
//! reserved range is a virtual register until allocation.

use crate::temp::Temp;
use tiger_entity::EntityRef;

/// The names and extent of a target's register file.
pub struct RegInfo {
    names: &'static [&'static str],
}

impl RegInfo {
    /// Create a description from a name table indexed by register number.
    pub fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    /// Number of physical registers.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Is the register file empty? (It never is, but clippy asks.)
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Does `temp` denote a physical register?
    pub fn is_physical(&self, temp: Temp) -> bool {
        temp.index() < self.names.len()
    }

    /// The assembly name of a physical register.
    ///
    /// Panics when handed a virtual temp; by the time names are needed,
    /// allocation has replaced every virtual temp.
    pub fn name(&self, temp: Temp) -> &'static str {
        assert!(
            self.is_physical(temp),
            "temp {} is not a physical register",
            temp
        );
        self.names[temp.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static NAMES: [&str; 3] = ["a", "b", "c"];

    #[test]
    fn physical_range() {
        let info = RegInfo::new(&NAMES);
        assert_eq!(info.len(), 3);
        assert!(info.is_physical(Temp::new(2)));
        assert!(!info.is_physical(Temp::new(3)));
        assert_eq!(info.name(Temp::new(1)), "b");
    }

    #[test]
    #[should_panic]
    fn virtual_temp_has_no_name() {
        let info = RegInfo::new(&NAMES);
        info.name(Temp::new(9));
    }
}
