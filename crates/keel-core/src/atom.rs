//! Interned atoms
//!
//! Atoms are short names compared by identity. Each runtime owns its own table.

use rustc_hash::FxHashMap;

/// An interned name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(u32);

impl Atom {
    /// Raw table index
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Per-runtime atom table
#[derive(Debug, Default)]
pub struct AtomTable {
    names: Vec<Box<str>>,
    index: FxHashMap<Box<str>, Atom>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the existing atom if already present
    pub fn intern(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.index.get(name) {
            return atom;
        }
        let atom = Atom(self.names.len() as u32);
        self.names.push(name.into());
        self.index.insert(name.into(), atom);
        atom
    }

    /// Look up an atom without interning
    pub fn get(&self, name: &str) -> Option<Atom> {
        self.index.get(name).copied()
    }

    /// Name of an atom from this table
    pub fn resolve(&self, atom: Atom) -> Option<&str> {
        self.names.get(atom.0 as usize).map(|name| &**name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
