use std::collections::HashMap;

use crate::codegen::ir::Place;

/// The variables visible in the function being generated. A new function
/// always starts from an empty environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    variables: HashMap<Box<str>, Place>,
}

impl Environment {
    pub fn lookup(&self, name: &str) -> Option<&Place> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Binds `name` to `place`. Returns `false` (and leaves the existing
    /// binding untouched) if the name is already bound.
    pub fn bind(&mut self, name: &str, place: Place) -> bool {
        if self.contains(name) {
            return false;
        }
        self.variables.insert(name.into(), place);
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub arity: usize,
    /// The symbol calls are linked against.
    pub symbol: Box<str>,
}

impl Signature {
    pub fn new(symbol: impl Into<Box<str>>, arity: usize) -> Signature {
        Signature {
            arity,
            symbol: symbol.into(),
        }
    }
}

/// Every function known to the module being generated (and, in a session,
/// to every unit linked before it).
///
/// Each definition of a name gets a symbol of its own, so a call is bound to
/// the definition visible where it was written. Later definitions only
/// replace the mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionTable {
    signatures: HashMap<Box<str>, Signature>,
    definitions: HashMap<Box<str>, usize>,
}

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.signatures.get(name)
    }

    /// Inserts (or replaces) a signature, returning the one it shadowed.
    pub fn insert(&mut self, name: &str, signature: Signature) -> Option<Signature> {
        self.signatures.insert(name.into(), signature)
    }

    /// Puts back the mapping that an [`insert`](Self::insert) returned.
    pub fn restore(&mut self, name: &str, previous: Option<Signature>) {
        match previous {
            Some(signature) => {
                self.signatures.insert(name.into(), signature);
            }
            None => {
                self.signatures.remove(name);
            }
        }
    }

    /// Picks the symbol for a new definition of `name`: the name itself the
    /// first time, then `name.1`, `name.2` and so on. Identifiers cannot
    /// contain `.`, so these never collide with source names.
    pub fn next_symbol(&mut self, name: &str) -> Box<str> {
        let count = self.definitions.entry(name.into()).or_insert(0);
        let symbol = match *count {
            0 => name.into(),
            n => format!("{name}.{n}").into(),
        };
        *count += 1;
        symbol
    }
}
