//! Execution backends. A backend owns a "process image" into which modules
//! are linked, and from which their functions can be called by name.

pub mod interp;

use std::fmt;

use crate::codegen::ir::{Module, VerifyError};

pub use interp::Interpreter;

pub trait Backend {
    /// Links the module into the image. Functions and globals it defines
    /// shadow any earlier ones with the same name.
    fn link(&mut self, module: Module) -> Result<UnitHandle, LinkError>;

    /// Calls the most recently linked function named `symbol`.
    fn call(&mut self, symbol: &str, args: &[Value]) -> Result<Value, ExecError>;

    /// Reads the current value of the most recently linked global named
    /// `symbol`.
    fn global(&self, symbol: &str) -> Option<Value>;

    /// Removes everything the unit defined from the image, re-exposing what it
    /// shadowed.
    fn unlink(&mut self, unit: UnitHandle) -> Result<(), LinkError>;
}

/// Identifies a linked unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnitHandle(pub(crate) u32);

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A runtime value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    /// The "no value" marker.
    Unit,
    /// Only produced by comparisons; never escapes a function.
    Bool(bool),
}

impl Value {
    pub fn as_number(self) -> Option<f64> {
        match self {
            Value::Number(val) => Some(val),
            _ => None,
        }
    }

    pub fn is_unit(self) -> bool {
        self == Value::Unit
    }

    pub const fn type_name(self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Unit => "unit",
            Value::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(val) => write!(f, "{val}"),
            Value::Unit => f.write_str("()"),
            Value::Bool(val) => write!(f, "{val}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum LinkError {
    #[error("refusing to link module `{module}`: {source}")]
    Unverified {
        module: String,
        source: VerifyError,
    },
    #[error("unit {0} is not linked")]
    UnknownUnit(UnitHandle),
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("unresolved symbol `{0}`")]
    UnresolvedSymbol(Box<str>),
    #[error("function `{symbol}` takes {expected} argument(s), but {actual} were supplied")]
    ArityMismatch {
        symbol: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("type mismatch: expected {expected}, but got {}", .actual.type_name())]
    TypeMismatch {
        expected: &'static str,
        actual: Value,
    },
    #[error("stack overflow (call depth exceeded {0})")]
    StackOverflow(usize),
    #[error("block `{0}` has no terminator")]
    Unterminated(Box<str>),
}
