//! Lowering of syntax trees into the target IR.

pub mod builder;
pub mod env;
pub mod generator;
pub mod interface;
pub mod ir;

pub use env::{FunctionTable, Signature};
pub use generator::CodeGenerator;
pub use interface::{generate, generate_unit, Unit, ANON_FUNCTION, MAIN_FUNCTION};

use crate::ast::BinaryOperator;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown variable `{0}`")]
    UnknownVariable(Box<str>),
    #[error("unknown function `{0}`")]
    UnknownFunction(Box<str>),
    #[error("function `{callee}` takes {expected} argument(s), but {actual} were supplied")]
    ArityMismatch {
        callee: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("variable `{0}` is already declared")]
    RedeclaredVariable(Box<str>),
    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(BinaryOperator),
    #[error("unsupported {0} literal")]
    UnsupportedLiteral(&'static str),
    #[error("only variables can be assigned to")]
    InvalidAssignmentTarget,
    #[error("expression outside of any function")]
    NoEnclosingFunction,
    #[error(transparent)]
    Verify(#[from] ir::VerifyError),
}
