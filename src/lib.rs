/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The code generator lowers the AST into the target IR, one compilation unit
/// at a time.
pub mod codegen;

/// Backends link IR modules into a running image and execute them.
pub mod backend;

pub mod ast;
pub mod compiler;
pub mod error;
pub mod session;
pub mod token;

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}

pub use error::{Error, Result};
