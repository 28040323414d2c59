//! Human-readable renderings used by the verbose diagnostics.

pub mod ir;
pub mod tokens;
pub mod tree;

pub use tokens::{print_tokens, print_tokens_string};
pub use tree::{print_program, print_program_string};
