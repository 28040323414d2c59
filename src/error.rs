use std::{io, path::PathBuf};

use crate::{
    backend::{ExecError, LinkError},
    codegen, lexer, parser,
    token::{Spanned, TokenKind},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any error the pipeline can produce. Lexer and parser errors are shown
/// with the span they refer to.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0:#}")]
    Lex(#[from] Spanned<lexer::Error>),
    #[error("{0:#}")]
    Parse(#[from] Spanned<parser::Error>),
    #[error(transparent)]
    Codegen(#[from] codegen::Error),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("failed to read `{}`: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error only means that the input stopped too early, e.g.
    /// inside a function body. An interactive driver may ask for more input
    /// instead of reporting it.
    pub fn is_incomplete_input(&self) -> bool {
        match self {
            Error::Lex(error) => error.inner == lexer::Error::UnterminatedLiteral,
            Error::Parse(error) => matches!(
                error.inner,
                parser::Error::UnexpectedEndOfFunction
                    | parser::Error::Unexpected {
                        actual: TokenKind::Eof,
                        ..
                    }
                    | parser::Error::UnexpectedAny {
                        actual: TokenKind::Eof,
                        ..
                    }
                    | parser::Error::UnexpectedToken(TokenKind::Eof)
            ),
            _ => false,
        }
    }
}
