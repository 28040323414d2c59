use std::{iter::Peekable, str::Chars};

use crate::token::{Span, Spanned, Token, TokenKind, KEYWORDS, OPERATOR_CHARS, PUNCTUATION};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 1_024;

pub type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Lexes the provided string, producing the tokens into the provided buffer.
///
/// The buffer never receives an end-of-input token; consumers are expected to
/// treat an exhausted sequence as [`TokenKind::Eof`].
pub fn lex(src: &str, tokens: &mut Vec<Token>) -> Result<()> {
    Lexer::new(src, tokens).lex()
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(src, &mut tokens)?;
    Ok(tokens)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unterminated literal")]
    UnterminatedLiteral,
    #[error("multi-character literal")]
    MultiCharacterLiteral,
    #[error("empty character literal")]
    EmptyCharLiteral,
    #[error("unrecognized character {0:?}")]
    UnrecognizedCharacter(char),
}

/// The Ellis lexer
struct Lexer<'src, 'tok> {
    src: &'src str,
    iter: Peekable<Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    tokens: &'tok mut Vec<Token>,
}

impl Lexer<'_, '_> {
    /// Scans the source string until the input is exhausted.
    fn lex(mut self) -> Result<()> {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            self.skip_whitespace();
            if self.peek() == '\0' {
                return Ok(());
            }
            if let Some(kind) = self.scan_token_kind()? {
                self.produce(kind);
            }
        }
    }

    /// Tries to scan the current character. Returns `None` when no token is
    /// left to produce by the caller: comments, and quoted literals (which
    /// produce their own token, spanning the contents only).
    fn scan_token_kind(&mut self) -> Result<Option<TokenKind>> {
        let kind = match self.mark_advance() {
            '#' => {
                self.comment();
                return Ok(None);
            }
            '"' => {
                let (_, span) = self.quoted('"')?;
                self.produce_spanned(TokenKind::String, span);
                return Ok(None);
            }
            '\'' => {
                self.char()?;
                return Ok(None);
            }
            c if c.is_ascii_alphabetic() => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(),
            c if is_operator(c) => self.operator(),
            c => match PUNCTUATION.get(&c) {
                Some(&punct) => punct,
                None => {
                    let span = self.span();
                    return Err(span.wrap(Error::UnrecognizedCharacter(c)));
                }
            },
        };
        Ok(Some(kind))
    }

    fn char(&mut self) -> Result<()> {
        let (len, span) = self.quoted('\'')?;
        let error = match len {
            1 => {
                self.produce_spanned(TokenKind::Char, span);
                return Ok(());
            }
            0 => Error::EmptyCharLiteral,
            _ => Error::MultiCharacterLiteral,
        };
        Err(self.span().wrap(error))
    }

    /// Scans a quoted literal whose opening `quote` was just consumed, up to
    /// and including the closing one. A backslash always escapes the next
    /// character, but the escape is kept verbatim in the token text.
    ///
    /// Returns the number of characters in between (an escape pair counts as
    /// one) and the span of the contents, without the quotes.
    fn quoted(&mut self, quote: char) -> Result<(usize, Span)> {
        let content_lo = self.cursor;
        let mut len = 0;
        let mut is_escaping = false;
        loop {
            let content_hi = self.cursor;
            match (is_escaping, self.advance()) {
                // Input exhausted before the closing quote. Nothing past the
                // end of the source is consumed.
                (_, '\0') => {
                    return Err(self.span().wrap(Error::UnterminatedLiteral));
                }
                (false, c) if c == quote => {
                    return Ok((len, Span::new_of_bounds(content_lo..content_hi)));
                }
                (false, '\\') => {
                    is_escaping = true;
                }
                (_, _) => {
                    is_escaping = false;
                    len += 1;
                }
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        while valid_identifier_suffix(self.peek()) {
            self.advance();
        }
        match KEYWORDS.get(self.substr()).copied() {
            Some(keyword) => keyword,
            None => TokenKind::Identifier,
        }
    }

    fn number(&mut self) -> TokenKind {
        while matches!(self.peek(), '0'..='9' | '.') {
            self.advance();
        }
        TokenKind::Number
    }

    fn operator(&mut self) -> TokenKind {
        while is_operator(self.peek()) {
            self.advance();
        }
        TokenKind::Operator
    }

    fn comment(&mut self) {
        while !matches!(self.peek(), '\n' | '\0') {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while is_whitespace(self.peek()) {
            self.advance();
        }
    }
}

impl Lexer<'_, '_> {
    /// Constructs a new lexer with the default state.
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok mut Vec<Token>) -> Lexer<'src, 'tok> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            tokens,
        }
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next character and advances the iterator.
    fn advance(&mut self) -> char {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
            .unwrap_or('\0')
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    /// Produces a token using the marked bounds.
    fn produce(&mut self, kind: TokenKind) {
        self.produce_spanned(kind, self.span());
    }

    /// Produces a token with the provided span.
    fn produce_spanned(&mut self, kind: TokenKind, span: Span) {
        self.tokens.push(Token::new(kind, span));
    }
}

fn is_operator(c: char) -> bool {
    OPERATOR_CHARS.contains(&c)
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}
