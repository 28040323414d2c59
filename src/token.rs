use std::{fmt, ops::Range};

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    lo: usize,
    len: u32,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token {
            kind,
            len: span.len,
            lo: span.lo,
        }
    }

    /// The synthetic end-of-input token, positioned right after the source.
    pub fn eof_for(src: &str) -> Token {
        Token::new(TokenKind::Eof, Span::new_of_length(src.len(), 0))
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    /// Returns the literal text of this token. For string and character
    /// literals the surrounding quotes are not part of the text.
    pub fn text<'src>(&self, src: &'src str) -> &'src str {
        self.span().substr(src)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Whether the token is an operator token with exactly the given text.
    pub fn is_operator(&self, src: &str, text: &str) -> bool {
        self.kind == TokenKind::Operator && self.text(src) == text
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {})", self.kind, self.span())
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        Self::new_of_length(lo, u32::try_from(hi - lo).unwrap_or(u32::MAX))
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(&self) -> usize {
        self.lo + self.len as usize
    }

    pub fn substr<'src>(&self, src: &'src str) -> &'src str {
        &src[self.lo..self.hi()]
    }

    /// Returns a span which starts at `self` and ends at `other`.
    pub fn to(&self, other: Span) -> Span {
        Span::new_of_bounds(self.lo..other.hi().max(self.lo))
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

/// Some value (usually an error) tied to the region of the source it refers
/// to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{}: ", self.span)?;
        }
        write!(f, "{}", self.inner)
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for Spanned<T> {}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Let,
    If,
    Then,
    Else,
    End,
    For,
    While,
    In,
    Return,
    And,
    Or,
    Not,

    LParen,
    RParen,
    Semicolon,
    Comma,
    Colon,

    /// A maximal run of [`OPERATOR_CHARS`].
    Operator,
    Identifier,
    Number,
    String,
    Char,

    Eof,
}

impl TokenKind {
    /// The name used when dumping the token stream.
    pub const fn name(self) -> &'static str {
        use TokenKind::*;
        match self {
            Let => "LET",
            If => "IF",
            Then => "THEN",
            Else => "ELSE",
            End => "END",
            For => "FOR",
            While => "WHILE",
            In => "IN",
            Return => "RETURN",
            And => "AND",
            Or => "OR",
            Not => "NOT",
            LParen => "LPAREN",
            RParen => "RPAREN",
            Semicolon => "SEMICOLON",
            Comma => "COMMA",
            Colon => "COLON",
            Operator => "OPERATOR",
            Identifier => "IDENTIFIER",
            Number => "NUMBER",
            String => "STRING_LITERAL",
            Char => "CHAR_LITERAL",
            Eof => "EOF",
        }
    }

    /// How the kind reads in error messages.
    pub const fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Let => "`let`",
            If => "`if`",
            Then => "`then`",
            Else => "`else`",
            End => "`end`",
            For => "`for`",
            While => "`while`",
            In => "`in`",
            Return => "`return`",
            And => "`and`",
            Or => "`or`",
            Not => "`not`",
            LParen => "`(`",
            RParen => "`)`",
            Semicolon => "`;`",
            Comma => "`,`",
            Colon => "`:`",
            Operator => "operator",
            Identifier => "identifier",
            Number => "number",
            String => "string literal",
            Char => "character literal",
            Eof => "end of input",
        }
    }

    /// Whether a token of this kind may start a call argument (or, in
    /// statement position, an expression).
    pub const fn starts_argument(self) -> bool {
        matches!(
            self,
            TokenKind::Identifier
                | TokenKind::Number
                | TokenKind::String
                | TokenKind::Char
                | TokenKind::LParen
        )
    }
}

pub const OPERATOR_CHARS: &[char] = &['+', '-', '*', '/', '%', '^', '&', '!', '=', '|', '<', '>'];

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "let" => TokenKind::Let,
    "if" => TokenKind::If,
    "then" => TokenKind::Then,
    "else" => TokenKind::Else,
    "end" => TokenKind::End,
    "for" => TokenKind::For,
    "while" => TokenKind::While,
    "in" => TokenKind::In,
    "return" => TokenKind::Return,
    "and" => TokenKind::And,
    "or" => TokenKind::Or,
    "not" => TokenKind::Not,
};

pub static PUNCTUATION: phf::Map<char, TokenKind> = phf::phf_map! {
    '(' => TokenKind::LParen,
    ')' => TokenKind::RParen,
    ';' => TokenKind::Semicolon,
    ',' => TokenKind::Comma,
    ':' => TokenKind::Colon,
};
