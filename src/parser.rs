use crate::{
    ast::{Ast, BinaryOperator, Function, Prototype},
    lexer,
    token::{Spanned, Token, TokenKind},
};

pub type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Parses an already lexed token sequence into the top-level statements of a
/// compilation unit.
pub fn parse(src: &str, tokens: &[Token]) -> Result<Vec<Ast>> {
    Parser::new(src, tokens).parse_program()
}

/// Lexes and parses the provided source.
pub fn parse_str(src: &str) -> crate::Result<Vec<Ast>> {
    let tokens = lexer::lex_in_new(src)?;
    Ok(parse(src, &tokens)?)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected {}, but got {}", .expected.describe(), .actual.describe())]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    #[error("expected {expected}, but got {}", .actual.describe())]
    UnexpectedAny {
        actual: TokenKind,
        expected: &'static str,
    },
    #[error("unexpected {}", .0.describe())]
    UnexpectedToken(TokenKind),
    #[error("unknown operator `{0}`")]
    UnknownOperator(Box<str>),
    #[error("invalid number literal `{0}`")]
    InvalidNumber(Box<str>),
    #[error("invalid character literal `{0}`")]
    InvalidChar(Box<str>),
    #[error("return outside of a function body")]
    ReturnOutsideFunction,
    #[error("unexpected end of function definition")]
    UnexpectedEndOfFunction,
}

struct Parser<'src, 'tok> {
    src: &'src str,
    tokens: &'tok [Token],
    cursor: usize,
}

impl Parser<'_, '_> {
    fn parse_program(&mut self) -> Result<Vec<Ast>> {
        let mut program = Vec::new();
        while !self.is(TokenKind::Eof) {
            program.push(self.parse_statement(false)?);
        }
        Ok(program)
    }

    /// Dispatches on the first token of a statement. `return` is only legal
    /// inside a body.
    fn parse_statement(&mut self, in_body: bool) -> Result<Ast> {
        let token = self.peek();
        match token.kind {
            TokenKind::Let => self.parse_let(),
            TokenKind::If => self.parse_if(in_body),
            TokenKind::Identifier if self.peek_nth(1).is_operator(self.src, "=") => {
                self.parse_reassignment()
            }
            TokenKind::Return if in_body => self.parse_return(),
            TokenKind::Return => Err(token.span().wrap(Error::ReturnOutsideFunction)),
            kind if kind.starts_argument() => self.parse_expression(TokenKind::Semicolon),
            kind => Err(token.span().wrap(Error::UnexpectedToken(kind))),
        }
    }

    fn parse_let(&mut self) -> Result<Ast> {
        self.consume(TokenKind::Let)?;
        let name = self.parse_ident()?;

        let next = self.peek();
        match next.kind {
            // Variable binding: let x = expr;
            TokenKind::Operator if next.is_operator(self.src, "=") => {
                self.advance();
                let value = self.parse_expression(TokenKind::Semicolon)?;
                Ok(Ast::Let {
                    name,
                    value: Box::new(value),
                })
            }
            // Function definition: let f x y = body end
            TokenKind::Identifier => {
                let mut params = Vec::new();
                while self.is(TokenKind::Identifier) {
                    params.push(self.parse_ident()?);
                }
                self.consume_operator("=")?;
                self.parse_function(Prototype { name, params })
            }
            // Zero-argument function definition: let f () = body end
            TokenKind::LParen => {
                self.advance();
                self.consume(TokenKind::RParen)?;
                self.consume_operator("=")?;
                let params = Vec::new();
                self.parse_function(Prototype { name, params })
            }
            actual => Err(next.span().wrap(Error::UnexpectedAny {
                actual,
                expected: "`=`, a parameter name or `()`",
            })),
        }
    }

    fn parse_function(&mut self, proto: Prototype) -> Result<Ast> {
        let body = self.parse_body(true)?;
        self.consume(TokenKind::End)?;
        Ok(Ast::Function(Function {
            proto: Box::new(proto),
            body,
        }))
    }

    fn parse_if(&mut self, in_body: bool) -> Result<Ast> {
        self.consume(TokenKind::If)?;
        let cond = self.parse_expression(TokenKind::Then)?;
        let then_body = self.parse_body(in_body)?;
        let else_body = if self.take(TokenKind::Else) {
            self.parse_body(in_body)?
        } else {
            Vec::new()
        };
        self.consume(TokenKind::End)?;
        Ok(Ast::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    /// Parses statements up to `end` or `else`. Does **NOT** consume the
    /// terminator. `return` is accepted when inside a function.
    fn parse_body(&mut self, in_function: bool) -> Result<Vec<Ast>> {
        let mut body = Vec::new();
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::End | TokenKind::Else => return Ok(body),
                TokenKind::Eof => return Err(token.span().wrap(Error::UnexpectedEndOfFunction)),
                _ => body.push(self.parse_statement(in_function)?),
            }
        }
    }

    fn parse_return(&mut self) -> Result<Ast> {
        self.consume(TokenKind::Return)?;
        if self.take(TokenKind::Semicolon) {
            return Ok(Ast::Return(None));
        }
        let value = self.parse_expression(TokenKind::Semicolon)?;
        Ok(Ast::Return(Some(Box::new(value))))
    }

    /// Parses `ID = expr;`.
    fn parse_reassignment(&mut self) -> Result<Ast> {
        let target = self.parse_ident()?;
        self.consume_operator("=")?;
        let value = self.parse_expression(TokenKind::Semicolon)?;
        Ok(Ast::binary(
            BinaryOperator::Assign,
            Ast::Variable(target),
            value,
        ))
    }

    /// Parses a primary expression, folds any trailing binary operators into
    /// it, and consumes the `terminator`.
    fn parse_expression(&mut self, terminator: TokenKind) -> Result<Ast> {
        let lhs = self.parse_primary()?;
        let expr = self.parse_bin_op_rhs(0, lhs)?;
        self.consume(terminator)?;
        Ok(expr)
    }

    /// Precedence climbing. Folds operators binding at least as tight as
    /// `min_prec` into `lhs`; a strictly tighter trailing operator gets the
    /// right operand first.
    fn parse_bin_op_rhs(&mut self, min_prec: u8, mut lhs: Ast) -> Result<Ast> {
        loop {
            let Some((op, prec)) = self.peek_binary_operator()? else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            self.advance(); // Operator

            let mut rhs = self.parse_primary()?;
            if let Some((_, next_prec)) = self.peek_binary_operator()? {
                if next_prec > prec {
                    rhs = self.parse_bin_op_rhs(prec + 1, rhs)?;
                }
            }
            lhs = Ast::binary(op, lhs, rhs);
        }
    }

    /// Returns the binary operator at the cursor (with its precedence), if the
    /// current token is an operator.
    fn peek_binary_operator(&self) -> Result<Option<(BinaryOperator, u8)>> {
        let token = self.peek();
        if token.kind != TokenKind::Operator {
            return Ok(None);
        }
        let text = token.text(self.src);
        BinaryOperator::from_symbol(text)
            .and_then(|op| op.precedence().map(|prec| (op, prec)))
            .map(Some)
            .ok_or_else(|| token.span().wrap(Error::UnknownOperator(text.into())))
    }

    fn parse_primary(&mut self) -> Result<Ast> {
        let token = self.peek();
        match token.kind {
            TokenKind::Identifier => self.parse_identifier_expr(),
            TokenKind::Number | TokenKind::Char | TokenKind::String => self.parse_literal(),
            TokenKind::LParen => self.parse_paren_expr(),
            kind => Err(token.span().wrap(Error::UnexpectedToken(kind))),
        }
    }

    /// An identifier followed by something that can start an argument is a
    /// call; otherwise it is a variable reference (possibly the head of a
    /// binary expression, which the caller folds).
    fn parse_identifier_expr(&mut self) -> Result<Ast> {
        let name = self.parse_ident()?;
        if !self.peek().kind.starts_argument() {
            return Ok(Ast::Variable(name));
        }

        let mut args = Vec::new();
        while self.peek().kind.starts_argument() {
            args.push(self.parse_argument()?);
        }
        // `f ()` calls a nullary function.
        if matches!(args.as_slice(), [Ast::Unit]) {
            args.clear();
        }
        Ok(Ast::Call { callee: name, args })
    }

    fn parse_argument(&mut self) -> Result<Ast> {
        let token = self.peek();
        match token.kind {
            TokenKind::Identifier => Ok(Ast::Variable(self.parse_ident()?)),
            TokenKind::Number | TokenKind::Char | TokenKind::String => self.parse_literal(),
            TokenKind::LParen => self.parse_paren_expr(),
            kind => Err(token.span().wrap(Error::UnexpectedToken(kind))),
        }
    }

    /// Parses `()` as the unit literal, or `( expr )`.
    fn parse_paren_expr(&mut self) -> Result<Ast> {
        self.consume(TokenKind::LParen)?;
        if self.take(TokenKind::RParen) {
            return Ok(Ast::Unit);
        }
        self.parse_expression(TokenKind::RParen)
    }

    fn parse_literal(&mut self) -> Result<Ast> {
        let token = self.advance();
        let text = token.text(self.src);
        match token.kind {
            TokenKind::Number => text
                .parse()
                .map(Ast::Number)
                .map_err(|_| token.span().wrap(Error::InvalidNumber(text.into()))),
            TokenKind::Char => decode_char(text)
                .map(Ast::Char)
                .ok_or_else(|| token.span().wrap(Error::InvalidChar(text.into()))),
            TokenKind::String => Ok(Ast::String(text.into())),
            kind => Err(token.span().wrap(Error::UnexpectedToken(kind))),
        }
    }

    fn parse_ident(&mut self) -> Result<Box<str>> {
        let token = self.consume(TokenKind::Identifier)?;
        Ok(token.text(self.src).into())
    }
}

impl Parser<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok [Token]) -> Parser<'src, 'tok> {
        Parser {
            src,
            tokens,
            cursor: 0,
        }
    }

    /// Returns the current token, or the end-of-input token once the sequence
    /// is exhausted.
    #[inline]
    fn peek(&self) -> Token {
        self.peek_nth(0)
    }

    /// Returns the token `n` positions ahead of the cursor.
    fn peek_nth(&self, n: usize) -> Token {
        match self.tokens.get(self.cursor + n) {
            Some(token) => *token,
            None => Token::eof_for(self.src),
        }
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if !c.is_eof() {
            self.cursor += 1;
        }
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not,
    /// returns an error.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        let c = self.peek();
        if self.is(expect) {
            self.advance();
            Ok(c)
        } else {
            Err(c.span().wrap(Error::Unexpected {
                actual: c.kind,
                expected: expect,
            }))
        }
    }

    /// Advances if the current token is the operator `text`.
    fn consume_operator(&mut self, text: &'static str) -> Result<Token> {
        let c = self.peek();
        if c.is_operator(self.src, text) {
            self.advance();
            Ok(c)
        } else {
            let expected = if text == "=" { "`=`" } else { "operator" };
            Err(c.span().wrap(Error::UnexpectedAny {
                actual: c.kind,
                expected,
            }))
        }
    }
}

/// Decodes the (verbatim) text of a character literal into its value.
fn decode_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    let c = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other => other,
        },
        c => c,
    };
    chars.next().is_none().then_some(c)
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use parser;

        fn test_variable_binding() {
            let program = "let x = 1;";
            let tree_ok = "
                let x
                  number 1
            ";
        }

        fn test_precedence_mul_in_add_rhs() {
            let program = "1 + 2 * 3;";
            let tree_ok = "
                binary +
                  number 1
                  binary *
                    number 2
                    number 3
            ";
        }

        fn test_precedence_mul_then_add() {
            let program = "1 * 2 + 3;";
            let tree_ok = "
                binary +
                  binary *
                    number 1
                    number 2
                  number 3
            ";
        }

        fn test_left_associativity() {
            let program = "8 - 4 - 2;";
            let tree_ok = "
                binary -
                  binary -
                    number 8
                    number 4
                  number 2
            ";
        }

        fn test_precedence_full_table() {
            let program = "a < b + c * d ^ e;";
            let tree_ok = "
                binary <
                  variable a
                  binary +
                    variable b
                    binary *
                      variable c
                      binary ^
                        variable d
                        variable e
            ";
        }

        fn test_tighter_operator_after_return_to_caller() {
            let program = "1 + 2 * 3 + 4;";
            let tree_ok = "
                binary +
                  binary +
                    number 1
                    binary *
                      number 2
                      number 3
                  number 4
            ";
        }

        fn test_parenthesized_expression() {
            let program = "(x * y + 2);";
            let tree_ok = "
                binary +
                  binary *
                    variable x
                    variable y
                  number 2
            ";
        }

        fn test_parens_override_precedence() {
            let program = "(1 + 2) * 3;";
            let tree_ok = "
                binary *
                  binary +
                    number 1
                    number 2
                  number 3
            ";
        }

        fn test_literals() {
            let program = r#"
                1.5;
                'a';
                '\n';
                "hello\tworld";
                ();
            "#;
            let tree_ok = r#"
                number 1.5
                char 'a'
                char '\n'
                string "hello\tworld"
                unit
            "#;
        }

        fn test_bare_variable() {
            let program = "x;";
            let tree_ok = "variable x";
        }

        fn test_reassignment() {
            let program = "x = x + 1;";
            let tree_ok = "
                binary =
                  variable x
                  binary +
                    variable x
                    number 1
            ";
        }

        fn test_call_with_arguments() {
            let program = r#"f x 2 'c' "s" (y + 1);"#;
            let tree_ok = r#"
                call f
                  variable x
                  number 2
                  char 'c'
                  string "s"
                  binary +
                    variable y
                    number 1
            "#;
        }

        fn test_call_in_binary_expression() {
            let program = "f 1 + g 2 * 3;";
            let tree_ok = "
                binary +
                  call f
                    number 1
                  binary *
                    call g
                      number 2
                    number 3
            ";
        }

        fn test_nullary_call() {
            let program = "g ();";
            let tree_ok = "call g";
        }

        fn test_function_definition() {
            let program = "
                let add x y =
                    x + y;
                end
            ";
            let tree_ok = "
                function add(x, y)
                  binary +
                    variable x
                    variable y
            ";
        }

        fn test_zero_argument_function() {
            let program = "let answer () = 42; end";
            let tree_ok = "
                function answer()
                  number 42
            ";
        }

        fn test_function_with_locals_and_return() {
            let program = "
                let f x =
                    let y = x * 2;
                    y = y + 1;
                    return y;
                end
            ";
            let tree_ok = "
                function f(x)
                  let y
                    binary *
                      variable x
                      number 2
                  binary =
                    variable y
                    binary +
                      variable y
                      number 1
                  return
                    variable y
            ";
        }

        fn test_valueless_return() {
            let program = "let f () = return; end";
            let tree_ok = "
                function f()
                  return
            ";
        }

        fn test_if_without_else() {
            let program = "if x < 1 then y; end";
            let tree_ok = "
                if
                  binary <
                    variable x
                    number 1
                  then
                    variable y
            ";
        }

        fn test_if_with_else_in_function() {
            let program = "
                let max a b =
                    if a > b then
                        return a;
                    else
                        b;
                    end
                end
            ";
            let tree_ok = "
                function max(a, b)
                  if
                    binary >
                      variable a
                      variable b
                    then
                      return
                        variable a
                    else
                      variable b
            ";
        }

        fn test_multiple_statements() {
            let program = "
                let sq x = x * x; end
                let n = sq 3;
                n;
            ";
            let tree_ok = "
                function sq(x)
                  binary *
                    variable x
                    variable x
                let n
                  call sq
                    number 3
                variable n
            ";
        }

        fn test_comments_are_ignored() {
            let program = "
                # a comment
                1; # trailing
            ";
            let tree_ok = "number 1";
        }

        fn test_empty_program() {
            let program = "";
            let tree_ok = "";
        }

        fn test_error_return_at_top_level() {
            let program = "return 1;";
            let expected_errors = &["0..6: return outside of a function body"];
        }

        fn test_error_missing_end() {
            let program = "let f x = x;";
            let expected_errors = &["12..12: unexpected end of function definition"];
        }

        fn test_error_missing_rparen() {
            let program = "(1 + 2";
            let expected_errors = &["6..6: expected `)`, but got end of input"];
        }

        fn test_error_missing_semicolon() {
            let program = "let x = 1";
            let expected_errors = &["9..9: expected `;`, but got end of input"];
        }

        fn test_error_missing_then() {
            let program = "if 1 2; end";
            let expected_errors = &["5..6: expected `then`, but got number"];
        }

        fn test_error_else_without_end() {
            let program = "if x then 1; else 2; else 3; end";
            let expected_errors = &["21..25: expected `end`, but got `else`"];
        }

        fn test_error_malformed_let() {
            let program = "let x 1;";
            let expected_errors = &["6..7: expected `=`, a parameter name or `()`, but got number"];
        }

        fn test_error_let_without_name() {
            let program = "let = 1;";
            let expected_errors = &["4..5: expected identifier, but got operator"];
        }

        fn test_error_function_without_equals() {
            let program = "let f x; end";
            let expected_errors = &["7..8: expected `=`, but got `;`"];
        }

        fn test_error_unknown_operator() {
            let program = "x == 1;";
            let expected_errors = &["2..4: unknown operator `==`"];
        }

        fn test_error_return_in_top_level_if() {
            let program = "if 1 then return 2; end";
            let expected_errors = &["10..16: return outside of a function body"];
        }

        fn test_error_unexpected_leading_token() {
            let program = "end";
            let expected_errors = &["0..3: unexpected `end`"];
        }

        fn test_error_dangling_operator() {
            let program = "1 + ;";
            let expected_errors = &["4..5: unexpected `;`"];
        }

        fn test_error_invalid_number() {
            let program = "1.2.3;";
            let expected_errors = &["0..5: invalid number literal `1.2.3`"];
        }

        fn test_error_unterminated_string() {
            let program = "\"abc";
            let expected_errors = &["0..4: unterminated literal"];
        }
    );
}
