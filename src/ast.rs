// program   ::= statement*
// statement ::= let ID '=' expr ';'
//             | let ID ID+ '=' body end
//             | let ID '(' ')' '=' body end
//             | ID '=' expr ';'
//             | if expr then body [else body] end
//             | expr ';'
// body      ::= (statement | return [expr] ';')*
// expr      ::= primary (OP primary)*
// primary   ::= NUMBER | CHAR | STRING | '(' ')' | '(' expr ')'
//             | ID arg*
// arg       ::= NUMBER | CHAR | STRING | ID | '(' ')' | '(' expr ')'

// Precedence (tightest first)
//
// ^
// * /
// + -
// < >

use std::fmt;

/// A node of the syntax tree. Every composite node exclusively owns its
/// children.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    Char(char),
    /// The raw contents of the literal; escapes are kept verbatim.
    String(Box<str>),
    /// The value of `()`.
    Unit,
    Variable(Box<str>),
    Let {
        name: Box<str>,
        value: Box<Ast>,
    },
    /// Also represents reassignment, with [`BinaryOperator::Assign`] and a
    /// [`Ast::Variable`] on the left.
    Binary {
        op: BinaryOperator,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Call {
        callee: Box<str>,
        args: Vec<Ast>,
    },
    Prototype(Prototype),
    Function(Function),
    Return(Option<Box<Ast>>),
    If {
        cond: Box<Ast>,
        then_body: Vec<Ast>,
        else_body: Vec<Ast>,
    },
}

impl Ast {
    pub fn variable(name: impl Into<Box<str>>) -> Ast {
        Ast::Variable(name.into())
    }

    pub fn binary(op: BinaryOperator, lhs: Ast, rhs: Ast) -> Ast {
        Ast::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Whether the node is a definition that lives at module level rather than
    /// inside some function body.
    pub fn is_definition(&self) -> bool {
        matches!(self, Ast::Function(_) | Ast::Prototype(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: Box<str>,
    pub params: Vec<Box<str>>,
}

impl Prototype {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Box<Prototype>,
    pub body: Vec<Ast>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `=`
    Assign,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<BinaryOperator> {
        use BinaryOperator::*;
        let op = match symbol {
            "=" => Assign,
            "<" => Less,
            ">" => Greater,
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "^" => Pow,
            _ => return None,
        };
        Some(op)
    }

    pub const fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Assign => "=",
            Less => "<",
            Greater => ">",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Pow => "^",
        }
    }

    /// Binding power used by precedence climbing. Higher binds tighter; all
    /// operators are left-associative. Assignment is a statement form and
    /// never takes part in climbing.
    pub const fn precedence(self) -> Option<u8> {
        use BinaryOperator::*;
        match self {
            Less | Greater => Some(10),
            Add | Sub => Some(20),
            Mul | Div => Some(40),
            Pow => Some(60),
            Assign => None,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
