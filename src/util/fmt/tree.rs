use std::io::Write;

use crate::ast::{Ast, Function, Prototype};

const INDENT_WIDTH: usize = 2;

pub fn print_program_string(program: &[Ast]) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).expect("writing to a Vec never fails");
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn print_program(w: &mut impl Write, program: &[Ast]) -> std::io::Result<()> {
    for ast in program {
        print_ast(w, 0, ast)?;
    }
    Ok(())
}

pub fn print_ast(w: &mut impl Write, i: usize, ast: &Ast) -> std::io::Result<()> {
    sp(w, i)?;
    match ast {
        Ast::Number(val) => writeln!(w, "number {val}")?,
        Ast::Char(val) => writeln!(w, "char {val:?}")?,
        Ast::String(val) => writeln!(w, "string \"{val}\"")?,
        Ast::Unit => writeln!(w, "unit")?,
        Ast::Variable(name) => writeln!(w, "variable {name}")?,
        Ast::Let { name, value } => {
            writeln!(w, "let {name}")?;
            print_ast(w, i + 1, value)?;
        }
        Ast::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {op}")?;
            print_ast(w, i + 1, lhs)?;
            print_ast(w, i + 1, rhs)?;
        }
        Ast::Call { callee, args } => {
            writeln!(w, "call {callee}")?;
            for arg in args {
                print_ast(w, i + 1, arg)?;
            }
        }
        Ast::Prototype(proto) => {
            write!(w, "prototype ")?;
            print_prototype(w, proto)?;
        }
        Ast::Function(Function { proto, body }) => {
            write!(w, "function ")?;
            print_prototype(w, proto)?;
            print_body(w, i + 1, body)?;
        }
        Ast::Return(value) => {
            writeln!(w, "return")?;
            if let Some(value) = value {
                print_ast(w, i + 1, value)?;
            }
        }
        Ast::If {
            cond,
            then_body,
            else_body,
        } => {
            writeln!(w, "if")?;
            print_ast(w, i + 1, cond)?;
            sp(w, i + 1)?;
            writeln!(w, "then")?;
            print_body(w, i + 2, then_body)?;
            if !else_body.is_empty() {
                sp(w, i + 1)?;
                writeln!(w, "else")?;
                print_body(w, i + 2, else_body)?;
            }
        }
    }
    Ok(())
}

fn print_prototype(w: &mut impl Write, proto: &Prototype) -> std::io::Result<()> {
    write!(w, "{}(", proto.name)?;
    for (idx, param) in proto.params.iter().enumerate() {
        if idx > 0 {
            write!(w, ", ")?;
        }
        write!(w, "{param}")?;
    }
    writeln!(w, ")")
}

fn print_body(w: &mut impl Write, i: usize, body: &[Ast]) -> std::io::Result<()> {
    for item in body {
        print_ast(w, i, item)?;
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
