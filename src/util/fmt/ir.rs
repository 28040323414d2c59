use std::io::Write;

use crate::codegen::ir::{Function, Module};

const INDENT: &str = "  ";

pub fn print_module_string(module: &Module) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_module(&mut buf, module).expect("writing to a Vec never fails");
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn print_module(w: &mut impl Write, module: &Module) -> std::io::Result<()> {
    writeln!(w, "module {}", module.name)?;
    for global in &module.globals {
        writeln!(w, "global @{} = {}", global.name, global.init)?;
    }
    for declaration in &module.declarations {
        writeln!(w, "declare {}/{}", declaration.name, declaration.arity)?;
    }
    for function in &module.functions {
        print_function(w, function)?;
    }
    Ok(())
}

pub fn print_function(w: &mut impl Write, function: &Function) -> std::io::Result<()> {
    writeln!(w, "function {}({}) {{", function.name, function.params.join(", "))?;
    for (id, block) in function.blocks.iter().enumerate() {
        writeln!(w, "{INDENT}bb{id} {}:", block.label)?;
        for inst in &block.insts {
            writeln!(w, "{INDENT}{INDENT}{inst}")?;
        }
        if let Some(terminator) = &block.terminator {
            writeln!(w, "{INDENT}{INDENT}{terminator}")?;
        }
    }
    writeln!(w, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{generate_unit, FunctionTable, Signature};
    use crate::parser::parse_str;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_declarations() {
        let mut functions = FunctionTable::default();
        functions.insert("ext", Signature::new("ext", 1));
        let program = parse_str("ext 1;").unwrap();
        let module = generate_unit("m", &program, &mut functions).unwrap();
        let expected = indoc! {"
            module m
            declare ext/1
            function __main() {
              bb0 entry:
                %0 = call ext(1.0)
                ret %0
            }
        "};
        assert_eq!(print_module_string(&module), expected);
    }
}
