use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use log::{debug, info};

use crate::{
    ast::Ast,
    backend::{Backend, Interpreter, Value},
    codegen::{self, ir::Module, FunctionTable, MAIN_FUNCTION},
    lexer, parser,
    token::Token,
    util::fmt::{ir::print_module, print_program, print_tokens},
    Result,
};

/// Diagnostic output shared by the drivers.
#[derive(Copy, Clone, Debug, Default)]
pub struct Options {
    /// Print the token stream and the syntax tree of every unit.
    pub verbose: bool,
    /// Print the IR of every generated module.
    pub emit_ir: bool,
}

impl Options {
    pub(crate) fn dump_tokens(&self, src: &str, tokens: &[Token]) -> io::Result<()> {
        if self.verbose {
            print_tokens(&mut io::stdout().lock(), src, tokens)?;
        }
        Ok(())
    }

    pub(crate) fn dump_program(&self, program: &[Ast]) -> io::Result<()> {
        if self.verbose {
            print_program(&mut io::stdout().lock(), program)?;
        }
        Ok(())
    }

    pub(crate) fn dump_module(&self, module: &Module) -> io::Result<()> {
        if self.emit_ir {
            let mut out = io::stdout().lock();
            print_module(&mut out, module)?;
            out.flush()?;
        }
        Ok(())
    }
}

/// Compiles and runs whole files, each one in a fresh process image.
#[derive(Default)]
pub struct Compiler {
    options: Options,
}

impl Compiler {
    pub fn new(options: Options) -> Compiler {
        Compiler { options }
    }

    pub fn compile_file(&self, path: &Path) -> Result<Option<Value>> {
        let src = fs::read_to_string(path).map_err(|source| crate::Error::Read {
            path: path.to_owned(),
            source,
        })?;
        if self.options.verbose {
            println!("File: {}", path.display());
            println!("contents:\n{src}");
        }
        self.compile_source(&path.display().to_string(), &src)
    }

    /// Runs the unit's top-level statements, returning the value of the last
    /// one (if there are any).
    pub fn compile_source(&self, name: &str, src: &str) -> Result<Option<Value>> {
        info!("compiling `{name}`");
        let tokens = lexer::lex_in_new(src)?;
        self.options.dump_tokens(src, &tokens)?;
        let program = parser::parse(src, &tokens)?;
        self.options.dump_program(&program)?;

        let mut functions = FunctionTable::default();
        let module = codegen::generate_unit(name, &program, &mut functions)?;
        self.options.dump_module(&module)?;
        let has_main = module.function(MAIN_FUNCTION).is_some();

        let mut interp = Interpreter::new();
        interp.link(module)?;
        if !has_main {
            debug!("`{name}` has no top-level statements");
            return Ok(None);
        }
        let value = interp.call(MAIN_FUNCTION, &[])?;
        debug!("`{name}` evaluated to {value}");
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::ExecError, codegen::Error as CodegenError, Error};

    #[test]
    fn test_compile_source() {
        let compiler = Compiler::default();
        let src = "
            let square x = x * x; end
            let n = square 3;
            n + 1;
        ";
        let value = compiler.compile_source("test", src).unwrap();
        assert_eq!(value, Some(Value::Number(10.0)));
    }

    #[test]
    fn test_calls_see_definitions_in_order() {
        let compiler = Compiler::default();
        let src = "let f x = x; end let a = f 1; let f x = x + 1; end a;";
        assert_eq!(compiler.compile_source("test", src).unwrap(), Some(Value::Number(1.0)));

        let src = "let f x = x; end let a = f 1; let f x = x + 1; end a + f 1;";
        assert_eq!(compiler.compile_source("test", src).unwrap(), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_definitions_only() {
        let compiler = Compiler::default();
        let value = compiler.compile_source("test", "let f () = 1; end").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_errors_abort_unit() {
        let compiler = Compiler::default();
        let error = compiler.compile_source("test", "f 1;").unwrap_err();
        assert!(matches!(
            error,
            Error::Codegen(CodegenError::UnknownFunction(ref name)) if &**name == "f"
        ));

        let error = compiler
            .compile_source("test", "let f x = f x; end f 1;")
            .unwrap_err();
        assert!(matches!(error, Error::Exec(ExecError::StackOverflow(_))));

        let error = compiler.compile_source("test", "let x = 1").unwrap_err();
        assert_eq!(error.to_string(), "9..9: expected `;`, but got end of input");
    }

    #[test]
    fn test_missing_file() {
        let compiler = Compiler::default();
        let error = compiler
            .compile_file(Path::new("definitely/not/here.ellis"))
            .unwrap_err();
        assert!(matches!(error, Error::Read { .. }));
        assert!(error.to_string().starts_with("failed to read `definitely/not/here.ellis`"));
    }
}
