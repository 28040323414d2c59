use crate::{
    ast::Ast,
    codegen::{
        env::FunctionTable,
        generator::CodeGenerator,
        ir::{Constant, Module, Operand},
        Result,
    },
};

/// The wrapper around the top-level statements of a batch-compiled file.
pub const MAIN_FUNCTION: &str = "__main";

/// The wrapper around the statements of one interactive input.
pub const ANON_FUNCTION: &str = "__anon_expr";

/// Describes one compilation unit.
#[derive(Copy, Clone)]
pub struct Unit<'a> {
    pub name: &'a str,
    /// Name of the function synthesized around top-level statements.
    pub wrapper: &'a str,
    /// Variables that already exist when the unit starts, with their current
    /// values.
    pub globals: &'a [(Box<str>, Constant)],
}

impl<'a> Unit<'a> {
    pub fn new(name: &'a str, wrapper: &'a str) -> Unit<'a> {
        Unit {
            name,
            wrapper,
            globals: &[],
        }
    }

    pub fn with_globals(self, globals: &'a [(Box<str>, Constant)]) -> Unit<'a> {
        Unit { globals, ..self }
    }
}

/// Generates a module for a whole file. Top-level statements go, in order,
/// into [`MAIN_FUNCTION`].
pub fn generate_unit(name: &str, program: &[Ast], functions: &mut FunctionTable) -> Result<Module> {
    generate(Unit::new(name, MAIN_FUNCTION), program, functions)
}

/// Generates the module for `unit`, in source order. Function definitions
/// become module functions; every other statement is emitted into the
/// wrapper, which returns the value of the last one. No wrapper is generated
/// if there are no such statements.
///
/// On error, `functions` is left as it was before the failing definition, but
/// may contain the definitions that preceded it.
pub fn generate(unit: Unit<'_>, program: &[Ast], functions: &mut FunctionTable) -> Result<Module> {
    let mut generator = CodeGenerator::new(unit.name, functions);
    let mut result = Operand::UNIT;
    for ast in program {
        if ast.is_definition() {
            generator.emit(ast)?;
            continue;
        }
        if !generator.in_function() {
            generator.begin_wrapper(unit.wrapper, unit.globals);
        }
        result = generator.emit(ast)?;
    }
    generator.finish(result)
}
