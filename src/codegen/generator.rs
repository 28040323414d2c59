use log::trace;

use crate::{
    ast::{Ast, BinaryOperator, Function},
    codegen::{
        builder::FunctionBuilder,
        env::{Environment, FunctionTable, Signature},
        ir::{self, BinaryOp, CmpOp, Constant, Global, Module, Operand, Place},
        Error, Result,
    },
};

/// Lowers syntax trees into a single IR [`Module`].
///
/// The function table is borrowed from the caller so that it can outlive the
/// module: a session keeps one table across every unit it generates.
pub struct CodeGenerator<'f> {
    module: Module,
    functions: &'f mut FunctionTable,
    current: Option<FunctionState>,
}

struct FunctionState {
    builder: FunctionBuilder,
    env: Environment,
    /// The synthesized top-level wrapper keeps its variables in module
    /// globals, so that they can be read back once it runs.
    is_wrapper: bool,
}

impl<'f> CodeGenerator<'f> {
    pub fn new(module_name: &str, functions: &'f mut FunctionTable) -> CodeGenerator<'f> {
        CodeGenerator {
            module: Module::new(module_name),
            functions,
            current: None,
        }
    }

    /// Whether some function (possibly the wrapper) is open for emission.
    pub fn in_function(&self) -> bool {
        self.current.is_some()
    }

    /// Opens the top-level wrapper function. Each of `globals` becomes a
    /// module global with the given initial value, visible to the wrapper as
    /// a variable.
    pub fn begin_wrapper(&mut self, name: &str, globals: &[(Box<str>, Constant)]) {
        debug_assert!(self.current.is_none(), "wrapper opened inside a function");
        let mut env = Environment::default();
        for (global, init) in globals {
            self.module.globals.push(Global {
                name: global.clone(),
                init: *init,
            });
            env.bind(global, Place::Global(global.clone()));
        }
        self.current = Some(FunctionState {
            builder: FunctionBuilder::new(name, Vec::new()),
            env,
            is_wrapper: true,
        });
    }

    /// Closes the wrapper (if one was opened), returning `result` from it,
    /// and hands back the verified module.
    pub fn finish(mut self, result: Operand) -> Result<Module> {
        if let Some(mut state) = self.current.take() {
            if !state.builder.is_terminated() {
                state.builder.ret(Some(result));
            }
            self.module.define(state.builder.finish());
        }
        self.module.verify()?;
        Ok(self.module)
    }

    pub fn emit(&mut self, ast: &Ast) -> Result<Operand> {
        match ast {
            Ast::Number(val) => Ok(Operand::number(*val)),
            Ast::Char(val) => Ok(Operand::number(f64::from(u32::from(*val)))),
            Ast::String(_) => Err(Error::UnsupportedLiteral("string")),
            Ast::Unit => Ok(Operand::UNIT),
            Ast::Variable(name) => {
                let state = self.state()?;
                let place = state
                    .env
                    .lookup(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
                Ok(state.builder.load(place))
            }
            Ast::Let { name, value } => self.emit_let(name, value),
            Ast::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
            Ast::Call { callee, args } => self.emit_call(callee, args),
            Ast::Prototype(proto) => {
                let signature = Signature::new(proto.name.clone(), proto.arity());
                self.module.declare(&signature.symbol, signature.arity);
                self.functions.insert(&proto.name, signature);
                Ok(Operand::UNIT)
            }
            Ast::Function(function) => self.emit_function(function),
            Ast::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.emit(value)?),
                    None => None,
                };
                let builder = &mut self.state()?.builder;
                builder.ret(value);
                // Anything after the return is unreachable, but still needs
                // somewhere to go.
                let dead = builder.create_block("dead");
                builder.switch_to_block(dead);
                Ok(Operand::UNIT)
            }
            Ast::If {
                cond,
                then_body,
                else_body,
            } => self.emit_if(cond, then_body, else_body),
        }
    }

    fn emit_let(&mut self, name: &str, value: &Ast) -> Result<Operand> {
        let value = self.emit(value)?;
        let state = self.current.as_mut().ok_or(Error::NoEnclosingFunction)?;
        if state.env.contains(name) {
            return Err(Error::RedeclaredVariable(name.into()));
        }

        let place = if state.is_wrapper {
            self.module.globals.push(Global {
                name: name.into(),
                init: Constant::Unit,
            });
            Place::Global(name.into())
        } else {
            state.builder.alloca_in_entry(name)
        };
        state.builder.store(place.clone(), value.clone());
        state.env.bind(name, place);
        Ok(value)
    }

    fn emit_binary(&mut self, op: BinaryOperator, lhs: &Ast, rhs: &Ast) -> Result<Operand> {
        if op == BinaryOperator::Assign {
            let Ast::Variable(target) = lhs else {
                return Err(Error::InvalidAssignmentTarget);
            };
            let place = self
                .state()?
                .env
                .lookup(target)
                .cloned()
                .ok_or_else(|| Error::UnknownVariable(target.clone()))?;
            let value = self.emit(rhs)?;
            self.state()?.builder.store(place, value.clone());
            return Ok(value);
        }

        let lhs = self.emit(lhs)?;
        let rhs = self.emit(rhs)?;
        let builder = &mut self.state()?.builder;
        let value = match op {
            BinaryOperator::Add => builder.binary(BinaryOp::FAdd, lhs, rhs),
            BinaryOperator::Sub => builder.binary(BinaryOp::FSub, lhs, rhs),
            BinaryOperator::Mul => builder.binary(BinaryOp::FMul, lhs, rhs),
            BinaryOperator::Div => builder.binary(BinaryOp::FDiv, lhs, rhs),
            BinaryOperator::Less => {
                let cmp = builder.cmp(CmpOp::Lt, lhs, rhs);
                builder.widen(cmp)
            }
            BinaryOperator::Greater => {
                let cmp = builder.cmp(CmpOp::Gt, lhs, rhs);
                builder.widen(cmp)
            }
            BinaryOperator::Pow | BinaryOperator::Assign => {
                return Err(Error::UnsupportedOperator(op));
            }
        };
        Ok(value)
    }

    fn emit_call(&mut self, callee: &str, args: &[Ast]) -> Result<Operand> {
        let signature = self
            .functions
            .get(callee)
            .cloned()
            .ok_or_else(|| Error::UnknownFunction(callee.into()))?;
        if signature.arity != args.len() {
            return Err(Error::ArityMismatch {
                callee: callee.into(),
                expected: signature.arity,
                actual: args.len(),
            });
        }

        let args = args
            .iter()
            .map(|arg| self.emit(arg))
            .collect::<Result<Vec<_>>>()?;
        self.module.declare(&signature.symbol, signature.arity);
        Ok(self.state()?.builder.call(&signature.symbol, args))
    }

    /// The function is registered before its body is generated, so that it
    /// may call itself. If generation fails the previous registration (if
    /// any) is put back.
    fn emit_function(&mut self, function: &Function) -> Result<Operand> {
        let proto = &function.proto;
        let symbol = self.functions.next_symbol(&proto.name);
        trace!("generating function `{}` as `{symbol}`", proto.name);
        let signature = Signature::new(symbol.clone(), proto.arity());
        let previous = self.functions.insert(&proto.name, signature);

        let enclosing = self.current.take();
        let result = self.emit_function_body(symbol, function);
        self.current = enclosing;

        match result {
            Ok(function) => {
                self.module.define(function);
                Ok(Operand::UNIT)
            }
            Err(error) => {
                self.functions.restore(&proto.name, previous);
                Err(error)
            }
        }
    }

    fn emit_function_body(&mut self, symbol: Box<str>, function: &Function) -> Result<ir::Function> {
        let proto = &function.proto;
        let mut state = FunctionState {
            builder: FunctionBuilder::new(symbol, proto.params.clone()),
            env: Environment::default(),
            is_wrapper: false,
        };
        for (index, param) in proto.params.iter().enumerate() {
            if state.env.contains(param) {
                return Err(Error::RedeclaredVariable(param.clone()));
            }
            let place = state.builder.alloca_in_entry(param);
            let value = state.builder.param(index);
            state.builder.store(place.clone(), value);
            state.env.bind(param, place);
        }

        self.current = Some(state);
        let last = self.emit_body(&function.body)?;
        let mut state = self.current.take().ok_or(Error::NoEnclosingFunction)?;
        if !state.builder.is_terminated() {
            state.builder.ret(Some(last));
        }
        Ok(state.builder.finish())
    }

    /// Both branches store their trailing value into a slot which the merge
    /// block reads back as the value of the whole `if`.
    fn emit_if(&mut self, cond: &Ast, then_body: &[Ast], else_body: &[Ast]) -> Result<Operand> {
        let cond = self.emit(cond)?;

        let builder = &mut self.state()?.builder;
        let result = builder.alloca_in_entry("if");
        let test = builder.cmp(CmpOp::Ne, cond, Operand::number(0.0));
        let then_block = builder.create_block("then");
        let else_block = builder.create_block("else");
        let merge_block = builder.create_block("merge");
        builder.cond_br(test, then_block, else_block);

        for (block, body) in [(then_block, then_body), (else_block, else_body)] {
            self.state()?.builder.switch_to_block(block);
            let value = self.emit_body(body)?;
            let builder = &mut self.state()?.builder;
            if !builder.is_terminated() {
                builder.store(result.clone(), value);
                builder.br(merge_block);
            }
        }

        let builder = &mut self.state()?.builder;
        builder.switch_to_block(merge_block);
        Ok(builder.load(result))
    }

    /// Emits every statement, returning the value of the last one.
    fn emit_body(&mut self, body: &[Ast]) -> Result<Operand> {
        let mut last = Operand::UNIT;
        for ast in body {
            last = self.emit(ast)?;
        }
        Ok(last)
    }

    fn state(&mut self) -> Result<&mut FunctionState> {
        self.current.as_mut().ok_or(Error::NoEnclosingFunction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::Prototype,
        codegen::ir::{Inst, Terminator},
        parser::parse_str,
    };
    use pretty_assertions::assert_eq;

    fn generate(src: &str, functions: &mut FunctionTable) -> Result<Module> {
        let program = parse_str(src).expect("failed to parse");
        let mut generator = CodeGenerator::new("test", functions);
        let mut last = Operand::UNIT;
        for ast in &program {
            if !ast.is_definition() && !generator.in_function() {
                generator.begin_wrapper("__wrapper", &[]);
            }
            last = generator.emit(ast)?;
        }
        generator.finish(last)
    }

    fn calls_in(module: &Module) -> usize {
        module
            .functions
            .iter()
            .flat_map(|f| &f.blocks)
            .flat_map(|b| &b.insts)
            .filter(|inst| matches!(inst, Inst::Call { .. }))
            .count()
    }

    #[test]
    fn test_expression_outside_function() {
        let mut functions = FunctionTable::default();
        let mut generator = CodeGenerator::new("test", &mut functions);
        let error = generator.emit(&Ast::variable("x")).unwrap_err();
        assert_eq!(error, Error::NoEnclosingFunction);
        assert_eq!(generator.emit(&Ast::Number(1.0)), Ok(Operand::number(1.0)));
    }

    fn callees_of(function: &ir::Function) -> Vec<&str> {
        function
            .blocks
            .iter()
            .flat_map(|b| &b.insts)
            .filter_map(|inst| match inst {
                Inst::Call { callee, .. } => Some(&**callee),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_redefinition_gets_new_symbol() {
        let mut functions = FunctionTable::default();
        let module = generate(
            "let f x = x; end f 1; let f x = x + 1; end f 2;",
            &mut functions,
        )
        .unwrap();
        let names: Vec<_> = module.functions.iter().map(|f| &*f.name).collect();
        assert_eq!(names, ["f", "f.1", "__wrapper"]);
        let f = module.function("f.1").unwrap();
        assert!(f.blocks[0]
            .insts
            .iter()
            .any(|inst| matches!(inst, Inst::Binary { op: BinaryOp::FAdd, .. })));

        // Each call is bound to the definition that preceded it.
        let wrapper = module.function("__wrapper").unwrap();
        assert_eq!(callees_of(wrapper), ["f", "f.1"]);
        assert_eq!(functions.get("f"), Some(&Signature::new("f.1", 1)));
    }

    #[test]
    fn test_recursion_binds_to_own_definition() {
        let mut functions = FunctionTable::default();
        let module = generate(
            "let f x = x; end let f x = if x then f (x - 1); else 0; end end",
            &mut functions,
        )
        .unwrap();
        assert_eq!(callees_of(module.function("f").unwrap()), Vec::<&str>::new());
        assert_eq!(callees_of(module.function("f.1").unwrap()), ["f.1"]);
    }

    #[test]
    fn test_redeclared_variable() {
        let mut functions = FunctionTable::default();
        let error = generate("let f () = let x = 1; let x = 2; end", &mut functions).unwrap_err();
        assert_eq!(error, Error::RedeclaredVariable("x".into()));

        let error = generate("let g x x = x; end", &mut functions).unwrap_err();
        assert_eq!(error, Error::RedeclaredVariable("x".into()));
    }

    #[test]
    fn test_failed_function_restores_table() {
        let mut functions = FunctionTable::default();
        generate("let f x = x; end", &mut functions).unwrap();

        let error = generate("let f x y = z; end", &mut functions).unwrap_err();
        assert_eq!(error, Error::UnknownVariable("z".into()));
        assert_eq!(functions.get("f"), Some(&Signature::new("f", 1)));

        let error = generate("let h () = nope (); end", &mut functions).unwrap_err();
        assert_eq!(error, Error::UnknownFunction("nope".into()));
        assert_eq!(functions.get("h"), None);
    }

    #[test]
    fn test_bad_calls_never_emit_call() {
        let mut functions = FunctionTable::default();
        functions.insert("f", Signature::new("f", 1));

        let program = parse_str("f 1 2;").unwrap();
        let mut generator = CodeGenerator::new("test", &mut functions);
        generator.begin_wrapper("__wrapper", &[]);
        let error = generator.emit(&program[0]).unwrap_err();
        assert_eq!(
            error,
            Error::ArityMismatch {
                callee: "f".into(),
                expected: 1,
                actual: 2,
            }
        );
        let module = generator.finish(Operand::UNIT).unwrap();
        assert_eq!(calls_in(&module), 0);

        let error = generate("g 1;", &mut functions).unwrap_err();
        assert_eq!(error, Error::UnknownFunction("g".into()));
    }

    #[test]
    fn test_call_declares_external_function() {
        let mut functions = FunctionTable::default();
        functions.insert("ext", Signature::new("ext", 2));
        let module = generate("ext 1 2;", &mut functions).unwrap();
        assert_eq!(
            module.declarations,
            [ir::Declaration {
                name: "ext".into(),
                arity: 2,
            }]
        );
        assert_eq!(calls_in(&module), 1);
    }

    #[test]
    fn test_prototype_registers_signature() {
        let mut functions = FunctionTable::default();
        let mut generator = CodeGenerator::new("test", &mut functions);
        let proto = Prototype {
            name: "p".into(),
            params: vec!["a".into(), "b".into()],
        };
        generator.emit(&Ast::Prototype(proto)).unwrap();
        let module = generator.finish(Operand::UNIT).unwrap();
        assert_eq!(module.declarations.len(), 1);
        assert_eq!(functions.get("p"), Some(&Signature::new("p", 2)));
    }

    #[test]
    fn test_unsupported_constructs() {
        let mut functions = FunctionTable::default();
        let cases = [
            ("2 ^ 3;", Error::UnsupportedOperator(BinaryOperator::Pow)),
            ("\"str\";", Error::UnsupportedLiteral("string")),
            ("x;", Error::UnknownVariable("x".into())),
        ];
        for (src, expected) in cases {
            assert_eq!(generate(src, &mut functions), Err(expected), "input: {src:?}");
        }

        let mut generator = CodeGenerator::new("test", &mut functions);
        generator.begin_wrapper("__wrapper", &[]);
        let assign = Ast::binary(BinaryOperator::Assign, Ast::Number(1.0), Ast::Number(2.0));
        assert_eq!(generator.emit(&assign), Err(Error::InvalidAssignmentTarget));
    }

    #[test]
    fn test_wrapper_lets_become_globals() {
        let mut functions = FunctionTable::default();
        let module = generate("let x = 1; x = x + 1;", &mut functions).unwrap();
        assert_eq!(
            module.globals,
            [Global {
                name: "x".into(),
                init: Constant::Unit,
            }]
        );
        let wrapper = module.function("__wrapper").unwrap();
        assert_eq!(wrapper.slot_count, 0);
    }

    #[test]
    fn test_return_in_both_branches_is_verified() {
        let mut functions = FunctionTable::default();
        let module = generate(
            "let f x = if x then return 1; else return 2; end end",
            &mut functions,
        )
        .unwrap();
        let f = module.function("f").unwrap();
        assert!(f.blocks.iter().all(|b| b.terminator.is_some()));
        let returns = f
            .blocks
            .iter()
            .filter(|b| matches!(b.terminator, Some(Terminator::Ret(Some(Operand::Const(_))))))
            .count();
        assert!(returns >= 2);
    }
}
