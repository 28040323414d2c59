use std::{collections::HashMap, rc::Rc};

use log::{debug, trace};

use crate::{
    backend::{Backend, ExecError, LinkError, UnitHandle, Value},
    codegen::ir::{BinaryOp, BlockId, CmpOp, Constant, Function, Inst, Module, Operand, Place, Terminator},
};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Executes linked modules directly from their IR.
///
/// Every symbol maps to a stack of definitions, one per unit that defined it.
/// Lookups always see the top of the stack.
pub struct Interpreter {
    units: HashMap<UnitHandle, String>,
    next_unit: u32,
    functions: HashMap<Box<str>, Vec<(UnitHandle, Rc<Function>)>>,
    globals: HashMap<Box<str>, Vec<(UnitHandle, Value)>>,
    max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::with_max_call_depth(DEFAULT_MAX_CALL_DEPTH)
    }
}

impl Backend for Interpreter {
    fn link(&mut self, module: Module) -> Result<UnitHandle, LinkError> {
        module.verify().map_err(|source| LinkError::Unverified {
            module: module.name.clone(),
            source,
        })?;

        let unit = UnitHandle(self.next_unit);
        self.next_unit += 1;
        debug!(
            "linking `{}` as unit {unit} ({} function(s), {} global(s))",
            module.name,
            module.functions.len(),
            module.globals.len(),
        );

        for function in module.functions {
            let definitions = self.functions.entry(function.name.clone()).or_default();
            if !definitions.is_empty() {
                debug!("unit {unit} redefines `{}`", function.name);
            }
            definitions.push((unit, Rc::new(function)));
        }
        for global in module.globals {
            self.globals
                .entry(global.name)
                .or_default()
                .push((unit, constant(global.init)));
        }
        self.units.insert(unit, module.name);
        Ok(unit)
    }

    fn call(&mut self, symbol: &str, args: &[Value]) -> Result<Value, ExecError> {
        self.invoke(symbol, args, 0)
    }

    fn global(&self, symbol: &str) -> Option<Value> {
        let (_, value) = self.globals.get(symbol)?.last()?;
        Some(*value)
    }

    fn unlink(&mut self, unit: UnitHandle) -> Result<(), LinkError> {
        let name = self.units.remove(&unit).ok_or(LinkError::UnknownUnit(unit))?;
        debug!("unlinking unit {unit} (`{name}`)");
        self.functions.retain(|_, definitions| {
            definitions.retain(|(owner, _)| *owner != unit);
            !definitions.is_empty()
        });
        self.globals.retain(|_, definitions| {
            definitions.retain(|(owner, _)| *owner != unit);
            !definitions.is_empty()
        });
        Ok(())
    }
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter::default()
    }

    pub fn with_max_call_depth(max_call_depth: usize) -> Interpreter {
        Interpreter {
            units: HashMap::new(),
            next_unit: 0,
            functions: HashMap::new(),
            globals: HashMap::new(),
            max_call_depth,
        }
    }

    /// Number of units currently linked.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn resolve(&self, symbol: &str) -> Result<Rc<Function>, ExecError> {
        self.functions
            .get(symbol)
            .and_then(|definitions| definitions.last())
            .map(|(_, function)| Rc::clone(function))
            .ok_or_else(|| ExecError::UnresolvedSymbol(symbol.into()))
    }

    fn invoke(&mut self, symbol: &str, args: &[Value], depth: usize) -> Result<Value, ExecError> {
        if depth >= self.max_call_depth {
            return Err(ExecError::StackOverflow(self.max_call_depth));
        }
        let function = self.resolve(symbol)?;
        if function.arity() != args.len() {
            return Err(ExecError::ArityMismatch {
                symbol: symbol.into(),
                expected: function.arity(),
                actual: args.len(),
            });
        }
        trace!("call `{symbol}` at depth {depth}");
        Frame::new(&function, args).run(self, depth)
    }

    fn load_global(&self, name: &str) -> Result<Value, ExecError> {
        self.global(name)
            .ok_or_else(|| ExecError::UnresolvedSymbol(name.into()))
    }

    fn store_global(&mut self, name: &str, value: Value) -> Result<(), ExecError> {
        let (_, slot) = self
            .globals
            .get_mut(name)
            .and_then(|definitions| definitions.last_mut())
            .ok_or_else(|| ExecError::UnresolvedSymbol(name.into()))?;
        *slot = value;
        Ok(())
    }
}

/// The state of one function activation.
struct Frame<'f> {
    function: &'f Function,
    args: &'f [Value],
    slots: Vec<Value>,
    values: Vec<Value>,
}

impl<'f> Frame<'f> {
    fn new(function: &'f Function, args: &'f [Value]) -> Frame<'f> {
        Frame {
            function,
            args,
            slots: vec![Value::Unit; function.slot_count],
            values: vec![Value::Unit; function.value_count],
        }
    }

    fn run(mut self, interp: &mut Interpreter, depth: usize) -> Result<Value, ExecError> {
        let function = self.function;
        let mut current = BlockId::ENTRY;
        loop {
            let block = function.block(current);
            for inst in &block.insts {
                self.step(interp, inst, depth)?;
            }
            match &block.terminator {
                Some(Terminator::Ret(value)) => {
                    return Ok(value.as_ref().map_or(Value::Unit, |v| self.operand(v)));
                }
                Some(Terminator::Br(target)) => current = *target,
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    current = if boolean(self.operand(cond))? {
                        *then_block
                    } else {
                        *else_block
                    };
                }
                None => return Err(ExecError::Unterminated(block.label.clone())),
            }
        }
    }

    fn step(&mut self, interp: &mut Interpreter, inst: &Inst, depth: usize) -> Result<(), ExecError> {
        match inst {
            Inst::Alloca { slot, .. } => self.slots[slot.0] = Value::Unit,
            Inst::Load { dest, place } => {
                self.values[dest.0] = match place {
                    Place::Slot(slot) => self.slots[slot.0],
                    Place::Global(name) => interp.load_global(name)?,
                };
            }
            Inst::Store { place, value } => {
                let value = self.operand(value);
                match place {
                    Place::Slot(slot) => self.slots[slot.0] = value,
                    Place::Global(name) => interp.store_global(name, value)?,
                }
            }
            Inst::Param { dest, index } => self.values[dest.0] = self.args[*index],
            Inst::Binary { dest, op, lhs, rhs } => {
                let lhs = number(self.operand(lhs))?;
                let rhs = number(self.operand(rhs))?;
                let result = match op {
                    BinaryOp::FAdd => lhs + rhs,
                    BinaryOp::FSub => lhs - rhs,
                    BinaryOp::FMul => lhs * rhs,
                    BinaryOp::FDiv => lhs / rhs,
                };
                self.values[dest.0] = Value::Number(result);
            }
            Inst::Cmp { dest, op, lhs, rhs } => {
                let lhs = number(self.operand(lhs))?;
                let rhs = number(self.operand(rhs))?;
                let result = match op {
                    CmpOp::Lt => lhs < rhs,
                    CmpOp::Gt => lhs > rhs,
                    #[allow(clippy::float_cmp)]
                    CmpOp::Ne => lhs != rhs,
                };
                self.values[dest.0] = Value::Bool(result);
            }
            Inst::Widen { dest, value } => {
                let value = boolean(self.operand(value))?;
                self.values[dest.0] = Value::Number(if value { 1.0 } else { 0.0 });
            }
            Inst::Call { dest, callee, args } => {
                let args: Vec<_> = args.iter().map(|arg| self.operand(arg)).collect();
                self.values[dest.0] = interp.invoke(callee, &args, depth + 1)?;
            }
        }
        Ok(())
    }

    fn operand(&self, operand: &Operand) -> Value {
        match operand {
            Operand::Value(value) => self.values[value.0],
            Operand::Const(c) => constant(*c),
        }
    }
}

fn constant(c: Constant) -> Value {
    match c {
        Constant::Number(val) => Value::Number(val),
        Constant::Unit => Value::Unit,
    }
}

fn number(value: Value) -> Result<f64, ExecError> {
    value.as_number().ok_or(ExecError::TypeMismatch {
        expected: "number",
        actual: value,
    })
}

fn boolean(value: Value) -> Result<bool, ExecError> {
    match value {
        Value::Bool(val) => Ok(val),
        actual => Err(ExecError::TypeMismatch {
            expected: "boolean",
            actual,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codegen::{generate_unit, ir::Block, FunctionTable, Signature, MAIN_FUNCTION},
        parser::parse_str,
    };
    use pretty_assertions::assert_eq;

    fn link(interp: &mut Interpreter, functions: &mut FunctionTable, src: &str) -> UnitHandle {
        let program = parse_str(src).unwrap();
        let module = generate_unit("test", &program, functions).unwrap();
        interp.link(module).unwrap()
    }

    fn run(src: &str) -> Result<Value, ExecError> {
        let mut interp = Interpreter::new();
        link(&mut interp, &mut FunctionTable::default(), src);
        interp.call(MAIN_FUNCTION, &[])
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("1 + 2 * 3;"), Ok(Value::Number(7.0)));
        assert_eq!(run("(1 + 2) * 3;"), Ok(Value::Number(9.0)));
        assert_eq!(run("10 - 4 - 3;"), Ok(Value::Number(3.0)));
        assert_eq!(run("9 / 2;"), Ok(Value::Number(4.5)));
        assert_eq!(run("'A';"), Ok(Value::Number(65.0)));
        assert_eq!(run("();"), Ok(Value::Unit));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run("1 < 2;"), Ok(Value::Number(1.0)));
        assert_eq!(run("2 < 1;"), Ok(Value::Number(0.0)));
        assert_eq!(run("3 > 1 + 1;"), Ok(Value::Number(1.0)));
        assert_eq!(run("1 > 1;"), Ok(Value::Number(0.0)));
    }

    #[test]
    fn test_functions_and_if() {
        let src = "
            let fib n =
                if n < 2 then
                    return n;
                end
                fib (n - 1) + fib (n - 2);
            end
            let pick c = if c then 10; else 20; end end
            let answer () = 42; end
            fib 10 + pick 0 + pick 5 + answer ();
        ";
        assert_eq!(run(src), Ok(Value::Number(55.0 + 20.0 + 10.0 + 42.0)));
    }

    #[test]
    fn test_locals_and_assignment() {
        let src = "
            let f x =
                let y = x * 2;
                y = y + 1;
                x = y;
                x;
            end
            f 4;
        ";
        assert_eq!(run(src), Ok(Value::Number(9.0)));
    }

    #[test]
    fn test_globals_are_readable_after_run() {
        let mut interp = Interpreter::new();
        link(&mut interp, &mut FunctionTable::default(), "let x = 2; x = x * 5;");
        assert_eq!(interp.global("x"), Some(Value::Unit));
        assert_eq!(interp.call(MAIN_FUNCTION, &[]), Ok(Value::Number(10.0)));
        assert_eq!(interp.global("x"), Some(Value::Number(10.0)));
        assert_eq!(interp.global("y"), None);
    }

    #[test]
    fn test_shadowing_and_unlink() {
        let mut interp = Interpreter::new();
        // Separate tables, so both units link the symbol `f`.
        let first = link(&mut interp, &mut FunctionTable::default(), "let f () = 1; end");
        let second = link(&mut interp, &mut FunctionTable::default(), "let f () = 2; end");
        assert_eq!(interp.unit_count(), 2);
        assert_eq!(interp.call("f", &[]), Ok(Value::Number(2.0)));

        interp.unlink(second).unwrap();
        assert_eq!(interp.call("f", &[]), Ok(Value::Number(1.0)));
        assert_eq!(interp.unlink(second), Err(LinkError::UnknownUnit(second)));

        interp.unlink(first).unwrap();
        assert_eq!(
            interp.call("f", &[]),
            Err(ExecError::UnresolvedSymbol("f".into()))
        );
        assert_eq!(interp.unit_count(), 0);
    }

    #[test]
    fn test_calls_resolve_at_call_time() {
        let mut interp = Interpreter::new();
        let functions = &mut FunctionTable::default();
        functions.insert("g", Signature::new("g", 0));
        link(&mut interp, functions, "let f () = g (); end");
        assert_eq!(
            interp.call("f", &[]),
            Err(ExecError::UnresolvedSymbol("g".into()))
        );
        link(&mut interp, functions, "let g () = 10; end");
        assert_eq!(interp.call("f", &[]), Ok(Value::Number(10.0)));
    }

    #[test]
    fn test_redefinition_keeps_earlier_callers() {
        let mut interp = Interpreter::new();
        let functions = &mut FunctionTable::default();
        link(&mut interp, functions, "let g () = 1; end let f () = g () + 1; end");
        link(&mut interp, functions, "let g () = 10; end");
        assert_eq!(interp.call("f", &[]), Ok(Value::Number(2.0)));
        assert_eq!(interp.call("g.1", &[]), Ok(Value::Number(10.0)));
    }

    #[test]
    fn test_runtime_errors() {
        assert_eq!(
            run("let loop x = loop x; end loop 1;"),
            Err(ExecError::StackOverflow(DEFAULT_MAX_CALL_DEPTH))
        );
        assert_eq!(
            run("let u () = (); end u () + 1;"),
            Err(ExecError::TypeMismatch {
                expected: "number",
                actual: Value::Unit,
            })
        );
        assert_eq!(
            run("if () then 1; end"),
            Err(ExecError::TypeMismatch {
                expected: "number",
                actual: Value::Unit,
            })
        );

        let mut interp = Interpreter::new();
        link(&mut interp, &mut FunctionTable::default(), "let id x = x; end");
        assert_eq!(
            interp.call("id", &[]),
            Err(ExecError::ArityMismatch {
                symbol: "id".into(),
                expected: 1,
                actual: 0,
            })
        );
        assert_eq!(interp.call("id", &[Value::Number(3.0)]), Ok(Value::Number(3.0)));
    }

    #[test]
    fn test_link_rejects_unverified_module() {
        let mut module = Module::new("broken");
        module.define(Function {
            name: "f".into(),
            params: vec![],
            blocks: vec![Block {
                label: "entry".into(),
                insts: vec![],
                terminator: None,
            }],
            slot_count: 0,
            value_count: 0,
        });
        let mut interp = Interpreter::new();
        let error = interp.link(module).unwrap_err();
        assert!(matches!(error, LinkError::Unverified { .. }));
        assert_eq!(interp.unit_count(), 0);
    }
}
