//! Incremental execution, one input at a time.
//!
//! Each input is generated in source order. The functions it defines are then
//! linked into the backend for good, while its other statements end up in a
//! throwaway wrapper function, which is linked, called and unlinked again.
//! Variables outlive the wrapper that bound them only as values: before a
//! wrapper is unlinked its globals are read back, and the next wrapper gets
//! fresh globals initialized with those values.

use log::{debug, trace};

use crate::{
    backend::{Backend, Interpreter, UnitHandle, Value},
    codegen::{
        self,
        ir::{Constant, Module},
        FunctionTable, Unit, ANON_FUNCTION,
    },
    compiler::Options,
    lexer, parser, Result,
};

pub struct Session<B = Interpreter> {
    backend: B,
    options: Options,
    functions: FunctionTable,
    /// Every variable bound so far, in binding order, with its last value.
    variables: Vec<(Box<str>, Constant)>,
    /// Units holding function definitions. These stay linked.
    definitions: Vec<UnitHandle>,
    next_unit: usize,
}

impl Default for Session<Interpreter> {
    fn default() -> Self {
        Session::new(Interpreter::new())
    }
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Session<B> {
        Session {
            backend,
            options: Options::default(),
            functions: FunctionTable::default(),
            variables: Vec::new(),
            definitions: Vec::new(),
            next_unit: 0,
        }
    }

    pub fn with_options(self, options: Options) -> Session<B> {
        Session { options, ..self }
    }

    /// Evaluates one input. Returns the value of its last top-level statement,
    /// or `None` if it only defined functions.
    ///
    /// The input succeeds or fails as a whole: on error, functions it defined
    /// are unlinked again and every binding made by earlier inputs is left
    /// untouched.
    pub fn eval(&mut self, src: &str) -> Result<Option<Value>> {
        let tokens = lexer::lex_in_new(src)?;
        self.options.dump_tokens(src, &tokens)?;
        let program = parser::parse(src, &tokens)?;
        self.options.dump_program(&program)?;

        let n = self.next_unit;
        self.next_unit += 1;

        // The input is generated in source order against a copy of the table,
        // which is committed only once everything has run.
        let mut functions = self.functions.clone();
        let name = format!("defs{n}");
        let unit = Unit::new(&name, ANON_FUNCTION).with_globals(&self.variables);
        let mut definitions = codegen::generate(unit, &program, &mut functions)?;
        let wrapper = definitions.split_off(ANON_FUNCTION, format!("expr{n}"));
        trace!(
            "unit {n}: {} definition(s), {} wrapper",
            definitions.functions.len(),
            if wrapper.is_some() { "with" } else { "without" }
        );

        let linked = if definitions.functions.is_empty() {
            None
        } else {
            self.options.dump_module(&definitions)?;
            Some(self.backend.link(definitions)?)
        };
        let result = match wrapper {
            Some(module) => self.run_wrapper(module).map(Some),
            None => Ok(None),
        };

        match result {
            Ok(outcome) => {
                self.functions = functions;
                self.definitions.extend(linked);
                let Some((value, bound)) = outcome else {
                    return Ok(None);
                };
                self.commit(bound);
                debug!("unit {n} evaluated to {value}");
                Ok(Some(value))
            }
            Err(error) => {
                if let Some(handle) = linked {
                    debug!("unit {n} failed, dropping its definitions");
                    self.backend.unlink(handle)?;
                }
                Err(error)
            }
        }
    }

    /// The current value of a variable bound by some earlier input.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables
            .iter()
            .find(|(bound, _)| &**bound == name)
            .map(|(_, value)| value_of(*value))
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, Value)> {
        self.variables
            .iter()
            .map(|(name, value)| (&**name, value_of(*value)))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.get(name).is_some()
    }

    /// Unlinks every definition and forgets every variable.
    pub fn reset(&mut self) -> Result<()> {
        for handle in self.definitions.drain(..) {
            self.backend.unlink(handle)?;
        }
        self.functions = FunctionTable::default();
        self.variables.clear();
        debug!("session reset");
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Links, calls and unlinks the wrapper. Its globals are read back before
    /// it is unlinked.
    fn run_wrapper(&mut self, module: Module) -> Result<(Value, Vec<(Box<str>, Constant)>)> {
        self.options.dump_module(&module)?;
        let names: Vec<Box<str>> = module.globals.iter().map(|g| g.name.clone()).collect();

        let handle = self.backend.link(module)?;
        let result = self.backend.call(ANON_FUNCTION, &[]);
        let bound = names
            .into_iter()
            .filter_map(|name| {
                let value = self.backend.global(&name)?;
                Some((name, constant_of(value)))
            })
            .collect();
        self.backend.unlink(handle)?;

        Ok((result?, bound))
    }

    fn commit(&mut self, bound: Vec<(Box<str>, Constant)>) {
        for (name, value) in bound {
            match self.variables.iter_mut().find(|(known, _)| *known == name) {
                Some((_, known)) => *known = value,
                None => {
                    trace!("binding `{name}` = {value}");
                    self.variables.push((name, value));
                }
            }
        }
    }
}

fn constant_of(value: Value) -> Constant {
    match value {
        Value::Number(val) => Constant::Number(val),
        Value::Unit => Constant::Unit,
        Value::Bool(val) => Constant::Number(f64::from(u8::from(val))),
    }
}

fn value_of(constant: Constant) -> Value {
    match constant {
        Constant::Number(val) => Value::Number(val),
        Constant::Unit => Value::Unit,
    }
}
