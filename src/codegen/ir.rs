//! The target IR.
//!
//! Functions are lists of basic blocks over numbered SSA values. Every
//! variable lives in a storage [`Place`]: a stack slot allocated in the entry
//! block of its function, or a module global. All arithmetic is on numbers;
//! comparisons produce booleans which must be widened back to numbers before
//! they can flow into anything but a conditional branch.

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: String,
    pub globals: Vec<Global>,
    /// Functions this module calls but does not define.
    pub declarations: Vec<Declaration>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            ..Module::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| &*f.name == name)
    }

    /// Adds the function. Calls made to it before it was defined no longer
    /// need a declaration.
    pub fn define(&mut self, function: Function) {
        debug_assert!(
            self.function(&function.name).is_none(),
            "`{}` defined twice",
            function.name
        );
        self.declarations.retain(|d| d.name != function.name);
        self.functions.push(function);
    }

    /// Moves the function `name` into a module of its own, together with
    /// every global. The new module declares whatever the function calls.
    pub fn split_off(&mut self, name: &str, module_name: impl Into<String>) -> Option<Module> {
        let at = self.functions.iter().position(|f| &*f.name == name)?;
        let function = self.functions.remove(at);

        let mut module = Module::new(module_name);
        module.globals = std::mem::take(&mut self.globals);
        for (callee, arity) in function.callees() {
            if &*callee != name {
                module.declare(&callee, arity);
            }
        }
        module.functions.push(function);
        Some(module)
    }

    /// Records that `name` is called from this module. No-op if the module
    /// already defines or declares it.
    pub fn declare(&mut self, name: &str, arity: usize) {
        let known =
            self.function(name).is_some() || self.declarations.iter().any(|d| &*d.name == name);
        if !known {
            self.declarations.push(Declaration {
                name: name.into(),
                arity,
            });
        }
    }

    /// Structural verification: every block of every function has a
    /// terminator and every branch targets an existing block.
    pub fn verify(&self) -> Result<(), VerifyError> {
        for function in &self.functions {
            function.verify()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: Box<str>,
    pub init: Constant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: Box<str>,
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Box<str>,
    pub params: Vec<Box<str>>,
    /// The first block is the entry block.
    pub blocks: Vec<Block>,
    /// Number of stack slots, named by the `Alloca`s of the entry block.
    pub slot_count: usize,
    /// Number of SSA values defined in the body.
    pub value_count: usize,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    /// Every function called from the body, with the number of arguments
    /// passed, in order of appearance.
    pub fn callees(&self) -> Vec<(Box<str>, usize)> {
        self.blocks
            .iter()
            .flat_map(|block| &block.insts)
            .filter_map(|inst| match inst {
                Inst::Call { callee, args, .. } => Some((callee.clone(), args.len())),
                _ => None,
            })
            .collect()
    }

    fn verify(&self) -> Result<(), VerifyError> {
        let error = |reason: String| VerifyError {
            function: self.name.clone(),
            reason,
        };

        if self.blocks.is_empty() {
            return Err(error("function has no entry block".into()));
        }
        let in_bounds = |BlockId(id): BlockId| id < self.blocks.len();
        for block in &self.blocks {
            match &block.terminator {
                None => return Err(error(format!("block `{}` is not terminated", block.label))),
                Some(Terminator::Br(target)) if !in_bounds(*target) => {
                    return Err(error(format!("branch to unknown block {target}")));
                }
                Some(Terminator::CondBr {
                    then_block,
                    else_block,
                    ..
                }) if !in_bounds(*then_block) || !in_bounds(*else_block) => {
                    return Err(error(format!("branch out of `{}` to unknown block", block.label)));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: Box<str>,
    pub insts: Vec<Inst>,
    /// `None` only while the block is under construction.
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Reserves a stack slot. Only ever found in the entry block.
    Alloca { slot: SlotId, name: Box<str> },
    Load { dest: ValueId, place: Place },
    Store { place: Place, value: Operand },
    /// Reads the function's `index`-th argument.
    Param { dest: ValueId, index: usize },
    Binary {
        dest: ValueId,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Cmp {
        dest: ValueId,
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
    },
    /// Converts a boolean into `0.0` or `1.0`.
    Widen { dest: ValueId, value: Operand },
    Call {
        dest: ValueId,
        callee: Box<str>,
        args: Vec<Operand>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// A valueless return yields unit.
    Ret(Option<Operand>),
    Br(BlockId),
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Gt,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Slot(SlotId),
    Global(Box<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(ValueId),
    Const(Constant),
}

impl Operand {
    pub const UNIT: Operand = Operand::Const(Constant::Unit);

    pub fn number(val: f64) -> Operand {
        Operand::Const(Constant::Number(val))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Constant {
    Number(f64),
    /// The "no value" marker.
    Unit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed function `{function}`: {reason}")]
pub struct VerifyError {
    pub function: Box<str>,
    pub reason: String,
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Slot(slot) => write!(f, "{slot}"),
            Place::Global(name) => write!(f, "@{name}"),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Number(val) => write!(f, "{val:?}"),
            Constant::Unit => f.write_str("unit"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(value) => write!(f, "{value}"),
            Operand::Const(constant) => write!(f, "{constant}"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Lt => "lt",
            CmpOp::Gt => "gt",
            CmpOp::Ne => "ne",
        })
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Alloca { slot, name } => write!(f, "{slot} = alloca {name}"),
            Inst::Load { dest, place } => write!(f, "{dest} = load {place}"),
            Inst::Store { place, value } => write!(f, "store {value}, {place}"),
            Inst::Param { dest, index } => write!(f, "{dest} = param {index}"),
            Inst::Binary { dest, op, lhs, rhs } => write!(f, "{dest} = {op} {lhs}, {rhs}"),
            Inst::Cmp { dest, op, lhs, rhs } => write!(f, "{dest} = cmp {op} {lhs}, {rhs}"),
            Inst::Widen { dest, value } => write!(f, "{dest} = widen {value}"),
            Inst::Call { dest, callee, args } => {
                write!(f, "{dest} = call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Ret(Some(value)) => write!(f, "ret {value}"),
            Terminator::Ret(None) => f.write_str("ret"),
            Terminator::Br(target) => write!(f, "br {target}"),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(f, "condbr {cond}, {then_block}, {else_block}"),
        }
    }
}
