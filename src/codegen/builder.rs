use crate::codegen::ir::{
    BinaryOp, Block, BlockId, CmpOp, Function, Inst, Operand, Place, SlotId, Terminator, ValueId,
};

/// Emits instructions for a single function, always appending to the block
/// the builder is positioned at.
pub struct FunctionBuilder {
    name: Box<str>,
    params: Vec<Box<str>>,
    blocks: Vec<Block>,
    current: BlockId,
    slot_count: usize,
    value_count: usize,
}

impl FunctionBuilder {
    /// Creates the function with an empty entry block, and positions the
    /// builder at it.
    pub fn new(name: impl Into<Box<str>>, params: Vec<Box<str>>) -> FunctionBuilder {
        let mut builder = FunctionBuilder {
            name: name.into(),
            params,
            blocks: Vec::with_capacity(4),
            current: BlockId::ENTRY,
            slot_count: 0,
            value_count: 0,
        };
        builder.create_block("entry");
        builder
    }

    /// Appends a new (empty) block to the function. Doesn't move the builder.
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            label: label.into(),
            insts: Vec::new(),
            terminator: None,
        });
        id
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        debug_assert!(block.0 < self.blocks.len());
        self.current = block;
    }

    /// Whether the current block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.blocks[self.current.0].terminator.is_some()
    }

    /// Allocates a named stack slot at the head of the entry block, no matter
    /// where the builder is currently positioned.
    pub fn alloca_in_entry(&mut self, name: &str) -> Place {
        let slot = SlotId(self.slot_count);
        self.slot_count += 1;
        let entry = &mut self.blocks[BlockId::ENTRY.0].insts;
        let at = entry
            .iter()
            .take_while(|inst| matches!(inst, Inst::Alloca { .. }))
            .count();
        let name = name.into();
        entry.insert(at, Inst::Alloca { slot, name });
        Place::Slot(slot)
    }

    pub fn param(&mut self, index: usize) -> Operand {
        debug_assert!(index < self.params.len());
        self.push_value(|dest| Inst::Param { dest, index })
    }

    pub fn load(&mut self, place: Place) -> Operand {
        self.push_value(|dest| Inst::Load { dest, place })
    }

    pub fn store(&mut self, place: Place, value: Operand) {
        self.push(Inst::Store { place, value });
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Operand, rhs: Operand) -> Operand {
        self.push_value(|dest| Inst::Binary { dest, op, lhs, rhs })
    }

    pub fn cmp(&mut self, op: CmpOp, lhs: Operand, rhs: Operand) -> Operand {
        self.push_value(|dest| Inst::Cmp { dest, op, lhs, rhs })
    }

    pub fn widen(&mut self, value: Operand) -> Operand {
        self.push_value(|dest| Inst::Widen { dest, value })
    }

    pub fn call(&mut self, callee: &str, args: Vec<Operand>) -> Operand {
        let callee = callee.into();
        self.push_value(|dest| Inst::Call { dest, callee, args })
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    /// Returns the built function. Blocks left open are terminated with a
    /// unit return; they are only reachable if the generator forgot them.
    pub fn finish(mut self) -> Function {
        for block in &mut self.blocks {
            block.terminator.get_or_insert(Terminator::Ret(None));
        }
        Function {
            name: self.name,
            params: self.params,
            blocks: self.blocks,
            slot_count: self.slot_count,
            value_count: self.value_count,
        }
    }
}

impl FunctionBuilder {
    fn push(&mut self, inst: Inst) {
        let block = &mut self.blocks[self.current.0];
        debug_assert!(block.terminator.is_none(), "emitting into terminated block");
        block.insts.push(inst);
    }

    fn push_value(&mut self, make: impl FnOnce(ValueId) -> Inst) -> Operand {
        let dest = ValueId(self.value_count);
        self.value_count += 1;
        self.push(make(dest));
        Operand::Value(dest)
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current.0];
        debug_assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(terminator);
    }
}
