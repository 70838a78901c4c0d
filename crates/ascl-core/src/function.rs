use crate::ast::{IdentId, StmtId};
use crate::block::{BasicBlock, BasicBlockId, Terminator};
use crate::types::{align_to, BaseType, Meta};
use crate::values::MemRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Register index of the contract receiver in every function.
pub const RECEIVER_REG: u32 = 0;

pub const RECEIVER_NAME: &str = "cont$addr";
pub const STACK_BASE_NAME: &str = "stack$base";
pub const HEAP_BASE_NAME: &str = "heap$base";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub name: String,
    pub meta: Meta,
}

/// Where fresh aggregate slots are carved from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocMode {
    #[default]
    Stack,
    Heap,
}

/// Lowering state of one function: its register table, frame usage and the
/// basic blocks produced so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFn {
    pub name: String,
    pub ident: IdentId,
    pub ret: Meta,
    pub registers: Vec<Register>,
    pub stack_idx: u32,
    pub heap_idx: u32,
    pub stack_usage: u32,
    pub heap_usage: u32,
    pub alloc_mode: AllocMode,
    pub blocks: Vec<BasicBlock>,
    pub current: BasicBlockId,
    pub labels: IndexMap<String, BasicBlockId>,
}

impl IrFn {
    /// Lays out the fixed part of the register table: the receiver, the
    /// parameters in order, then the stack and heap base registers.
    pub fn new(
        name: impl Into<String>,
        ident: IdentId,
        ret: Meta,
        params: impl IntoIterator<Item = (String, Meta)>,
    ) -> Self {
        let mut registers = vec![Register {
            name: RECEIVER_NAME.to_string(),
            meta: Meta::new(BaseType::Uint32),
        }];
        registers.extend(
            params
                .into_iter()
                .map(|(name, meta)| Register { name, meta }),
        );

        let stack_idx = registers.len() as u32;
        let heap_idx = stack_idx + 1;
        for name in [STACK_BASE_NAME, HEAP_BASE_NAME] {
            registers.push(Register {
                name: name.to_string(),
                meta: Meta::new(BaseType::Uint32),
            });
        }

        Self {
            name: name.into(),
            ident,
            ret,
            registers,
            stack_idx,
            heap_idx,
            stack_usage: 0,
            heap_usage: 0,
            alloc_mode: AllocMode::Stack,
            blocks: vec![BasicBlock::new(BasicBlockId(0), None)],
            current: BasicBlockId(0),
            labels: IndexMap::new(),
        }
    }

    /// Number of parameter registers following the receiver.
    pub fn param_count(&self) -> u32 {
        self.stack_idx - 1
    }

    pub fn add_reg(&mut self, name: impl Into<String>, meta: Meta) -> u32 {
        let idx = self.registers.len() as u32;
        self.registers.push(Register {
            name: name.into(),
            meta,
        });
        idx
    }

    pub fn register(&self, idx: u32) -> Option<&Register> {
        self.registers.get(idx as usize)
    }

    /// Register the current allocation mode carves slots from.
    pub fn frame_base(&self) -> u32 {
        match self.alloc_mode {
            AllocMode::Stack => self.stack_idx,
            AllocMode::Heap => self.heap_idx,
        }
    }

    /// Reserves an aligned slot for a value of shape `meta`.
    pub fn alloc(&mut self, meta: &Meta) -> MemRef {
        let align = meta.align.max(1);
        let (base, usage) = match self.alloc_mode {
            AllocMode::Stack => (self.stack_idx, &mut self.stack_usage),
            AllocMode::Heap => (self.heap_idx, &mut self.heap_usage),
        };

        let addr = align_to(*usage, align);
        *usage = addr + meta.size();
        MemRef::new(base, addr, 0)
    }

    /// Runs `f` with the allocation mode temporarily switched to `mode`.
    pub fn with_alloc_mode<T>(&mut self, mode: AllocMode, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.alloc_mode, mode);
        let out = f(self);
        self.alloc_mode = saved;
        out
    }

    pub fn block(&self, id: BasicBlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn current_block(&self) -> &BasicBlock {
        self.block(self.current)
    }

    fn current_block_mut(&mut self) -> &mut BasicBlock {
        let idx = self.current.0 as usize;
        &mut self.blocks[idx]
    }

    pub fn new_block(&mut self, label: Option<String>) -> BasicBlockId {
        let id = BasicBlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, label));
        id
    }

    /// Block that starts at `label`, created on first reference so that
    /// forward jumps can target it.
    pub fn label_block(&mut self, label: &str) -> BasicBlockId {
        if let Some(id) = self.labels.get(label) {
            return *id;
        }
        let id = self.new_block(Some(label.to_string()));
        self.labels.insert(label.to_string(), id);
        id
    }

    /// Makes `id` the block new statements go to. An unterminated current
    /// block falls through into it with an explicit jump.
    pub fn switch_to(&mut self, id: BasicBlockId) {
        if id == self.current {
            return;
        }
        if !self.current_block().is_terminated() {
            self.current_block_mut().set_terminator(Terminator::Jump(id));
        }
        self.current = id;
    }

    pub fn terminate(&mut self, term: Terminator) {
        self.current_block_mut().set_terminator(term);
    }

    /// Ends the current block with a jump to `target` unless it already
    /// ends otherwise.
    pub fn jump(&mut self, target: BasicBlockId) {
        if !self.current_block().is_terminated() {
            self.terminate(Terminator::Jump(target));
        }
    }

    /// Starts an anonymous block. Used after a jump or return, where the
    /// statements that follow are only reachable through a label.
    pub fn open_block(&mut self) -> BasicBlockId {
        let id = self.new_block(None);
        self.switch_to(id);
        id
    }

    /// Every block still open falls off the end of the function.
    pub fn finish(&mut self) {
        for block in &mut self.blocks {
            if !block.is_terminated() {
                block.set_terminator(Terminator::Return(None));
            }
        }
    }

    pub fn add_stmt(&mut self, stmt: StmtId) {
        self.current_block_mut().add_stmt(stmt);
    }

    pub fn add_stmts(&mut self, stmts: &[StmtId]) {
        self.current_block_mut().stmts.extend_from_slice(stmts);
    }

    pub fn add_piggyback(&mut self, stmt: StmtId) {
        self.current_block_mut().piggybacks.push(stmt);
    }

    pub fn has_piggybacks(&self) -> bool {
        !self.current_block().piggybacks.is_empty()
    }

    pub fn take_piggybacks(&mut self) -> Vec<StmtId> {
        std::mem::take(&mut self.current_block_mut().piggybacks)
    }

    /// Places pending postfix side effects after the statements already in
    /// the current block.
    pub fn flush_piggybacks(&mut self) {
        let pending = self.take_piggybacks();
        self.current_block_mut().stmts.extend(pending);
    }

    pub fn stmt_count(&self) -> usize {
        self.blocks.iter().map(|b| b.stmts.len()).sum()
    }
}
