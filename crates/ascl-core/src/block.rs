use crate::ast::{ExprId, StmtId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasicBlockId(pub u32);

impl fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BasicBlockId,
    pub label: Option<String>,
    pub stmts: Vec<StmtId>,
    /// Postfix side effects waiting to be placed after the statement being lowered.
    pub piggybacks: Vec<StmtId>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(id: BasicBlockId, label: Option<String>) -> Self {
        Self {
            id,
            label,
            stmts: Vec::new(),
            piggybacks: Vec::new(),
            terminator: Terminator::Fallthrough,
        }
    }

    pub fn add_stmt(&mut self, stmt: StmtId) {
        self.stmts.push(stmt);
    }

    pub fn set_terminator(&mut self, term: Terminator) {
        self.terminator = term;
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, Terminator::Fallthrough)
    }

    pub fn successors(&self) -> Vec<BasicBlockId> {
        self.terminator.successors()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    /// Control continues in the next block in layout order.
    Fallthrough,
    Jump(BasicBlockId),
    Branch {
        cond: ExprId,
        then_bb: BasicBlockId,
        else_bb: BasicBlockId,
    },
    Return(Option<ExprId>),
}

impl Terminator {
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
            Terminator::Fallthrough | Terminator::Return(_) => Vec::new(),
        }
    }
}
