use crate::ast::Ast;
use crate::function::IrFn;
use crate::segment::DataSegment;
use serde::{Deserialize, Serialize};

/// Output of the middle stage: the rewritten tree the lowered statements
/// point into, one `IrFn` per function, and the shared constant data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoweredModule {
    pub ast: Ast,
    pub functions: Vec<IrFn>,
    pub segment: DataSegment,
}

impl LoweredModule {
    pub fn new(ast: Ast, functions: Vec<IrFn>, segment: DataSegment) -> Self {
        Self {
            ast,
            functions,
            segment,
        }
    }

    pub fn function(&self, name: &str) -> Option<&IrFn> {
        self.functions.iter().find(|f| f.name == name)
    }
}
