/*! Core data structures of the ASCL contract compiler middle stage.
 *
 * The checker and the lowering passes rewrite one shared syntax tree in place. This crate owns that
 * tree, the shape descriptors and storage locations lowering attaches to it, the per-function
 * register and block tables, and the deduplicated data segment handed to the bytecode backend.
 */

pub mod ast;
pub mod block;
pub mod builder;
pub mod config;
pub mod diagnostic;
pub mod function;
pub mod ir_persist;
pub mod module;
pub mod segment;
pub mod source_location;
pub mod syslib;
pub mod types;
pub mod values;

pub use ast::{
    Ast, BinaryOp, Block, BlockId, Expr, ExprId, ExprKind, FuncDecl, Helper, Ident, IdentId,
    IdentKind, LoopLabels, Scope, Stmt, StmtId, StmtKind, UnaryOp,
};
pub use block::{BasicBlock, BasicBlockId, Terminator};
pub use builder::AstBuilder;
pub use config::CompileOptions;
pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use function::{AllocMode, IrFn, Register, RECEIVER_REG};
pub use module::LoweredModule;
pub use segment::DataSegment;
pub use source_location::SrcPos;
pub use syslib::{SysFn, SysLib};
pub use types::{align_to, BaseType, Meta};
pub use values::{DynOffset, Location, MemRef, Value};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Diagnostic(#[from] Diagnostic),
    /// A tree shape no earlier phase should have produced.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn diagnostic(kind: DiagnosticKind, pos: SrcPos) -> Self {
        CompileError::Diagnostic(Diagnostic::new(kind, pos))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    /// Internal errors must stop the driver; diagnostics only end the
    /// current entry point.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }

    pub fn kind(&self) -> Option<&DiagnosticKind> {
        match self {
            CompileError::Diagnostic(diag) => Some(&diag.kind),
            CompileError::Internal(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests;
