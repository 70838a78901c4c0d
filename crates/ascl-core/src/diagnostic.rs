use crate::source_location::SrcPos;
use thiserror::Error;

/// User-facing semantic errors. Each aborts checking of the whole module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    #[error("invalid condition type: '{0}'")]
    InvalidCondType(String),

    #[error("mismatched type: expected '{expected}', found '{found}'")]
    MismatchedType { expected: String, found: String },

    #[error("mismatched count: expected {expected}, found {found}")]
    MismatchedCount { expected: usize, found: usize },

    #[error("not comparable type: '{0}'")]
    NotComparableType(String),

    #[error("undefined label: '{0}'")]
    UndefinedLabel(String),

    #[error("index out of range: {index} is not below {size}")]
    IndexOutOfRange { index: u32, size: u32 },

    #[error("not supported: {0}")]
    NotSupported(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: {kind}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub pos: SrcPos,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, pos: SrcPos) -> Self {
        Self { kind, pos }
    }
}
