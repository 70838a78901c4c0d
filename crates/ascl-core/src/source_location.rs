use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a node in the contract source, as recorded by the parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SrcPos {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SrcPos {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    pub fn at(line: u32, column: u32) -> Self {
        Self::new(line, column, 0)
    }

    #[inline]
    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for SrcPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "<unknown>")
        }
    }
}
