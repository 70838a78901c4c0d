use crate::ast::ExprId;
use crate::types::{BaseType, Meta};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal payload carried by literal expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Object(Vec<u8>),
    /// Address of a blob placed in the data segment.
    Addr(u32),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Addr(a) => Some(i64::from(*a)),
            _ => None,
        }
    }

    /// Whether this literal stays inline or must be moved to the data segment.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Double(_) | Value::Addr(_)
        )
    }

    /// Little-endian image of a scalar literal stored in a slot shaped `meta`.
    pub fn to_bytes(&self, meta: &Meta) -> Vec<u8> {
        match self {
            Value::Null => vec![0; 4],
            Value::Bool(b) => vec![u8::from(*b)],
            Value::Int(v) => {
                let width = match meta.unit_size() {
                    0 => 8,
                    n => n.min(8) as usize,
                };
                v.to_le_bytes()[..width].to_vec()
            }
            Value::Double(v) if meta.ty == BaseType::Float => (*v as f32).to_le_bytes().to_vec(),
            Value::Double(v) => v.to_le_bytes().to_vec(),
            Value::Addr(a) => a.to_le_bytes().to_vec(),
            Value::Str(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
            Value::Object(bytes) => bytes.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{:?}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(bytes) => write!(f, "object[{}]", bytes.len()),
            Value::Addr(a) => write!(f, "@{}", a),
        }
    }
}

/// Runtime-dependent part of a memory address: `index * stride` bytes added
/// by the backend on top of the static offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynOffset {
    pub index: ExprId,
    pub stride: u32,
}

/// Memory operand: the address held in register `base`, plus the fixed
/// `addr` of the slot, plus the `offset` inside it, plus any dynamic terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRef {
    pub base: u32,
    pub addr: u32,
    pub offset: u32,
    pub dynamic: Vec<DynOffset>,
}

impl MemRef {
    pub fn new(base: u32, addr: u32, offset: u32) -> Self {
        Self {
            base,
            addr,
            offset,
            dynamic: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.dynamic.is_empty()
    }

    pub fn with_offset(&self, extra: u32) -> Self {
        Self {
            offset: self.offset + extra,
            ..self.clone()
        }
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem[r{} + {} + {}", self.base, self.addr, self.offset)?;
        for term in &self.dynamic {
            write!(f, " + {}*{}", term.index, term.stride)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    Global(String),
    Register(u32),
    Memory(MemRef),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Global(name) => write!(f, "${}", name),
            Location::Register(idx) => write!(f, "r{}", idx),
            Location::Memory(mem) => write!(f, "{}", mem),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_bytes_follow_slot_width() {
        let v = Value::Int(0x0102);
        assert_eq!(v.to_bytes(&Meta::new(BaseType::Int16)), vec![0x02, 0x01]);
        assert_eq!(v.to_bytes(&Meta::new(BaseType::Int32)).len(), 4);
        assert_eq!(v.to_bytes(&Meta::untyped_int()).len(), 8);
    }

    #[test]
    fn test_string_bytes_are_nul_terminated() {
        let v = Value::Str("ab".to_string());
        assert_eq!(v.to_bytes(&Meta::new(BaseType::String)), b"ab\0".to_vec());
    }

    #[test]
    fn test_memref_display() {
        let mut mem = MemRef::new(2, 16, 4);
        mem.dynamic.push(DynOffset {
            index: ExprId(7),
            stride: 8,
        });
        assert_eq!(mem.to_string(), "mem[r2 + 16 + 4 + e7*8]");
    }
}
