use serde::{Deserialize, Serialize};
use std::fmt;

#[inline]
pub fn align_to(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    #[default]
    Undefined,
    Void,
    Bool,
    Byte,
    Float,
    Double,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    String,
    Account,
    Struct,
    Map,
    Tuple,
    Object,
}

impl BaseType {
    /// Size of one scalar of this type. Reference-like types are addresses into
    /// linear memory and therefore take four bytes.
    pub fn size(self) -> u32 {
        match self {
            BaseType::Bool | BaseType::Byte => 1,
            BaseType::Int16 | BaseType::Uint16 => 2,
            BaseType::Int32 | BaseType::Uint32 | BaseType::Float => 4,
            BaseType::Int64 | BaseType::Uint64 | BaseType::Double => 8,
            BaseType::String | BaseType::Account | BaseType::Map | BaseType::Object => 4,
            BaseType::Undefined | BaseType::Void | BaseType::Struct | BaseType::Tuple => 0,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::Byte
                | BaseType::Int16
                | BaseType::Uint16
                | BaseType::Int32
                | BaseType::Uint32
                | BaseType::Int64
                | BaseType::Uint64
        )
    }

    pub fn is_fpoint(self) -> bool {
        matches!(self, BaseType::Float | BaseType::Double)
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseType::Undefined => "undefined",
            BaseType::Void => "void",
            BaseType::Bool => "bool",
            BaseType::Byte => "byte",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::Int16 => "int16",
            BaseType::Uint16 => "uint16",
            BaseType::Int32 => "int32",
            BaseType::Uint32 => "uint32",
            BaseType::Int64 => "int64",
            BaseType::Uint64 => "uint64",
            BaseType::String => "string",
            BaseType::Account => "account",
            BaseType::Struct => "struct",
            BaseType::Map => "map",
            BaseType::Tuple => "tuple",
            BaseType::Object => "object",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape descriptor attached to every expression and identifier.
///
/// `unit` is the size of a single element: the scalar size, or the padded
/// struct/tuple size. Array dimensions multiply it; `size()` gives the full
/// footprint. `offset` is the position of this shape inside an enclosing
/// struct or tuple and is only meaningful for elements of `elems`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub ty: BaseType,
    pub dims: Vec<u32>,
    pub elems: Vec<Meta>,
    pub name: Option<String>,
    pub unit: u32,
    pub align: u32,
    pub offset: u32,
    pub untyped: bool,
}

impl Meta {
    pub fn new(ty: BaseType) -> Self {
        let unit = ty.size();
        Self {
            ty,
            unit,
            align: unit.max(1),
            ..Default::default()
        }
    }

    pub fn undefined() -> Self {
        Self::new(BaseType::Undefined)
    }

    pub fn void() -> Self {
        Self::new(BaseType::Void)
    }

    /// Integer literal whose width is decided by the context it is used in.
    pub fn untyped_int() -> Self {
        Self {
            untyped: true,
            ..Self::new(BaseType::Int64)
        }
    }

    pub fn structure(name: impl Into<String>, fields: Vec<Meta>) -> Self {
        let (elems, unit, align) = layout(fields);
        Self {
            ty: BaseType::Struct,
            elems,
            name: Some(name.into()),
            unit,
            align,
            ..Default::default()
        }
    }

    pub fn tuple(elems: Vec<Meta>) -> Self {
        let (elems, unit, align) = layout(elems);
        Self {
            ty: BaseType::Tuple,
            elems,
            unit,
            align,
            ..Default::default()
        }
    }

    /// Array of `elem` with the given dimensions, outermost first.
    pub fn array(elem: Meta, dims: Vec<u32>) -> Self {
        let mut meta = elem;
        meta.dims = dims.into_iter().chain(meta.dims).collect();
        meta
    }

    /// Tags this shape as the field `name` of a struct declaration.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn elem_count(&self) -> u32 {
        self.dims.iter().product()
    }

    pub fn size(&self) -> u32 {
        self.unit * self.elem_count()
    }

    pub fn unit_size(&self) -> u32 {
        self.unit
    }

    /// Shape produced by indexing once: the outermost dimension is removed.
    pub fn strip_dim(&self) -> Meta {
        let mut meta = self.clone();
        if !meta.dims.is_empty() {
            meta.dims.remove(0);
        }
        meta
    }

    /// Shape of a single element once every dimension is removed.
    pub fn element(&self) -> Meta {
        let mut meta = self.clone();
        meta.dims.clear();
        meta
    }

    /// Number of values this shape stands for in a return or argument list.
    pub fn count(&self) -> usize {
        match self.ty {
            BaseType::Void => 0,
            BaseType::Tuple => self.elems.len(),
            _ => 1,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.ty == BaseType::Undefined
    }

    pub fn is_void(&self) -> bool {
        self.ty == BaseType::Void
    }

    pub fn is_bool(&self) -> bool {
        self.ty == BaseType::Bool && self.dims.is_empty()
    }

    pub fn is_string(&self) -> bool {
        self.ty == BaseType::String && self.dims.is_empty()
    }

    pub fn is_map(&self) -> bool {
        self.ty == BaseType::Map && self.dims.is_empty()
    }

    pub fn is_tuple(&self) -> bool {
        self.ty == BaseType::Tuple
    }

    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    pub fn is_struct(&self) -> bool {
        self.ty == BaseType::Struct
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_array() || self.is_struct()
    }

    pub fn is_object(&self) -> bool {
        matches!(self.ty, BaseType::Object | BaseType::Account) && self.dims.is_empty()
    }

    /// Whether values of this shape can be compared for equality by a switch.
    pub fn is_comparable(&self) -> bool {
        !self.is_array()
            && !matches!(
                self.ty,
                BaseType::Undefined
                    | BaseType::Void
                    | BaseType::Struct
                    | BaseType::Map
                    | BaseType::Tuple
                    | BaseType::Object
            )
    }

    /// Type equality used by the checker. An untyped integer literal matches
    /// any scalar integer shape.
    pub fn equals(&self, other: &Meta) -> bool {
        if self.untyped || other.untyped {
            let (lit, ty) = if self.untyped {
                (self, other)
            } else {
                (other, self)
            };
            return lit.dims == ty.dims && (ty.ty.is_integer() || (ty.untyped && ty.ty == lit.ty));
        }

        if self.ty != other.ty || self.dims != other.dims {
            return false;
        }

        match self.ty {
            BaseType::Struct => self.name == other.name,
            BaseType::Tuple => {
                self.elems.len() == other.elems.len()
                    && self
                        .elems
                        .iter()
                        .zip(&other.elems)
                        .all(|(a, b)| a.equals(b))
            }
            _ => true,
        }
    }
}

fn layout(fields: Vec<Meta>) -> (Vec<Meta>, u32, u32) {
    let mut offset = 0;
    let mut align = 1;
    let elems = fields
        .into_iter()
        .map(|mut field| {
            offset = align_to(offset, field.align);
            field.offset = offset;
            offset += field.size();
            align = align.max(field.align);
            field
        })
        .collect();

    (elems, align_to(offset, align), align)
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            BaseType::Struct => match &self.name {
                Some(name) => write!(f, "struct {}", name)?,
                None => write!(f, "struct")?,
            },
            BaseType::Tuple => {
                let elems = self
                    .elems
                    .iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({})", elems)?;
            }
            ty => write!(f, "{}", ty)?,
        }

        for dim in &self.dims {
            write!(f, "[{}]", dim)?;
        }
        Ok(())
    }
}
