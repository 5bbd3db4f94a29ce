//! Value and memory types of the loop IR.
//!
//! Only what the access analysis needs is modelled: the allocation size of an
//! accessed element, whether it is an aggregate, and which address space a
//! pointer lives in.

use std::fmt;

// =============================================================================
// Memory Types
// =============================================================================

/// Type of a value stored in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemType {
    /// Integer of the given bit width.
    Int(u16),
    /// IEEE float of the given bit width (16, 32, 64).
    Float(u16),
    /// A pointer stored in memory.
    Ptr,
    /// Fixed-length array.
    Array { elem: Box<MemType>, len: u64 },
    /// Struct with the given field types.
    Struct(Vec<MemType>),
}

impl MemType {
    pub const I8: MemType = MemType::Int(8);
    pub const I16: MemType = MemType::Int(16);
    pub const I32: MemType = MemType::Int(32);
    pub const I64: MemType = MemType::Int(64);
    pub const F32: MemType = MemType::Float(32);
    pub const F64: MemType = MemType::Float(64);

    /// Size in bytes of one element when laid out in an array.
    pub fn alloc_size(&self) -> u64 {
        match self {
            MemType::Int(bits) | MemType::Float(bits) => {
                let bytes = u64::from(*bits).div_ceil(8).max(1);
                bytes.next_power_of_two()
            }
            MemType::Ptr => 8,
            MemType::Array { elem, len } => elem.alloc_size() * len,
            MemType::Struct(fields) => {
                let mut size = 0u64;
                let mut align = 1u64;
                for field in fields {
                    let field_align = field.alignment();
                    size = size.next_multiple_of(field_align) + field.alloc_size();
                    align = align.max(field_align);
                }
                size.next_multiple_of(align)
            }
        }
    }

    /// ABI alignment in bytes.
    pub fn alignment(&self) -> u64 {
        match self {
            MemType::Array { elem, .. } => elem.alignment(),
            MemType::Struct(fields) => fields.iter().map(MemType::alignment).max().unwrap_or(1),
            scalar => scalar.alloc_size(),
        }
    }

    /// Arrays and structs.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, MemType::Array { .. } | MemType::Struct(_))
    }
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemType::Int(bits) => write!(f, "i{bits}"),
            MemType::Float(16) => f.write_str("half"),
            MemType::Float(32) => f.write_str("float"),
            MemType::Float(64) => f.write_str("double"),
            MemType::Float(bits) => write!(f, "f{bits}"),
            MemType::Ptr => f.write_str("ptr"),
            MemType::Array { elem, len } => write!(f, "[{len} x {elem}]"),
            MemType::Struct(fields) => {
                f.write_str("{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// Type of an SSA value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Integer of the given bit width.
    Int(u16),
    /// Typed pointer into an address space.
    Ptr { pointee: MemType, addr_space: u32 },
}

impl ValueType {
    /// Pointer to `pointee` in the default address space.
    pub fn ptr(pointee: MemType) -> Self {
        ValueType::Ptr {
            pointee,
            addr_space: 0,
        }
    }

    /// Pointer to `pointee` in `addr_space`.
    pub fn ptr_in(pointee: MemType, addr_space: u32) -> Self {
        ValueType::Ptr {
            pointee,
            addr_space,
        }
    }

    #[inline]
    pub fn is_pointer(&self) -> bool {
        matches!(self, ValueType::Ptr { .. })
    }

    /// Pointee type, if this is a pointer.
    pub fn pointee(&self) -> Option<&MemType> {
        match self {
            ValueType::Ptr { pointee, .. } => Some(pointee),
            ValueType::Int(_) => None,
        }
    }

    /// Address space of a pointer. Integers report the default space.
    pub fn addr_space(&self) -> u32 {
        match self {
            ValueType::Ptr { addr_space, .. } => *addr_space,
            ValueType::Int(_) => 0,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int(bits) => write!(f, "i{bits}"),
            ValueType::Ptr {
                pointee,
                addr_space: 0,
            } => write!(f, "{pointee}*"),
            ValueType::Ptr {
                pointee,
                addr_space,
            } => write!(f, "{pointee} addrspace({addr_space})*"),
        }
    }
}
