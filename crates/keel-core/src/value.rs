//! Tagged values
//!
//! [`Value`] is a fixed-size, `Copy` tagged union over the scalar kinds and the
//! reference kinds. Scalar equality and hashing are defined here; anything that
//! involves an object's type overloads goes through the [`Runtime`].
//!
//! ## Equality
//!
//! Scalars are equal when tag and payload are identical. Floats compare by bit
//! pattern, so `0.0` and `-0.0` differ and a NaN equals itself; this keeps
//! `equals(a, b) ⇒ hash(a) == hash(b)` without special cases.

use std::fmt;

use crate::args::Arguments;
use crate::atom::Atom;
use crate::error::CoreResult;
use crate::object::ObjectRef;
use crate::runtime::Runtime;
use crate::types::TypeRef;

/// Native procedure signature
pub type NativeFn = fn(&mut Runtime, Arguments) -> CoreResult<()>;

/// A foreign procedure callable through the argument stack
#[derive(Clone, Copy)]
pub struct ForeignProc {
    name: &'static str,
    arity: usize,
    func: NativeFn,
}

impl ForeignProc {
    /// Wrap a native function taking exactly `arity` arguments
    pub const fn new(name: &'static str, arity: usize, func: NativeFn) -> Self {
        Self { name, arity, func }
    }

    /// Procedure name (diagnostics only)
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared argument count
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub(crate) fn func(&self) -> NativeFn {
        self.func
    }

    /// Identity of the underlying function
    pub fn address(&self) -> usize {
        self.func as usize
    }
}

impl fmt::Debug for ForeignProc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignProc")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Value tag, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueTag {
    Void = 0,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Nat8,
    Nat16,
    Nat32,
    Nat64,
    Float32,
    Float64,
    Size,
    Object,
    Type,
    Atom,
    Procedure,
}

impl ValueTag {
    /// Every tag, in declaration order
    pub const ALL: [ValueTag; 17] = [
        ValueTag::Void,
        ValueTag::Boolean,
        ValueTag::Int8,
        ValueTag::Int16,
        ValueTag::Int32,
        ValueTag::Int64,
        ValueTag::Nat8,
        ValueTag::Nat16,
        ValueTag::Nat32,
        ValueTag::Nat64,
        ValueTag::Float32,
        ValueTag::Float64,
        ValueTag::Size,
        ValueTag::Object,
        ValueTag::Type,
        ValueTag::Atom,
        ValueTag::Procedure,
    ];

    /// Name of the builtin singleton type for this tag
    pub fn type_name(self) -> &'static str {
        match self {
            ValueTag::Void => "Void",
            ValueTag::Boolean => "Boolean",
            ValueTag::Int8 => "Int8",
            ValueTag::Int16 => "Int16",
            ValueTag::Int32 => "Int32",
            ValueTag::Int64 => "Int64",
            ValueTag::Nat8 => "Nat8",
            ValueTag::Nat16 => "Nat16",
            ValueTag::Nat32 => "Nat32",
            ValueTag::Nat64 => "Nat64",
            ValueTag::Float32 => "Float32",
            ValueTag::Float64 => "Float64",
            ValueTag::Size => "Size",
            ValueTag::Object => "Object",
            ValueTag::Type => "Type",
            ValueTag::Atom => "Atom",
            ValueTag::Procedure => "Procedure",
        }
    }
}

/// A tagged value
#[derive(Debug, Clone, Copy)]
pub enum Value {
    /// No value
    Void,
    /// Boolean
    Boolean(bool),
    /// Signed 8-bit integer
    Int8(i8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 8-bit natural
    Nat8(u8),
    /// Unsigned 16-bit natural
    Nat16(u16),
    /// Unsigned 32-bit natural
    Nat32(u32),
    /// Unsigned 64-bit natural
    Nat64(u64),
    /// Single-precision float
    Float32(f32),
    /// Double-precision float
    Float64(f64),
    /// Size or count; also the argument-stack count marker
    Size(usize),
    /// Reference to a heap object
    Object(ObjectRef),
    /// Reference to a registered type
    Type(TypeRef),
    /// Interned atom
    Atom(Atom),
    /// Foreign procedure
    Procedure(ForeignProc),
}

impl Value {
    /// The value's tag
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Void => ValueTag::Void,
            Value::Boolean(_) => ValueTag::Boolean,
            Value::Int8(_) => ValueTag::Int8,
            Value::Int16(_) => ValueTag::Int16,
            Value::Int32(_) => ValueTag::Int32,
            Value::Int64(_) => ValueTag::Int64,
            Value::Nat8(_) => ValueTag::Nat8,
            Value::Nat16(_) => ValueTag::Nat16,
            Value::Nat32(_) => ValueTag::Nat32,
            Value::Nat64(_) => ValueTag::Nat64,
            Value::Float32(_) => ValueTag::Float32,
            Value::Float64(_) => ValueTag::Float64,
            Value::Size(_) => ValueTag::Size,
            Value::Object(_) => ValueTag::Object,
            Value::Type(_) => ValueTag::Type,
            Value::Atom(_) => ValueTag::Atom,
            Value::Procedure(_) => ValueTag::Procedure,
        }
    }

    /// True for every tag except [`Value::Object`]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Object(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(object) => Some(*object),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeRef> {
        match self {
            Value::Type(ty) => Some(*ty),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_size(&self) -> Option<usize> {
        match self {
            Value::Size(n) => Some(*n),
            _ => None,
        }
    }

    /// Scalar equality; `None` when either side is an object reference
    pub fn scalar_eq(&self, other: &Value) -> Option<bool> {
        let equal = match (self, other) {
            (Value::Object(_), _) | (_, Value::Object(_)) => return None,
            (Value::Void, Value::Void) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int8(a), Value::Int8(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Nat8(a), Value::Nat8(b)) => a == b,
            (Value::Nat16(a), Value::Nat16(b)) => a == b,
            (Value::Nat32(a), Value::Nat32(b)) => a == b,
            (Value::Nat64(a), Value::Nat64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => a.to_bits() == b.to_bits(),
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Size(a), Value::Size(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => a.address() == b.address(),
            _ => false,
        };
        Some(equal)
    }

    /// Scalar hash; `None` for object references
    pub fn scalar_hash(&self) -> Option<u64> {
        let payload = match *self {
            Value::Object(_) => return None,
            Value::Void => 0,
            Value::Boolean(b) => mix32(b as u32) as u64,
            Value::Int8(v) => mix32(v as u8 as u32) as u64,
            Value::Int16(v) => mix32(v as u16 as u32) as u64,
            Value::Int32(v) => mix32(v as u32) as u64,
            Value::Int64(v) => mix64(v as u64),
            Value::Nat8(v) => mix32(v as u32) as u64,
            Value::Nat16(v) => mix32(v as u32) as u64,
            Value::Nat32(v) => mix32(v) as u64,
            Value::Nat64(v) => mix64(v),
            Value::Float32(v) => mix32(v.to_bits()) as u64,
            Value::Float64(v) => mix64(v.to_bits()),
            Value::Size(v) => mix64(v as u64),
            Value::Type(ty) => mix64(ty.to_bits()),
            Value::Atom(atom) => mix32(atom.id()) as u64,
            Value::Procedure(proc) => mix64(proc.address() as u64),
        };
        Some(with_tag(self.tag(), payload))
    }

    /// Scalar ordering for two values of the same tag.
    ///
    /// `None` for objects, mismatched tags, and tags without a natural order.
    /// Floats use IEEE total order, consistent with bitwise equality.
    pub fn scalar_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Void, Value::Void) => Some(std::cmp::Ordering::Equal),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Int8(a), Value::Int8(b)) => Some(a.cmp(b)),
            (Value::Int16(a), Value::Int16(b)) => Some(a.cmp(b)),
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Nat8(a), Value::Nat8(b)) => Some(a.cmp(b)),
            (Value::Nat16(a), Value::Nat16(b)) => Some(a.cmp(b)),
            (Value::Nat32(a), Value::Nat32(b)) => Some(a.cmp(b)),
            (Value::Nat64(a), Value::Nat64(b)) => Some(a.cmp(b)),
            (Value::Float32(a), Value::Float32(b)) => Some(a.total_cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => Some(a.total_cmp(b)),
            (Value::Size(a), Value::Size(b)) => Some(a.cmp(b)),
            (Value::Atom(a), Value::Atom(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Void
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<TypeRef> for Value {
    fn from(ty: TypeRef) -> Self {
        Value::Type(ty)
    }
}

/// 32-bit finalizer (murmur3 fmix32)
#[inline]
pub fn mix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

/// 64-bit finalizer (murmur3 fmix64)
#[inline]
pub fn mix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

#[inline]
fn with_tag(tag: ValueTag, payload: u64) -> u64 {
    payload ^ (tag as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}
