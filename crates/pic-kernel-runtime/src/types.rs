//! Element type tags and scalar values.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric type tag of an array element or scalar argument.
///
/// Signatures compare these structurally, so two element types that merely
/// share a byte width (`I64` and `F64`) never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Complex64,
    Complex128,
}

impl ElementKind {
    /// Width of one element in bytes.
    pub const fn itemsize(self) -> usize {
        match self {
            ElementKind::Bool | ElementKind::I8 | ElementKind::U8 => 1,
            ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::U64 | ElementKind::F64 | ElementKind::Complex64 => 8,
            ElementKind::Complex128 => 16,
        }
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            ElementKind::Bool => "b1",
            ElementKind::I8 => "i8",
            ElementKind::I16 => "i16",
            ElementKind::I32 => "i32",
            ElementKind::I64 => "i64",
            ElementKind::U8 => "u8",
            ElementKind::U16 => "u16",
            ElementKind::U32 => "u32",
            ElementKind::U64 => "u64",
            ElementKind::F32 => "f32",
            ElementKind::F64 => "f64",
            ElementKind::Complex64 => "c64",
            ElementKind::Complex128 => "c128",
        }
    }

    /// CUDA C spelling of the type, used when generating entry wrappers.
    pub const fn cuda_type(self) -> &'static str {
        match self {
            ElementKind::Bool => "bool",
            ElementKind::I8 => "signed char",
            ElementKind::I16 => "short",
            ElementKind::I32 => "int",
            ElementKind::I64 => "long long",
            ElementKind::U8 => "unsigned char",
            ElementKind::U16 => "unsigned short",
            ElementKind::U32 => "unsigned int",
            ElementKind::U64 => "unsigned long long",
            ElementKind::F32 => "float",
            ElementKind::F64 => "double",
            ElementKind::Complex64 => "float2",
            ElementKind::Complex128 => "double2",
        }
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, ElementKind::Complex64 | ElementKind::Complex128)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Single-precision complex number with the layout of CUDA `float2`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Complex64 {
    pub re: f32,
    pub im: f32,
}

/// Double-precision complex number with the layout of CUDA `double2`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Complex128 {
    pub re: f64,
    pub im: f64,
}

impl Complex128 {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl Complex64 {
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

/// Types that may back a device array.
///
/// `bool` is deliberately absent: it is a valid scalar argument but has no
/// `Pod` representation, so boolean masks travel as `u8` arrays.
pub trait Element: Pod + Send + Sync + 'static {
    const KIND: ElementKind;

    fn to_scalar(self) -> Scalar;
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;

                fn to_scalar(self) -> Scalar {
                    Scalar::$kind(self)
                }
            }

            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$kind(value)
                }
            }
        )+
    };
}

impl_element!(
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Complex64 => Complex64,
    Complex128 => Complex128,
);

/// A scalar kernel argument. Passed through marshalling unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Complex64(Complex64),
    Complex128(Complex128),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl Scalar {
    pub fn kind(&self) -> ElementKind {
        match self {
            Scalar::Bool(_) => ElementKind::Bool,
            Scalar::I8(_) => ElementKind::I8,
            Scalar::I16(_) => ElementKind::I16,
            Scalar::I32(_) => ElementKind::I32,
            Scalar::I64(_) => ElementKind::I64,
            Scalar::U8(_) => ElementKind::U8,
            Scalar::U16(_) => ElementKind::U16,
            Scalar::U32(_) => ElementKind::U32,
            Scalar::U64(_) => ElementKind::U64,
            Scalar::F32(_) => ElementKind::F32,
            Scalar::F64(_) => ElementKind::F64,
            Scalar::Complex64(_) => ElementKind::Complex64,
            Scalar::Complex128(_) => ElementKind::Complex128,
        }
    }

    /// Append the native-endian bytes of this value, as a launch would pass it.
    pub fn write_ne_bytes(&self, out: &mut Vec<u8>) {
        match *self {
            Scalar::Bool(v) => out.push(u8::from(v)),
            Scalar::I8(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::I16(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::I32(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::I64(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::U8(v) => out.push(v),
            Scalar::U16(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::U32(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::U64(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::F32(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::F64(v) => out.extend_from_slice(&v.to_ne_bytes()),
            Scalar::Complex64(v) => out.extend_from_slice(bytemuck::bytes_of(&v)),
            Scalar::Complex128(v) => out.extend_from_slice(bytemuck::bytes_of(&v)),
        }
    }

    /// Lossy conversion used by host kernels that only need a real number.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Scalar::I8(v) => Some(f64::from(v)),
            Scalar::I16(v) => Some(f64::from(v)),
            Scalar::I32(v) => Some(f64::from(v)),
            Scalar::I64(v) => Some(v as f64),
            Scalar::U8(v) => Some(f64::from(v)),
            Scalar::U16(v) => Some(f64::from(v)),
            Scalar::U32(v) => Some(f64::from(v)),
            Scalar::U64(v) => Some(v as f64),
            Scalar::F32(v) => Some(f64::from(v)),
            Scalar::F64(v) => Some(v),
            Scalar::Bool(_) | Scalar::Complex64(_) | Scalar::Complex128(_) => None,
        }
    }
}
