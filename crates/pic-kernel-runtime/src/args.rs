//! Typed kernel arguments, as callers hand them to a kernel.

use crate::types::{ElementKind, Scalar};

/// A strided view of device memory passed to a kernel by handle.
///
/// `strides` are in bytes, one per dimension, matching what the marshalled
/// entry point receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayArg {
    pub buffer: u64,
    pub element: ElementKind,
    pub shape: Vec<usize>,
    pub strides: Vec<isize>,
}

impl ArrayArg {
    /// Row-major (C order) array over `buffer`.
    pub fn contiguous(buffer: u64, element: ElementKind, shape: Vec<usize>) -> Self {
        let strides = c_order_strides(&shape, element.itemsize());
        Self {
            buffer,
            element,
            shape,
            strides,
        }
    }

    pub fn with_strides(buffer: u64, element: ElementKind, shape: Vec<usize>, strides: Vec<isize>) -> Self {
        Self {
            buffer,
            element,
            shape,
            strides,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total element count. `None` on overflow.
    pub fn len(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }
}

/// Byte strides of a dense row-major array.
pub fn c_order_strides(shape: &[usize], itemsize: usize) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = itemsize as isize;
    for (stride, &extent) in strides.iter_mut().zip(shape).rev() {
        *stride = step;
        step = step.saturating_mul(extent as isize);
    }
    strides
}

/// One argument of a kernel call.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelArg {
    Scalar(Scalar),
    Array(ArrayArg),
    /// A value a dynamic caller produced that has no kernel representation
    /// (host objects, strings, ...). Always rejected at signature time.
    Unsupported { type_name: String },
}

impl KernelArg {
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        KernelArg::Unsupported {
            type_name: type_name.into(),
        }
    }
}

impl From<Scalar> for KernelArg {
    fn from(value: Scalar) -> Self {
        KernelArg::Scalar(value)
    }
}

impl From<ArrayArg> for KernelArg {
    fn from(value: ArrayArg) -> Self {
        KernelArg::Array(value)
    }
}

macro_rules! impl_scalar_arg {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for KernelArg {
                fn from(value: $ty) -> Self {
                    KernelArg::Scalar(Scalar::from(value))
                }
            }
        )+
    };
}

impl_scalar_arg!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
