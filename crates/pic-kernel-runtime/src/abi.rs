//! Flat parameter layout of a compiled kernel entry point.
//!
//! Every array argument of rank `r` occupies `5 + 2r` consecutive params:
//!
//! ```text
//! Null, Null, Int(len), Int(itemsize), Buffer(id), extent_0..extent_r, stride_0..stride_r
//! ```
//!
//! The two leading `Null`s stand where the compiled convention keeps its
//! memory-info and parent pointers; nothing reads them. Strides are bytes.
//! Scalars occupy a single param.

use crate::signature::ArgKind;
use crate::types::Scalar;
use std::fmt;

/// Layout revision of the marshalled parameter list.
pub const ABI_VERSION: u32 = 1;

/// Params emitted for an array before its extents and strides.
pub const ARRAY_HEADER_PARAMS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelParam {
    Null,
    Int(i64),
    Scalar(Scalar),
    Buffer(u64),
}

impl KernelParam {
    pub(crate) fn describe(&self) -> String {
        match self {
            KernelParam::Null => "null".to_string(),
            KernelParam::Int(v) => format!("int {v}"),
            KernelParam::Scalar(s) => format!("{} scalar", s.kind()),
            KernelParam::Buffer(id) => format!("buffer {id}"),
        }
    }
}

impl fmt::Display for KernelParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Number of params an argument of this kind expands to.
pub const fn params_per_arg(kind: &ArgKind) -> usize {
    match *kind {
        ArgKind::Scalar(_) => 1,
        ArgKind::Array { rank, .. } => ARRAY_HEADER_PARAMS + 2 * rank as usize,
    }
}
