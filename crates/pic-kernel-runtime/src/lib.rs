//! Argument ABI shared by the kernel cache, the JIT compilers and the backends.
//!
//! A kernel call is described twice: once as typed [`KernelArg`]s, from which
//! the [`ArgumentSignature`] cache key is derived, and once as the flat
//! [`KernelParam`] list a compiled entry point actually receives.
//! [`marshal_args`] produces the latter and [`Unmarshaller`] reads it back.

pub mod abi;
pub mod args;
pub mod error;
pub mod marshal;
pub mod signature;
pub mod types;
pub mod unmarshaller;

pub use abi::{params_per_arg, KernelParam, ABI_VERSION, ARRAY_HEADER_PARAMS};
pub use args::{ArrayArg, KernelArg};
pub use error::{AbiError, Result};
pub use marshal::marshal_args;
pub use signature::{ArgKind, ArgumentSignature, MAX_ARRAY_RANK};
pub use types::{Complex128, Complex64, Element, ElementKind, Scalar};
pub use unmarshaller::{ArrayView, UnmarshalledArg, Unmarshaller};
