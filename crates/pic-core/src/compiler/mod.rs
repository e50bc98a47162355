//! JIT compilers: turn a kernel source plus one argument signature into a
//! loadable [`KernelImage`].
//!
//! ```text
//! KernelSource + ArgumentSignature
//!     ├── HostCompiler   → KernelImage::Host  (host reference backend)
//!     └── NvrtcCompiler  → KernelImage::Ptx   (CUDA backend, feature `cuda`)
//! ```
//!
//! Compilers are stateless; the per-kernel specialization cache decides when
//! one is invoked.

mod host;
mod nvrtc;

pub use host::{HostCompiler, MAX_SPECIALIZED_RANK};
pub use nvrtc::generate_entry_source;

#[cfg(feature = "cuda")]
pub use nvrtc::NvrtcCompiler;

use crate::error::{Error, Result};
use crate::kernel::KernelSource;
use pic_backends::KernelImage;
use pic_kernel_runtime::ArgumentSignature;

pub trait JitCompiler: Send + Sync {
    /// Short name for logs (`"host"`, `"nvrtc"`).
    fn name(&self) -> &'static str;

    /// Produce an image of `source` specialized for exactly `signature`.
    ///
    /// Fails with [`Error::Specialization`] when the source cannot be
    /// compiled for these argument kinds.
    fn specialize(&self, source: &KernelSource, signature: &ArgumentSignature) -> Result<KernelImage>;
}

/// Name of the entry point generated for one specialization,
/// e.g. `deposit_rho__c128a2_f64a1_i32`.
pub fn entry_name(kernel: &str, signature: &ArgumentSignature) -> String {
    format!("{kernel}__{}", signature.mangled())
}

pub(crate) fn specialization_error(
    source: &KernelSource,
    signature: &ArgumentSignature,
    reason: impl std::fmt::Display,
) -> Error {
    Error::Specialization {
        kernel: source.name().to_string(),
        signature: signature.to_string(),
        reason: reason.to_string(),
    }
}

/// Checks shared by every compiler.
pub(crate) fn check_arity(source: &KernelSource, signature: &ArgumentSignature) -> Result<()> {
    match source.arity() {
        Some(arity) if arity != signature.len() => Err(specialization_error(
            source,
            signature,
            format!("kernel takes {arity} arguments, {} given", signature.len()),
        )),
        _ => Ok(()),
    }
}
