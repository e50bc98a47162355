//! Compiled kernel images handed from a JIT compiler to a backend.

use crate::backend::ThreadIndex;
use crate::backends::cpu::HostFrame;
use crate::error::Result;
use pic_kernel_runtime::ArgumentSignature;
use std::fmt;
use std::sync::Arc;

/// Per-thread body of a host kernel.
pub type HostKernelFn = Arc<dyn Fn(ThreadIndex, &mut HostFrame<'_>) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`HostKernelFn`], letting the compiler infer its
/// argument types.
pub fn host_kernel<F>(body: F) -> HostKernelFn
where
    F: Fn(ThreadIndex, &mut HostFrame<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(body)
}

#[derive(Clone)]
pub enum KernelImage {
    /// PTX text with one `.entry` named `entry`.
    Ptx { entry: String, ptx: String },
    /// A host closure specialized for exactly one signature.
    Host {
        entry: String,
        signature: ArgumentSignature,
        body: HostKernelFn,
    },
}

impl KernelImage {
    pub fn entry(&self) -> &str {
        match self {
            KernelImage::Ptx { entry, .. } | KernelImage::Host { entry, .. } => entry,
        }
    }
}

impl fmt::Debug for KernelImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelImage::Ptx { entry, ptx } => f
                .debug_struct("Ptx")
                .field("entry", entry)
                .field("ptx_bytes", &ptx.len())
                .finish(),
            KernelImage::Host { entry, signature, .. } => f
                .debug_struct("Host")
                .field("entry", entry)
                .field("signature", &signature.to_string())
                .finish_non_exhaustive(),
        }
    }
}
