//! Accelerator runtimes for specialized kernels
//!
//! This crate provides:
//! - **Backend trait**: device binding, memory, module loading and launch
//! - **Launch geometry**: block counts for a requested number of parallel units
//! - **CPU backend**: host reference runtime that runs [`KernelImage::Host`] kernels
//! - **CUDA backend**: PTX modules on NVIDIA GPUs (feature `cuda`)
//!
//! # Usage
//!
//! ```rust
//! use pic_backends::{host_kernel, launch, Backend, CpuBackend, KernelImage};
//! use pic_kernel_runtime::{marshal_args, ArgumentSignature, ArrayArg, ElementKind, KernelArg};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//! let buffer = backend.allocate_buffer(8 * 100)?;
//! let args = [KernelArg::Array(ArrayArg::contiguous(buffer.id(), ElementKind::F64, vec![100]))];
//!
//! let fill = backend.load_module(&KernelImage::Host {
//!     entry: "fill".into(),
//!     signature: ArgumentSignature::of(&args)?,
//!     body: host_kernel(|idx, frame| {
//!         let i = idx.global_x() as usize;
//!         if i < frame.len(0)? {
//!             frame.set(0, &[i], 1.0f64)?;
//!         }
//!         Ok(())
//!     }),
//! })?;
//!
//! let config = launch::LaunchGeometry::for_units_1d(100, launch::DEFAULT_TPB_1D)?;
//! backend.launch(fill, &config, &marshal_args(&args)?)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod backends;
pub mod error;
pub mod image;
pub mod launch;

pub use backend::{
    Backend, BackendStats, BlockDim, BufferHandle, FunctionHandle, GridDim, LaunchConfig, SharedMemoryConfig,
    ThreadIndex,
};
pub use backends::{CpuBackend, CudaBackend, HostFrame};
pub use error::{BackendError, Result};
pub use image::{host_kernel, HostKernelFn, KernelImage};
pub use launch::{blocks_per_grid_1d, blocks_per_grid_2d, LaunchGeometry, DEFAULT_TPB_1D, DEFAULT_TPB_2D};
