//! Backend trait for specialized kernel execution
//!
//! A backend is the accelerator execution runtime the kernel cache talks to.
//! It owns device memory, turns a compiled [`KernelImage`] into a launchable
//! [`FunctionHandle`], and launches that handle with a marshalled parameter
//! list.
//!
//! ```text
//! Kernel::invoke
//!   ├── JitCompiler::specialize   (once per signature)
//!   ├── Backend::load_module      (once per signature)
//!   └── Backend::launch           (every call)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use pic_backends::{Backend, CpuBackend};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut backend = CpuBackend::new();
//!
//! let buffer = backend.allocate_buffer(16)?;
//! let data = [1.0f32, 2.0, 3.0, 4.0];
//! backend.copy_to_buffer(buffer, bytemuck::cast_slice(&data))?;
//!
//! let mut out = [0.0f32; 4];
//! backend.copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut out))?;
//! assert_eq!(out, data);
//!
//! backend.free_buffer(buffer)?;
//! # Ok(())
//! # }
//! ```

use super::types::{BackendStats, BufferHandle, FunctionHandle, LaunchConfig};
use crate::error::Result;
use crate::image::KernelImage;
use pic_kernel_runtime::KernelParam;

pub trait Backend {
    /// Short runtime name for logs (`"cpu"`, `"cuda"`).
    fn name(&self) -> &'static str;

    /// Number of devices this runtime can bind to.
    fn device_count(&self) -> Result<usize>;

    /// Bind subsequent allocations and launches to `ordinal`.
    ///
    /// Fails with `InvalidDevice` when `ordinal >= device_count()`.
    fn select_device(&mut self, ordinal: usize) -> Result<()>;

    fn current_device(&self) -> usize;

    /// Marketing name of the bound device, e.g. `"Tesla V100-SXM2-16GB"`.
    fn device_name(&self) -> Result<String>;

    /// Register a compiled image and return its entry point.
    ///
    /// Every call registers a new module; callers deduplicate.
    fn load_module(&mut self, image: &KernelImage) -> Result<FunctionHandle>;

    /// Launch `function` over `config` with an already-marshalled parameter list.
    ///
    /// Device writes made by the launch are visible to the next call on this
    /// backend.
    fn launch(&mut self, function: FunctionHandle, config: &LaunchConfig, params: &[KernelParam]) -> Result<()>;

    /// Allocate `size` bytes of zeroed device memory.
    ///
    /// Fails with `ResourceExhausted` when the device cannot hold it.
    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle>;

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()>;

    /// Copy `data` into the start of the buffer.
    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()>;

    /// Copy the start of the buffer into `data`.
    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()>;

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize>;

    /// Block until all issued work has completed.
    fn synchronize(&mut self) -> Result<()>;

    fn stats(&self) -> BackendStats;

    fn as_any(&self) -> &dyn std::any::Any;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
