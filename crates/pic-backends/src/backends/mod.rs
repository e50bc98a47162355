//! Backend implementations
//!
//! - `cpu` - host reference runtime, always available
//! - `cuda` - NVIDIA GPUs through `cudarc` (feature `cuda`)

pub mod cpu;
pub mod cuda;

pub use cpu::{CpuBackend, HostFrame};
pub use cuda::CudaBackend;
