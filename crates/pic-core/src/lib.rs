//! Kernel specialization and data residency for particle-in-cell simulations
//!
//! `pic-core` sits between a PIC time-stepping loop and an accelerator
//! runtime. It provides:
//!
//! - **Executor**: one backend plus the JIT compiler that feeds it
//! - **Kernels**: sources compiled lazily, once per argument signature, and
//!   launched through a two-phase configure/invoke interface
//! - **Residency**: field and particle aggregates that move between host and
//!   device as units, with a scope guard that restores their placement
//! - **Device assignment**: round-robin binding of ranks to devices
//! - **Simulation**: the stepping shell that owns the data and drives an
//!   external [`PicCycle`](simulation::PicCycle)
//!
//! ## Architecture
//!
//! ```text
//! pic-core
//!   Simulation ── residency ── device_assignment
//!   Kernel ── SpecializationCache ── JitCompiler
//!   Executor
//!      │
//!      ▼
//! pic-backends (CpuBackend, CudaBackend) ◀── pic-kernel-runtime (signatures, ABI)
//! ```
//!
//! ## Example
//!
//! ```
//! use pic_backends::host_kernel;
//! use pic_core::{Executor, KernelSource};
//!
//! let exec = Executor::new()?;
//! let double = exec.kernel(KernelSource::host(
//!     "double",
//!     host_kernel(|idx, frame| {
//!         let i = idx.global_x() as usize;
//!         if i < frame.len(0)? {
//!             let v: f64 = frame.get(0, &[i])?;
//!             frame.set(0, &[i], 2.0 * v)?;
//!         }
//!         Ok(())
//!     }),
//! ));
//!
//! let x = exec.upload(&[1.0f64, 2.0, 3.0], &[3])?;
//! double.for_units(3)?.invoke(&[x.arg()])?;
//! assert_eq!(exec.download(&x)?, vec![2.0, 4.0, 6.0]);
//! assert_eq!(double.compilations(), 1);
//! # Ok::<(), pic_core::Error>(())
//! ```

pub mod array;
pub mod compiler;
pub mod config;
pub mod device;
pub mod device_assignment;
pub mod error;
pub mod executor;
pub mod kernel;
pub mod residency;
pub mod simulation;

pub use array::{ArrayGroup, DeviceArray, ResidentArray};
pub use compiler::{HostCompiler, JitCompiler};
pub use config::{ExecutorConfig, SimulationConfig};
pub use device::GpuModel;
pub use device_assignment::{device_for_rank, select_device, Communicator, LocalCommunicator, ThreadCommunicator};
pub use error::{Error, Result};
pub use executor::{BackendType, Executor};
pub use kernel::{BoundKernel, Kernel, KernelBody, KernelSource};
pub use residency::{
    receive_data_from_device, send_data_to_device, with_device_residency, DeviceResident, ResidencyGuard,
    ResidencyId, ResidencySet,
};
pub use simulation::{DepositTarget, PicCycle, Simulation, StepContext};

#[cfg(feature = "cuda")]
pub use compiler::NvrtcCompiler;
