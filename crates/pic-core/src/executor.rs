//! Executor for managing backend execution
//!
//! The `Executor` pairs one accelerator runtime ([`Backend`]) with the JIT
//! compiler that produces images it can load. Everything above it (kernels,
//! device arrays, residency, device assignment) goes through an executor.
//!
//! ## Architecture
//!
//! ```text
//! pic-core::Kernel ──specialize──▶ JitCompiler (HostCompiler, NvrtcCompiler)
//!        │                               │ KernelImage
//!        ▼                               ▼
//! pic-core::Executor ──delegates to──▶ pic-backends::Backend (CpuBackend, CudaBackend)
//! ```
//!
//! Clones are cheap and share the backend, so a kernel, a simulation and a
//! test harness can all hold the same executor.

use crate::array::DeviceArray;
use crate::compiler::{HostCompiler, JitCompiler};
use crate::config::ExecutorConfig;
use crate::device::GpuModel;
use crate::error::{Error, Result};
use crate::kernel::{Kernel, KernelSource};
use parking_lot::RwLock;
use pic_backends::{Backend, BackendStats, CpuBackend, CudaBackend};
use pic_kernel_runtime::Element;
use pic_tracing::performance::record_transfer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "cuda")]
use crate::compiler::NvrtcCompiler;

/// Backend type for executor initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Host reference backend (always available)
    Cpu,
    /// CUDA backend (NVIDIA GPUs, feature `cuda`)
    Cuda,
    /// CUDA when a device is visible, host otherwise
    Auto,
}

impl FromStr for BackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "host" => Ok(BackendType::Cpu),
            "cuda" | "gpu" => Ok(BackendType::Cuda),
            "auto" => Ok(BackendType::Auto),
            other => Err(Error::Configuration(format!(
                "unknown backend `{other}` (expected cpu, cuda or auto)"
            ))),
        }
    }
}

type SharedBackend = Arc<RwLock<Box<dyn Backend + Send + Sync>>>;

#[derive(Clone)]
pub struct Executor {
    pub(crate) backend: SharedBackend,
    compiler: Arc<dyn JitCompiler>,
    default_tpb: u32,
}

impl Executor {
    /// Create a new executor with the host backend.
    ///
    /// This is equivalent to `Executor::new_with_backend(BackendType::Cpu)`.
    #[tracing::instrument]
    pub fn new() -> Result<Self> {
        Self::new_with_backend(BackendType::Cpu)
    }

    /// Create a new executor with the specified backend and default settings.
    ///
    /// ```
    /// use pic_core::{BackendType, Executor};
    ///
    /// let exec = Executor::new_with_backend(BackendType::Auto)?;
    /// assert!(exec.device_count()? >= 1);
    /// # Ok::<(), pic_core::Error>(())
    /// ```
    #[tracing::instrument]
    pub fn new_with_backend(backend_type: BackendType) -> Result<Self> {
        Self::from_config(&ExecutorConfig {
            backend: backend_type,
            ..ExecutorConfig::default()
        })
    }

    #[tracing::instrument]
    pub fn from_config(config: &ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();

        let (backend, compiler) = match config.backend {
            BackendType::Cpu => host_parts(config),
            BackendType::Cuda => cuda_parts()?,
            BackendType::Auto => {
                if CudaBackend::is_available() {
                    tracing::info!("Auto-selected CUDA backend");
                    cuda_parts()?
                } else {
                    tracing::info!("Auto-selected CPU backend");
                    host_parts(config)
                }
            }
        };

        let exec = Self {
            backend: Arc::new(RwLock::new(backend)),
            compiler,
            default_tpb: config.default_tpb,
        };

        let duration_us = start.elapsed().as_micros() as u64;
        tracing::debug!(
            duration_us = duration_us,
            backend = ?config.backend,
            compiler = exec.compiler.name(),
            "executor_created"
        );
        exec.log_device();
        Ok(exec)
    }

    /// Assemble an executor from an existing backend and compiler.
    ///
    /// Tests keep a clone of a [`CpuBackend`] to inspect its counters.
    pub fn from_parts<B, C>(backend: B, compiler: C) -> Self
    where
        B: Backend + Send + Sync + 'static,
        C: JitCompiler + 'static,
    {
        Self {
            backend: Arc::new(RwLock::new(Box::new(backend))),
            compiler: Arc::new(compiler),
            default_tpb: pic_backends::DEFAULT_TPB_1D,
        }
    }

    /// Override the threads per block used by `Kernel::for_units`.
    pub fn with_default_tpb(mut self, tpb: u32) -> Result<Self> {
        if tpb == 0 {
            return Err(Error::Configuration("default_tpb must be positive".into()));
        }
        self.default_tpb = tpb;
        Ok(self)
    }

    fn log_device(&self) {
        let backend = self.backend.read();
        match backend.device_name() {
            Ok(name) => tracing::info!(
                backend = backend.name(),
                device = backend.current_device(),
                name = %name,
                model = %GpuModel::from_device_name(&name),
                "device_bound"
            ),
            Err(e) => tracing::debug!(backend = backend.name(), error = %e, "device name unavailable"),
        }
    }

    /// Wrap a kernel source; the returned [`Kernel`] owns its own
    /// specialization cache.
    pub fn kernel(&self, source: KernelSource) -> Kernel {
        Kernel::new(source, self.clone())
    }

    /// Name of the active backend, e.g. `"cpu"`.
    pub fn backend_name(&self) -> &'static str {
        self.backend.read().name()
    }

    pub(crate) fn compiler(&self) -> &dyn JitCompiler {
        self.compiler.as_ref()
    }

    /// Name of the JIT compiler kernels are specialized with.
    pub fn compiler_name(&self) -> &'static str {
        self.compiler.name()
    }

    /// Threads per block for 1D launches sized by unit count.
    pub fn default_tpb(&self) -> u32 {
        self.default_tpb
    }

    /// Devices visible to the backend.
    pub fn device_count(&self) -> Result<usize> {
        Ok(self.backend.read().device_count()?)
    }

    /// Bind this process to `ordinal`.
    pub fn select_device(&self, ordinal: usize) -> Result<()> {
        self.backend.write().select_device(ordinal)?;
        self.log_device();
        Ok(())
    }

    /// Ordinal of the bound device.
    pub fn current_device(&self) -> usize {
        self.backend.read().current_device()
    }

    /// Marketing name of the bound device.
    pub fn device_name(&self) -> Result<String> {
        Ok(self.backend.read().device_name()?)
    }

    /// GPU model of the bound device, from its name.
    pub fn gpu_model(&self) -> Result<GpuModel> {
        Ok(GpuModel::from_device_name(&self.device_name()?))
    }

    /// Snapshot of the backend's transfer and launch counters.
    pub fn stats(&self) -> BackendStats {
        self.backend.read().stats()
    }

    /// Wait for outstanding device work.
    pub fn synchronize(&self) -> Result<()> {
        Ok(self.backend.write().synchronize()?)
    }

    pub(crate) fn with_backend<R>(&self, f: impl FnOnce(&mut (dyn Backend + Send + Sync)) -> R) -> R {
        let mut backend = self.backend.write();
        f(backend.as_mut())
    }

    /// Copy a host slice into a new device array of the given shape.
    ///
    /// The device allocation is released again if the copy fails.
    pub fn upload<T: Element>(&self, data: &[T], shape: &[usize]) -> Result<DeviceArray<T>> {
        let len = element_count(shape)?;
        if len != data.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }

        let start = Instant::now();
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let handle = self.with_backend(|backend| -> Result<_> {
            let handle = backend.allocate_buffer(bytes.len())?;
            if let Err(e) = backend.copy_to_buffer(handle, bytes) {
                if let Err(free_err) = backend.free_buffer(handle) {
                    tracing::warn!(buffer = %handle, error = %free_err, "failed to release buffer after copy error");
                }
                return Err(e.into());
            }
            Ok(handle)
        })?;
        record_transfer(bytes.len(), "h2d", start.elapsed().as_micros() as u64);

        Ok(DeviceArray::new(handle, shape.to_vec()))
    }

    /// A zero-filled device array.
    pub fn zeros<T: Element>(&self, shape: &[usize]) -> Result<DeviceArray<T>> {
        let len = element_count(shape)?;
        let nbytes = len
            .checked_mul(T::KIND.itemsize())
            .ok_or_else(|| Error::InvalidArgument(format!("array of shape {shape:?} overflows")))?;
        let handle = self.with_backend(|backend| backend.allocate_buffer(nbytes))?;
        Ok(DeviceArray::new(handle, shape.to_vec()))
    }

    /// Copy a device array back into a new host vector.
    pub fn download<T: Element>(&self, array: &DeviceArray<T>) -> Result<Vec<T>> {
        let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); array.len()];
        self.download_into(array, &mut out)?;
        Ok(out)
    }

    /// Copy a device array into `out`, which must have the same length.
    pub fn download_into<T: Element>(&self, array: &DeviceArray<T>, out: &mut [T]) -> Result<()> {
        if out.len() != array.len() {
            return Err(Error::ShapeMismatch {
                expected: array.shape().to_vec(),
                actual: vec![out.len()],
            });
        }
        let start = Instant::now();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        let nbytes = bytes.len();
        self.with_backend(|backend| backend.copy_from_buffer(array.handle(), bytes))?;
        record_transfer(nbytes, "d2h", start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Release a device array.
    pub fn free<T: Element>(&self, array: DeviceArray<T>) -> Result<()> {
        Ok(self.with_backend(|backend| backend.free_buffer(array.handle()))?)
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("backend", &self.backend_name())
            .field("compiler", &self.compiler.name())
            .field("default_tpb", &self.default_tpb)
            .finish()
    }
}

fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::InvalidArgument(format!("array of shape {shape:?} overflows")))
}

type Parts = (Box<dyn Backend + Send + Sync>, Arc<dyn JitCompiler>);

fn host_parts(config: &ExecutorConfig) -> Parts {
    let mut backend = CpuBackend::with_devices(config.virtual_devices);
    if let Some(limit) = config.device_memory_limit {
        backend = backend.with_memory_limit(limit);
    }
    (Box::new(backend), Arc::new(HostCompiler::new()))
}

#[cfg(feature = "cuda")]
fn cuda_parts() -> Result<Parts> {
    let backend = CudaBackend::new().map_err(|e| Error::Configuration(format!("failed to create CUDA backend: {e}")))?;
    Ok((Box::new(backend), Arc::new(NvrtcCompiler::new())))
}

#[cfg(not(feature = "cuda"))]
fn cuda_parts() -> Result<Parts> {
    Err(Error::Configuration(
        "CUDA backend requires the `cuda` feature to be enabled".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pic_kernel_runtime::Complex128;

    #[test]
    fn backend_type_parses_case_insensitively() {
        assert_eq!("CPU".parse::<BackendType>().unwrap(), BackendType::Cpu);
        assert_eq!("cuda".parse::<BackendType>().unwrap(), BackendType::Cuda);
        assert_eq!("Auto".parse::<BackendType>().unwrap(), BackendType::Auto);
        assert!("opencl".parse::<BackendType>().is_err());
    }

    #[test]
    fn host_executor_reports_virtual_devices() {
        let exec = Executor::from_config(&ExecutorConfig {
            virtual_devices: 3,
            ..ExecutorConfig::default()
        })
        .unwrap();
        assert_eq!(exec.backend_name(), "cpu");
        assert_eq!(exec.compiler_name(), "host");
        assert_eq!(exec.device_count().unwrap(), 3);
        assert_eq!(exec.gpu_model().unwrap(), GpuModel::Other);

        exec.select_device(2).unwrap();
        assert_eq!(exec.current_device(), 2);
        assert!(exec.select_device(3).is_err());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn cuda_without_feature_is_a_configuration_error() {
        let err = Executor::new_with_backend(BackendType::Cuda).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(Executor::new_with_backend(BackendType::Auto).unwrap().backend_name(), "cpu");
    }

    #[test]
    fn upload_download_round_trip() {
        let exec = Executor::new().unwrap();
        let data: Vec<Complex128> = (0..6).map(|i| Complex128::new(i as f64, -(i as f64))).collect();
        let array = exec.upload(&data, &[2, 3]).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(exec.download(&array).unwrap(), data);
        exec.free(array).unwrap();
    }

    #[test]
    fn upload_rejects_wrong_shape() {
        let exec = Executor::new().unwrap();
        let err = exec.upload(&[1.0f64, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(exec.stats().allocations, 0);
    }

    #[test]
    fn upload_past_memory_limit_allocates_nothing() {
        let backend = CpuBackend::new().with_memory_limit(64);
        let observer = backend.clone();
        let exec = Executor::from_parts(backend, HostCompiler::new());

        let err = exec.upload(&[0.0f64; 16], &[16]).unwrap_err();
        assert!(err.is_resource_exhausted());
        assert_eq!(observer.live_buffers(), 0);
    }

    #[test]
    fn zero_default_tpb_is_rejected() {
        let exec = Executor::new().unwrap();
        assert!(exec.clone().with_default_tpb(0).is_err());
        assert_eq!(exec.with_default_tpb(64).unwrap().default_tpb(), 64);
    }
}
