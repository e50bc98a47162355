//! Host reference backend
//!
//! Runs [`KernelImage::Host`] kernels on the calling thread by visiting every
//! block and thread of the launch in order, and keeps "device" buffers in
//! host memory. It models what the orchestration layer needs from a real
//! accelerator runtime: several bindable devices, a finite memory capacity,
//! and counters for transfers, module loads and launches.
//!
//! ```text
//! CpuBackend
//! ├── MemoryManager  - buffers keyed by handle, optional capacity
//! ├── modules        - loaded host kernels, indexed by FunctionHandle
//! └── stats          - BackendStats shared by every clone
//! ```
//!
//! Clones share memory, modules and stats, so a test can keep a clone to
//! inspect counters after handing the backend to an executor.

mod frame;
pub(crate) mod memory;

pub use frame::HostFrame;

use crate::backend::{Backend, BackendStats, BufferHandle, FunctionHandle, LaunchConfig, ThreadIndex};
use crate::error::{BackendError, Result};
use crate::image::{HostKernelFn, KernelImage};
use memory::MemoryManager;
use parking_lot::{Mutex, RwLock};
use pic_kernel_runtime::{ArgumentSignature, KernelParam, Unmarshaller};
use std::sync::Arc;

struct HostModule {
    entry: String,
    signature: ArgumentSignature,
    body: HostKernelFn,
}

#[derive(Clone)]
pub struct CpuBackend {
    memory: Arc<RwLock<MemoryManager>>,
    modules: Arc<RwLock<Vec<Arc<HostModule>>>>,
    stats: Arc<Mutex<BackendStats>>,
    device_count: usize,
    current_device: usize,
}

impl CpuBackend {
    /// A backend exposing one device with unbounded memory.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    /// A backend exposing `count` devices. Zero is allowed and models a
    /// machine without accelerators.
    pub fn with_devices(count: usize) -> Self {
        Self {
            memory: Arc::new(RwLock::new(MemoryManager::new())),
            modules: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(Mutex::new(BackendStats::default())),
            device_count: count,
            current_device: 0,
        }
    }

    /// Cap total device memory at `bytes`.
    pub fn with_memory_limit(self, bytes: usize) -> Self {
        *self.memory.write() = MemoryManager::with_capacity_limit(Some(bytes));
        self
    }

    pub fn live_buffers(&self) -> usize {
        self.memory.read().live_buffers()
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn device_count(&self) -> Result<usize> {
        Ok(self.device_count)
    }

    fn select_device(&mut self, ordinal: usize) -> Result<()> {
        if ordinal >= self.device_count {
            return Err(BackendError::InvalidDevice {
                ordinal,
                count: self.device_count,
            });
        }
        self.current_device = ordinal;
        Ok(())
    }

    fn current_device(&self) -> usize {
        self.current_device
    }

    fn device_name(&self) -> Result<String> {
        Ok(format!("Host reference device {}", self.current_device))
    }

    fn load_module(&mut self, image: &KernelImage) -> Result<FunctionHandle> {
        match image {
            KernelImage::Host { entry, signature, body } => {
                let mut modules = self.modules.write();
                modules.push(Arc::new(HostModule {
                    entry: entry.clone(),
                    signature: signature.clone(),
                    body: Arc::clone(body),
                }));
                self.stats.lock().modules_loaded += 1;
                Ok(FunctionHandle::new(modules.len() as u64))
            }
            KernelImage::Ptx { entry, .. } => Err(BackendError::ModuleLoad {
                entry: entry.clone(),
                reason: "PTX images require the cuda backend".to_string(),
            }),
        }
    }

    fn launch(&mut self, function: FunctionHandle, config: &LaunchConfig, params: &[KernelParam]) -> Result<()> {
        config.validate()?;
        let module = function
            .id()
            .checked_sub(1)
            .and_then(|index| self.modules.read().get(index as usize).cloned())
            .ok_or(BackendError::InvalidFunctionHandle(function.id()))?;

        let args = Unmarshaller::unmarshal_all(params, &module.signature)?;

        let mut memory = self.memory.write();
        let mut frame = HostFrame::new(&module.entry, &args, &mut memory);
        let (grid, block) = (config.grid, config.block);
        for bz in 0..grid.z {
            for by in 0..grid.y {
                for bx in 0..grid.x {
                    for tz in 0..block.z {
                        for ty in 0..block.y {
                            for tx in 0..block.x {
                                let index = ThreadIndex::new((bx, by, bz), (tx, ty, tz), grid, block);
                                (module.body)(index, &mut frame)?;
                            }
                        }
                    }
                }
            }
        }

        self.stats.lock().launches += 1;
        tracing::trace!(entry = %module.entry, %config, "host_kernel_complete");
        Ok(())
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let mut memory = self.memory.write();
        let handle = memory.allocate_buffer(size)?;
        let mut stats = self.stats.lock();
        stats.allocations += 1;
        stats.bytes_in_use = memory.bytes_in_use() as u64;
        Ok(handle)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let mut memory = self.memory.write();
        memory.free_buffer(handle)?;
        self.stats.lock().bytes_in_use = memory.bytes_in_use() as u64;
        Ok(())
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.write().copy_to_buffer(handle, data)?;
        self.stats.lock().record_h2d(data.len());
        Ok(())
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.read().copy_from_buffer(handle, data)?;
        self.stats.lock().record_d2h(data.len());
        Ok(())
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.read().buffer_size(handle)
    }

    fn synchronize(&mut self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        *self.stats.lock()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::host_kernel;
    use pic_kernel_runtime::{marshal_args, ArrayArg, ElementKind, KernelArg};

    fn scale_kernel() -> KernelImage {
        let args = [
            KernelArg::Array(ArrayArg::contiguous(0, ElementKind::F32, vec![1])),
            KernelArg::from(0.0f64),
        ];
        let body = host_kernel(|idx, frame| {
            let i = idx.global_x() as usize;
            if i < frame.len(0)? {
                let factor = frame.scalar_f64(1)? as f32;
                let v: f32 = frame.get(0, &[i])?;
                frame.set(0, &[i], v * factor)?;
            }
            Ok(())
        });
        KernelImage::Host {
            entry: "scale".to_string(),
            signature: ArgumentSignature::of(&args).unwrap(),
            body,
        }
    }

    #[test]
    fn test_buffer_copy_counts_transfers() {
        let mut backend = CpuBackend::new();
        let buffer = backend.allocate_buffer(16).unwrap();

        let data = [1.0f32, 2.0, 3.0, 4.0];
        backend.copy_to_buffer(buffer, bytemuck::cast_slice(&data)).unwrap();
        let mut out = [0.0f32; 4];
        backend
            .copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut out))
            .unwrap();

        assert_eq!(out, data);
        let stats = backend.stats();
        assert_eq!(stats.h2d_transfers, 1);
        assert_eq!(stats.d2h_bytes, 16);
        assert_eq!(stats.bytes_in_use, 16);
    }

    #[test]
    fn test_launch_host_kernel_with_over_provisioned_grid() {
        let mut backend = CpuBackend::new();
        let function = backend.load_module(&scale_kernel()).unwrap();

        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let buffer = backend.allocate_buffer(40).unwrap();
        backend.copy_to_buffer(buffer, bytemuck::cast_slice(&data)).unwrap();

        let args = [
            KernelArg::Array(ArrayArg::contiguous(buffer.id(), ElementKind::F32, vec![10])),
            KernelArg::from(2.0f64),
        ];
        let params = marshal_args(&args).unwrap();
        // floor(10 / 4) + 1 = 3 blocks, two idle threads
        backend
            .launch(function, &LaunchConfig::one_d(3, 4), &params)
            .unwrap();

        let mut out = vec![0.0f32; 10];
        backend
            .copy_from_buffer(buffer, bytemuck::cast_slice_mut(&mut out))
            .unwrap();
        assert_eq!(out, (0..10).map(|i| 2.0 * i as f32).collect::<Vec<_>>());
        assert_eq!(backend.stats().launches, 1);
    }

    #[test]
    fn test_launch_rejects_unknown_function() {
        let mut backend = CpuBackend::new();
        let err = backend
            .launch(FunctionHandle::new(5), &LaunchConfig::one_d(1, 1), &[])
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidFunctionHandle(5)));
    }

    #[test]
    fn test_ptx_images_are_rejected() {
        let mut backend = CpuBackend::new();
        let image = KernelImage::Ptx {
            entry: "k".to_string(),
            ptx: String::new(),
        };
        assert!(matches!(backend.load_module(&image), Err(BackendError::ModuleLoad { .. })));
    }

    #[test]
    fn test_device_selection_bounds() {
        let mut backend = CpuBackend::with_devices(2);
        backend.select_device(1).unwrap();
        assert_eq!(backend.current_device(), 1);
        assert!(matches!(
            backend.select_device(2),
            Err(BackendError::InvalidDevice { ordinal: 2, count: 2 })
        ));
        assert_eq!(CpuBackend::with_devices(0).device_count().unwrap(), 0);
    }

    #[test]
    fn test_clones_share_memory_and_stats() {
        let backend = CpuBackend::new().with_memory_limit(64);
        let mut clone = backend.clone();
        clone.allocate_buffer(64).unwrap();
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.stats().allocations, 1);
        assert!(clone.allocate_buffer(1).unwrap_err().is_resource_exhausted());
    }
}
