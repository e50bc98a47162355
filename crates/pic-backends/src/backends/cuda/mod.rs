//! CUDA backend for NVIDIA GPUs
//!
//! Loads PTX produced by the NVRTC compiler and launches it with the
//! marshalled parameter list. Each parameter is copied into a 16-byte slot
//! and the driver receives one pointer per slot, so the kernel's parameter
//! list must follow the marshalled layout exactly (`void*` for the two
//! placeholders, `long long` for counts, extents and strides, a typed pointer
//! for the buffer).
//!
//! ```text
//! CudaBackend
//! ├── CudaDevice         - bound GPU (one per process)
//! ├── CudaMemoryManager  - device buffers keyed by handle
//! └── functions          - loaded entry points keyed by FunctionHandle
//! ```

mod memory;

use crate::error::{BackendError, Result};

#[cfg(feature = "cuda")]
use crate::backend::{Backend, BackendStats, BufferHandle, FunctionHandle, LaunchConfig};
#[cfg(feature = "cuda")]
use crate::image::KernelImage;
#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaFunction, LaunchAsync, LaunchConfig as CudaLaunchConfig};
#[cfg(feature = "cuda")]
use cudarc::nvrtc::Ptx;
#[cfg(feature = "cuda")]
use memory::CudaMemoryManager;
#[cfg(feature = "cuda")]
use pic_kernel_runtime::KernelParam;
#[cfg(feature = "cuda")]
use std::collections::HashMap;
#[cfg(feature = "cuda")]
use std::ffi::c_void;
#[cfg(feature = "cuda")]
use std::sync::Arc;

#[cfg(feature = "cuda")]
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    ordinal: usize,
    memory: CudaMemoryManager,
    functions: HashMap<u64, CudaFunction>,
    next_function_id: u64,
    stats: BackendStats,
}

#[cfg(feature = "cuda")]
impl CudaBackend {
    /// Bind device 0.
    pub fn new() -> Result<Self> {
        Self::on_device(0)
    }

    pub fn on_device(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal)
            .map_err(|e| BackendError::Other(format!("CUDA device {ordinal} initialization failed: {e}")))?;
        let memory = CudaMemoryManager::new(Arc::clone(&device));
        Ok(Self {
            device,
            ordinal,
            memory,
            functions: HashMap::new(),
            next_function_id: 1,
            stats: BackendStats::default(),
        })
    }

    pub fn is_available() -> bool {
        Self::visible_devices() > 0
    }

    pub fn visible_devices() -> usize {
        CudaDevice::count().map(|n| n.max(0) as usize).unwrap_or(0)
    }

    fn encode_param(&self, param: &KernelParam) -> Result<[u64; 2]> {
        let mut slot = [0u64; 2];
        match *param {
            KernelParam::Null => {}
            KernelParam::Int(v) => slot[0] = v as u64,
            KernelParam::Buffer(id) => slot[0] = self.memory.device_ptr(id)?,
            KernelParam::Scalar(scalar) => {
                let mut bytes = Vec::with_capacity(16);
                scalar.write_ne_bytes(&mut bytes);
                bytemuck::cast_slice_mut::<u64, u8>(&mut slot)[..bytes.len()].copy_from_slice(&bytes);
            }
        }
        Ok(slot)
    }
}

#[cfg(feature = "cuda")]
impl Backend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn device_count(&self) -> Result<usize> {
        CudaDevice::count()
            .map(|n| n.max(0) as usize)
            .map_err(|e| BackendError::Other(format!("CUDA device count failed: {e}")))
    }

    fn select_device(&mut self, ordinal: usize) -> Result<()> {
        if ordinal == self.ordinal {
            return Ok(());
        }
        let count = self.device_count()?;
        if ordinal >= count {
            return Err(BackendError::InvalidDevice { ordinal, count });
        }
        if self.memory.live_buffers() > 0 || !self.functions.is_empty() {
            return Err(BackendError::unsupported(
                "cannot rebind a CUDA backend that already holds buffers or modules",
            ));
        }
        *self = Self::on_device(ordinal)?;
        Ok(())
    }

    fn current_device(&self) -> usize {
        self.ordinal
    }

    fn device_name(&self) -> Result<String> {
        self.device
            .name()
            .map_err(|e| BackendError::Other(format!("CUDA device name query failed: {e}")))
    }

    fn load_module(&mut self, image: &KernelImage) -> Result<FunctionHandle> {
        let (entry, ptx) = match image {
            KernelImage::Ptx { entry, ptx } => (entry, ptx),
            KernelImage::Host { entry, .. } => {
                return Err(BackendError::ModuleLoad {
                    entry: entry.clone(),
                    reason: "host images require the cpu backend".to_string(),
                })
            }
        };

        let id = self.next_function_id;
        let module_name = format!("pic_module_{id}");
        // Loaded modules live until process exit, as does the entry name cudarc keeps.
        let entry_name: &'static str = Box::leak(entry.clone().into_boxed_str());
        self.device
            .load_ptx(Ptx::from_src(ptx.clone()), &module_name, &[entry_name])
            .map_err(|e| BackendError::ModuleLoad {
                entry: entry.clone(),
                reason: e.to_string(),
            })?;
        let function = self
            .device
            .get_func(&module_name, entry_name)
            .ok_or_else(|| BackendError::ModuleLoad {
                entry: entry.clone(),
                reason: format!("entry not found in module {module_name}"),
            })?;

        self.next_function_id += 1;
        self.functions.insert(id, function);
        self.stats.modules_loaded += 1;
        tracing::debug!(entry = %entry, module = %module_name, ptx_bytes = ptx.len(), "cuda_module_loaded");
        Ok(FunctionHandle::new(id))
    }

    fn launch(&mut self, function: FunctionHandle, config: &LaunchConfig, params: &[KernelParam]) -> Result<()> {
        config.validate()?;
        let func = self
            .functions
            .get(&function.id())
            .cloned()
            .ok_or(BackendError::InvalidFunctionHandle(function.id()))?;

        let mut slots = params
            .iter()
            .map(|p| self.encode_param(p))
            .collect::<Result<Vec<_>>>()?;
        let mut pointers: Vec<*mut c_void> = slots.iter_mut().map(|slot| slot.as_mut_ptr().cast::<c_void>()).collect();

        let cfg = CudaLaunchConfig {
            grid_dim: (config.grid.x, config.grid.y, config.grid.z),
            block_dim: (config.block.x, config.block.y, config.block.z),
            shared_mem_bytes: config.shared_memory.size_bytes as u32,
        };

        // SAFETY: `pointers` holds one pointer per entry parameter, each to a
        // live 16-byte slot; the generated entry declares exactly this layout.
        unsafe { func.launch(cfg, &mut pointers[..]) }.map_err(|e| BackendError::kernel(function.to_string(), e))?;
        self.device
            .synchronize()
            .map_err(|e| BackendError::kernel(function.to_string(), e))?;

        self.stats.launches += 1;
        Ok(())
    }

    fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let handle = self.memory.allocate_buffer(size)?;
        self.stats.allocations += 1;
        self.stats.bytes_in_use = self.memory.bytes_in_use() as u64;
        Ok(handle)
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.memory.free_buffer(handle)?;
        self.stats.bytes_in_use = self.memory.bytes_in_use() as u64;
        Ok(())
    }

    fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.memory.copy_to_buffer(handle, data)?;
        self.stats.record_h2d(data.len());
        Ok(())
    }

    fn copy_from_buffer(&mut self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.memory.copy_from_buffer(handle, data)?;
        self.stats.record_d2h(data.len());
        Ok(())
    }

    fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.memory.buffer_size(handle)
    }

    fn synchronize(&mut self) -> Result<()> {
        self.device
            .synchronize()
            .map_err(|e| BackendError::Other(format!("CUDA synchronize failed: {e}")))
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// Stub when the `cuda` feature is off
#[cfg(not(feature = "cuda"))]
pub struct CudaBackend;

#[cfg(not(feature = "cuda"))]
impl CudaBackend {
    pub fn new() -> Result<Self> {
        Err(BackendError::unsupported("CUDA backend requires the 'cuda' feature"))
    }

    pub fn on_device(_ordinal: usize) -> Result<Self> {
        Self::new()
    }

    pub fn is_available() -> bool {
        false
    }

    pub fn visible_devices() -> usize {
        0
    }
}
