//! CUDA device memory keyed by buffer handle.

#[cfg(feature = "cuda")]
use crate::backend::BufferHandle;
#[cfg(feature = "cuda")]
use crate::error::{BackendError, Result};

#[cfg(feature = "cuda")]
use cudarc::driver::{sys::CUresult, CudaDevice, CudaSlice, DevicePtr, DriverError};

#[cfg(feature = "cuda")]
use std::collections::HashMap;
#[cfg(feature = "cuda")]
use std::sync::Arc;

#[cfg(feature = "cuda")]
pub struct CudaMemoryManager {
    device: Arc<CudaDevice>,
    buffers: HashMap<u64, CudaSlice<u8>>,
    next_buffer_id: u64,
    in_use: usize,
}

#[cfg(feature = "cuda")]
impl CudaMemoryManager {
    pub fn new(device: Arc<CudaDevice>) -> Self {
        Self {
            device,
            buffers: HashMap::new(),
            next_buffer_id: 1,
            in_use: 0,
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.in_use
    }

    pub fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let slice = self
            .device
            .alloc_zeros::<u8>(size)
            .map_err(|e| allocation_error(e, size))?;

        let handle = BufferHandle::new(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(handle.id(), slice);
        self.in_use += size;
        Ok(handle)
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let freed = self.buffers.remove(&handle.id()).ok_or(unknown(handle.id()))?;
        self.in_use -= freed.len();
        Ok(())
    }

    pub fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let slice = self.buffers.get_mut(&handle.id()).ok_or(unknown(handle.id()))?;
        check_fits(data.len(), slice.len())?;
        self.device
            .htod_sync_copy_into(data, &mut slice.slice_mut(0..data.len()))
            .map_err(|e| transfer_error("host-to-device", e))
    }

    pub fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let slice = self.slice(handle.id())?;
        check_fits(data.len(), slice.len())?;
        self.device
            .dtoh_sync_copy_into(&slice.slice(0..data.len()), data)
            .map_err(|e| transfer_error("device-to-host", e))
    }

    pub fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.slice(handle.id())?.len())
    }

    /// Raw device address of a buffer, as passed to a kernel.
    pub fn device_ptr(&self, id: u64) -> Result<u64> {
        Ok(*self.slice(id)?.device_ptr())
    }

    fn slice(&self, id: u64) -> Result<&CudaSlice<u8>> {
        self.buffers.get(&id).ok_or(unknown(id))
    }
}

#[cfg(feature = "cuda")]
fn unknown(id: u64) -> BackendError {
    BackendError::InvalidBufferHandle(id)
}

#[cfg(feature = "cuda")]
fn transfer_error(direction: &str, err: DriverError) -> BackendError {
    BackendError::Other(format!("CUDA {direction} copy failed: {err}"))
}

#[cfg(feature = "cuda")]
fn check_fits(size: usize, buffer_size: usize) -> Result<()> {
    if size > buffer_size {
        return Err(BackendError::BufferOutOfBounds {
            offset: 0,
            size,
            buffer_size,
        });
    }
    Ok(())
}

#[cfg(feature = "cuda")]
fn allocation_error(err: DriverError, requested: usize) -> BackendError {
    if err.0 == CUresult::CUDA_ERROR_OUT_OF_MEMORY {
        let available = cudarc::driver::result::mem_get_info()
            .map(|(free, _total)| free)
            .unwrap_or(0);
        BackendError::ResourceExhausted { requested, available }
    } else {
        BackendError::Other(format!("CUDA buffer allocation failed: {err}"))
    }
}
