//! Host-side buffer store standing in for device memory.

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};
use std::collections::HashMap;

/// Buffers of the host backend, keyed by handle id.
///
/// An optional capacity makes allocation fail the way a full device would,
/// so out-of-memory paths can be exercised without hardware.
pub struct MemoryManager {
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
    capacity: Option<usize>,
    in_use: usize,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::with_capacity_limit(None)
    }

    pub fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer_id: 1,
            capacity,
            in_use: 0,
        }
    }

    pub fn bytes_in_use(&self) -> usize {
        self.in_use
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        if let Some(capacity) = self.capacity {
            let available = capacity.saturating_sub(self.in_use);
            if size > available {
                return Err(BackendError::ResourceExhausted {
                    requested: size,
                    available,
                });
            }
        }

        let handle = BufferHandle::new(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(handle.id(), vec![0u8; size]);
        self.in_use += size;
        Ok(handle)
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let buffer = self
            .buffers
            .remove(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))?;
        self.in_use -= buffer.len();
        Ok(())
    }

    pub fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        self.write_at(handle.id(), 0, data)
    }

    pub fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        self.read_at(handle.id(), 0, data)
    }

    pub fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.buffers
            .get(&handle.id())
            .map(Vec::len)
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    pub(crate) fn read_at(&self, id: u64, offset: usize, out: &mut [u8]) -> Result<()> {
        let buffer = self.buffers.get(&id).ok_or(BackendError::InvalidBufferHandle(id))?;
        let range = checked_range(offset, out.len(), buffer.len())?;
        out.copy_from_slice(&buffer[range]);
        Ok(())
    }

    pub(crate) fn write_at(&mut self, id: u64, offset: usize, data: &[u8]) -> Result<()> {
        let buffer = self.buffers.get_mut(&id).ok_or(BackendError::InvalidBufferHandle(id))?;
        let range = checked_range(offset, data.len(), buffer.len())?;
        buffer[range].copy_from_slice(data);
        Ok(())
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_range(offset: usize, size: usize, buffer_size: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer_size => Ok(offset..end),
        _ => Err(BackendError::BufferOutOfBounds {
            offset,
            size,
            buffer_size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_copy_round_trip() {
        let mut memory = MemoryManager::new();
        let handle = memory.allocate_buffer(16).unwrap();

        let data = b"particle-in-cell";
        memory.copy_to_buffer(handle, data).unwrap();

        let mut out = [0u8; 16];
        memory.copy_from_buffer(handle, &mut out).unwrap();
        assert_eq!(&out, data);
    }

    #[test]
    fn test_partial_copies_touch_the_prefix() {
        let mut memory = MemoryManager::new();
        let handle = memory.allocate_buffer(8).unwrap();
        memory.copy_to_buffer(handle, &[1, 2, 3]).unwrap();

        let mut out = [9u8; 8];
        memory.copy_from_buffer(handle, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_out_of_bounds_copy() {
        let mut memory = MemoryManager::new();
        let handle = memory.allocate_buffer(4).unwrap();
        let err = memory.copy_to_buffer(handle, &[0u8; 5]).unwrap_err();
        assert!(matches!(
            err,
            BackendError::BufferOutOfBounds {
                size: 5,
                buffer_size: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_capacity_limit_and_release() {
        let mut memory = MemoryManager::with_capacity_limit(Some(100));
        let a = memory.allocate_buffer(60).unwrap();
        let err = memory.allocate_buffer(50).unwrap_err();
        assert!(matches!(
            err,
            BackendError::ResourceExhausted {
                requested: 50,
                available: 40
            }
        ));

        memory.free_buffer(a).unwrap();
        assert_eq!(memory.bytes_in_use(), 0);
        assert!(memory.allocate_buffer(100).is_ok());
    }

    #[test]
    fn test_invalid_handle() {
        let mut memory = MemoryManager::new();
        assert!(matches!(
            memory.free_buffer(BufferHandle::new(99)),
            Err(BackendError::InvalidBufferHandle(99))
        ));
    }
}
