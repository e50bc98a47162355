//! Handles, launch geometry and counters exchanged with a [`super::Backend`].

use std::fmt;

/// Handle to a device allocation.
///
/// The id is what a marshalled kernel receives as its `Buffer` param.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl BufferHandle {
    /// Wrap a raw buffer id.
    pub const fn new(id: u64) -> Self {
        BufferHandle(id)
    }

    /// Raw id, as carried by `KernelParam::Buffer`.
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// Handle to a loaded, launchable kernel entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub u64);

impl FunctionHandle {
    /// Wrap a raw function id.
    pub const fn new(id: u64) -> Self {
        FunctionHandle(id)
    }

    /// Raw id assigned by the backend that loaded the module.
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Number of blocks along each axis of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDim {
    /// Blocks along x
    pub x: u32,
    /// Blocks along y
    pub y: u32,
    /// Blocks along z
    pub z: u32,
}

impl GridDim {
    /// Create new grid dimensions
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// 1D grid of `size` blocks
    pub const fn linear(size: u32) -> Self {
        Self { x: size, y: 1, z: 1 }
    }

    /// 2D grid of `x * y` blocks
    pub const fn square(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// Blocks in the whole grid
    pub const fn total_blocks(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for GridDim {
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

impl fmt::Display for GridDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Threads per block along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDim {
    /// Threads along x
    pub x: u32,
    /// Threads along y
    pub y: u32,
    /// Threads along z
    pub z: u32,
}

impl BlockDim {
    /// Create new block dimensions
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// 1D block of `size` threads
    pub const fn linear(size: u32) -> Self {
        Self { x: size, y: 1, z: 1 }
    }

    /// 2D block of `x * y` threads
    pub const fn square(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// Threads in one block
    pub const fn total_threads(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for BlockDim {
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

impl fmt::Display for BlockDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Dynamic shared memory requested for a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SharedMemoryConfig {
    /// Dynamic shared memory per block in bytes
    pub size_bytes: usize,
}

impl SharedMemoryConfig {
    /// Request `size_bytes` of dynamic shared memory per block
    pub const fn new(size_bytes: usize) -> Self {
        Self { size_bytes }
    }

    /// No dynamic shared memory
    pub const fn none() -> Self {
        Self { size_bytes: 0 }
    }
}

/// Launch geometry of one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchConfig {
    /// Blocks per grid
    pub grid: GridDim,
    /// Threads per block
    pub block: BlockDim,
    /// Dynamic shared memory per block
    pub shared_memory: SharedMemoryConfig,
}

impl LaunchConfig {
    /// Create a launch configuration from its parts
    pub const fn new(grid: GridDim, block: BlockDim, shared_memory: SharedMemoryConfig) -> Self {
        Self {
            grid,
            block,
            shared_memory,
        }
    }

    /// `(blocks_per_grid, threads_per_block)` pair, as kernels are usually configured.
    pub const fn one_d(blocks: u32, threads_per_block: u32) -> Self {
        Self {
            grid: GridDim::linear(blocks),
            block: BlockDim::linear(threads_per_block),
            shared_memory: SharedMemoryConfig::none(),
        }
    }

    /// Per-axis `((bpg_x, bpg_y), (tpb_x, tpb_y))` geometry.
    pub const fn two_d(blocks: (u32, u32), threads_per_block: (u32, u32)) -> Self {
        Self {
            grid: GridDim::square(blocks.0, blocks.1),
            block: BlockDim::square(threads_per_block.0, threads_per_block.1),
            shared_memory: SharedMemoryConfig::none(),
        }
    }

    /// Blocks in the launch
    pub const fn total_blocks(&self) -> u64 {
        self.grid.total_blocks()
    }

    /// Threads in the launch, idle ones included
    pub const fn total_threads(&self) -> u64 {
        self.grid.total_blocks() * self.block.total_threads()
    }

    /// Reject geometries no runtime can launch.
    pub fn validate(&self) -> crate::Result<()> {
        if self.grid.total_blocks() == 0 {
            return Err(crate::BackendError::InvalidLaunchConfig(format!("empty grid {}", self.grid)));
        }
        if self.block.total_threads() == 0 {
            return Err(crate::BackendError::InvalidLaunchConfig(format!("empty block {}", self.block)));
        }
        Ok(())
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid={}, block={}, shared_mem={}B",
            self.grid, self.block, self.shared_memory.size_bytes
        )
    }
}

/// Position of one thread inside a launch, as a host kernel body sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadIndex {
    /// `blockIdx` as `(x, y, z)`
    pub block_idx: (u32, u32, u32),
    /// `threadIdx` as `(x, y, z)`
    pub thread_idx: (u32, u32, u32),
    /// `gridDim`
    pub grid_dim: GridDim,
    /// `blockDim`
    pub block_dim: BlockDim,
}

impl ThreadIndex {
    /// Index of one thread within a launch of `grid_dim × block_dim`.
    pub const fn new(
        block_idx: (u32, u32, u32),
        thread_idx: (u32, u32, u32),
        grid_dim: GridDim,
        block_dim: BlockDim,
    ) -> Self {
        Self {
            block_idx,
            thread_idx,
            grid_dim,
            block_dim,
        }
    }

    /// Absolute x position, `blockIdx.x * blockDim.x + threadIdx.x`.
    pub const fn global_x(&self) -> u64 {
        self.block_idx.0 as u64 * self.block_dim.x as u64 + self.thread_idx.0 as u64
    }

    /// Absolute y position, `blockIdx.y * blockDim.y + threadIdx.y`.
    pub const fn global_y(&self) -> u64 {
        self.block_idx.1 as u64 * self.block_dim.y as u64 + self.thread_idx.1 as u64
    }

    /// Absolute 2D position `(x, y)`.
    pub const fn grid_2d(&self) -> (u64, u64) {
        (self.global_x(), self.global_y())
    }
}

/// Counters a backend keeps about the work it was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendStats {
    /// Host-to-device copies
    pub h2d_transfers: u64,
    /// Bytes copied host-to-device
    pub h2d_bytes: u64,
    /// Device-to-host copies
    pub d2h_transfers: u64,
    /// Bytes copied device-to-host
    pub d2h_bytes: u64,
    /// Buffers allocated over the backend's lifetime
    pub allocations: u64,
    /// Bytes currently allocated
    pub bytes_in_use: u64,
    /// Modules loaded by `load_module`
    pub modules_loaded: u64,
    /// Kernel launches
    pub launches: u64,
}

impl BackendStats {
    /// Count one host-to-device copy of `bytes`.
    pub fn record_h2d(&mut self, bytes: usize) {
        self.h2d_transfers += 1;
        self.h2d_bytes += bytes as u64;
    }

    /// Count one device-to-host copy of `bytes`.
    pub fn record_d2h(&mut self, bytes: usize) {
        self.d2h_transfers += 1;
        self.d2h_bytes += bytes as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_display() {
        assert_eq!(BufferHandle::new(42).to_string(), "buf42");
        assert_eq!(FunctionHandle::new(3).to_string(), "fn3");
        assert_eq!(BufferHandle::new(7).id(), 7);
    }

    #[test]
    fn test_launch_config_totals() {
        let config = LaunchConfig::two_d((3, 2), (1, 128));
        assert_eq!(config.total_blocks(), 6);
        assert_eq!(config.total_threads(), 768);
        assert_eq!(config.to_string(), "grid=(3, 2, 1), block=(1, 128, 1), shared_mem=0B");
    }

    #[test]
    fn test_validate_rejects_empty_geometry() {
        assert!(LaunchConfig::one_d(4, 256).validate().is_ok());
        assert!(LaunchConfig::one_d(0, 256).validate().is_err());
        assert!(LaunchConfig::one_d(4, 0).validate().is_err());
    }

    #[test]
    fn test_thread_index_global_position() {
        let idx = ThreadIndex::new((2, 1, 0), (5, 3, 0), GridDim::square(4, 4), BlockDim::square(8, 16));
        assert_eq!(idx.global_x(), 21);
        assert_eq!(idx.global_y(), 19);
        assert_eq!(idx.grid_2d(), (21, 19));
    }
}
