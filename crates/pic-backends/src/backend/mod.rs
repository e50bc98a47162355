//! Backend trait and the handle/geometry types it exchanges.

mod traits;
mod types;

pub use traits::Backend;
pub use types::{BackendStats, BlockDim, BufferHandle, FunctionHandle, GridDim, LaunchConfig, SharedMemoryConfig, ThreadIndex};
