//! Error types for backend operations

use pic_kernel_runtime::AbiError;
use std::fmt;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid buffer handle: {0}")]
    InvalidBufferHandle(u64),

    #[error("invalid function handle: {0}")]
    InvalidFunctionHandle(u64),

    #[error("buffer access out of bounds: offset {offset} + size {size} > buffer size {buffer_size}")]
    BufferOutOfBounds {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// Device memory cannot satisfy an allocation.
    #[error("device memory exhausted: requested {requested} bytes, available {available} bytes")]
    ResourceExhausted { requested: usize, available: usize },

    #[error("invalid device ordinal {ordinal} ({count} devices visible)")]
    InvalidDevice { ordinal: usize, count: usize },

    #[error("invalid launch configuration: {0}")]
    InvalidLaunchConfig(String),

    #[error("module load failed for `{entry}`: {reason}")]
    ModuleLoad { entry: String, reason: String },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("argument unmarshalling failed: {0}")]
    Abi(#[from] AbiError),

    /// A kernel body reported failure while running.
    #[error("kernel `{entry}` failed: {reason}")]
    Kernel { entry: String, reason: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    pub fn type_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn kernel(entry: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Kernel {
            entry: entry.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure came from running out of device memory.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}
