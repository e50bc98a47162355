//! Error types for pic-core operations

use pic_backends::BackendError;
use pic_kernel_runtime::AbiError;

/// Result type for pic-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pic-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A kernel argument is neither a scalar nor a well-formed device array,
    /// or a name designates nothing known.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Compiling or loading a kernel for a new signature failed.
    #[error("specialization of `{kernel}` for ({signature}) failed: {reason}")]
    Specialization {
        kernel: String,
        signature: String,
        reason: String,
    },

    /// The process cannot be set up as requested (no devices, bad settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

impl From<AbiError> for Error {
    fn from(err: AbiError) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

impl Error {
    /// True when a device allocation or transfer ran out of memory.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Error::Backend(e) if e.is_resource_exhausted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_errors_become_invalid_argument() {
        let err: Error = AbiError::UnsupportedArgument {
            index: 2,
            type_name: "str".into(),
        }
        .into();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("str")));
    }

    #[test]
    fn resource_exhaustion_is_detected_through_backend_errors() {
        let err: Error = BackendError::ResourceExhausted {
            requested: 64,
            available: 0,
        }
        .into();
        assert!(err.is_resource_exhausted());
        assert!(!Error::Configuration("x".into()).is_resource_exhausted());
    }
}
