use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("argument {index}: unsupported kernel argument type `{type_name}`")]
    UnsupportedArgument { index: usize, type_name: String },

    #[error("argument {index}: array rank {rank} outside 1..={max}")]
    InvalidRank { index: usize, rank: usize, max: usize },

    #[error("argument {index}: shape has {shape} dims but strides has {strides}")]
    ShapeStrideMismatch { index: usize, shape: usize, strides: usize },

    #[error("argument {index}: element count overflows i64")]
    SizeOverflow { index: usize },

    #[error("parameter list exhausted at position {position}, expected {expected}")]
    ParamUnderflow { position: usize, expected: &'static str },

    #[error("parameter {position}: expected {expected}, found {found}")]
    UnexpectedParam {
        position: usize,
        expected: &'static str,
        found: String,
    },
}

pub type Result<T> = std::result::Result<T, AbiError>;
