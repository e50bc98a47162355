//! Argument signatures: the cache key of a specialized kernel.

use crate::args::KernelArg;
use crate::error::{AbiError, Result};
use crate::types::ElementKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest array rank the ABI accepts. Compilers may support fewer.
pub const MAX_ARRAY_RANK: usize = 8;

/// Type of one argument position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArgKind {
    Scalar(ElementKind),
    Array { element: ElementKind, rank: u8 },
}

impl ArgKind {
    pub fn element(&self) -> ElementKind {
        match *self {
            ArgKind::Scalar(kind) => kind,
            ArgKind::Array { element, .. } => element,
        }
    }

    pub fn rank(&self) -> usize {
        match *self {
            ArgKind::Scalar(_) => 0,
            ArgKind::Array { rank, .. } => usize::from(rank),
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Scalar(kind) => write!(f, "{kind}"),
            ArgKind::Array { element, rank } => write!(f, "{element}[{rank}]"),
        }
    }
}

/// Ordered argument kinds of one call.
///
/// Only element kind and rank participate; extents, strides and buffer
/// handles do not, so arrays of different lengths share a specialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ArgumentSignature(Vec<ArgKind>);

impl ArgumentSignature {
    pub fn new(kinds: Vec<ArgKind>) -> Self {
        Self(kinds)
    }

    /// Derive and validate the signature of a call's original arguments.
    pub fn of(args: &[KernelArg]) -> Result<Self> {
        args.iter()
            .enumerate()
            .map(|(index, arg)| match arg {
                KernelArg::Scalar(scalar) => Ok(ArgKind::Scalar(scalar.kind())),
                KernelArg::Array(array) => {
                    let rank = array.rank();
                    if rank == 0 || rank > MAX_ARRAY_RANK {
                        return Err(AbiError::InvalidRank {
                            index,
                            rank,
                            max: MAX_ARRAY_RANK,
                        });
                    }
                    if array.strides.len() != rank {
                        return Err(AbiError::ShapeStrideMismatch {
                            index,
                            shape: rank,
                            strides: array.strides.len(),
                        });
                    }
                    match array.len() {
                        Some(len) if i64::try_from(len).is_ok() => {}
                        _ => return Err(AbiError::SizeOverflow { index }),
                    }
                    Ok(ArgKind::Array {
                        element: array.element,
                        rank: rank as u8,
                    })
                }
                KernelArg::Unsupported { type_name } => Err(AbiError::UnsupportedArgument {
                    index,
                    type_name: type_name.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn kinds(&self) -> &[ArgKind] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max_rank(&self) -> usize {
        self.0.iter().map(ArgKind::rank).max().unwrap_or(0)
    }

    /// Identifier-safe form, e.g. `f64a2_i32`, used to name generated entry points.
    pub fn mangled(&self) -> String {
        if self.0.is_empty() {
            return "void".to_string();
        }
        self.0
            .iter()
            .map(|kind| match kind {
                ArgKind::Scalar(element) => element.short_name().to_string(),
                ArgKind::Array { element, rank } => format!("{}a{rank}", element.short_name()),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for ArgumentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}
