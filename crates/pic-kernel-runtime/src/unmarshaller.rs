use crate::abi::KernelParam;
use crate::error::{AbiError, Result};
use crate::signature::{ArgKind, ArgumentSignature};
use crate::types::{ElementKind, Scalar};

/// An array argument as seen from inside a kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayView {
    pub buffer: u64,
    pub element: ElementKind,
    pub len: usize,
    pub itemsize: usize,
    pub shape: Vec<usize>,
    /// Byte strides.
    pub strides: Vec<isize>,
}

impl ArrayView {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Byte offset of a multi-index, or `None` when out of bounds.
    pub fn byte_offset(&self, index: &[usize]) -> Option<isize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0isize;
        for ((&i, &extent), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i >= extent {
                return None;
            }
            offset = offset.checked_add((i as isize).checked_mul(stride)?)?;
        }
        Some(offset)
    }

    /// Element index of a multi-index in the underlying buffer.
    pub fn element_index(&self, index: &[usize]) -> Option<usize> {
        let offset = self.byte_offset(index)?;
        let offset = usize::try_from(offset).ok()?;
        (offset % self.itemsize == 0).then(|| offset / self.itemsize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnmarshalledArg {
    Scalar(Scalar),
    Array(ArrayView),
}

/// Sequential reader over a marshalled parameter list.
pub struct Unmarshaller<'a> {
    params: &'a [KernelParam],
    position: usize,
}

impl<'a> Unmarshaller<'a> {
    pub fn new(params: &'a [KernelParam]) -> Self {
        Self { params, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.params.len() - self.position
    }

    fn next_param(&mut self, expected: &'static str) -> Result<KernelParam> {
        let param = self.params.get(self.position).copied().ok_or(AbiError::ParamUnderflow {
            position: self.position,
            expected,
        })?;
        self.position += 1;
        Ok(param)
    }

    fn unexpected(&self, expected: &'static str, found: KernelParam) -> AbiError {
        AbiError::UnexpectedParam {
            position: self.position - 1,
            expected,
            found: found.describe(),
        }
    }

    pub fn next_scalar(&mut self) -> Result<Scalar> {
        match self.next_param("scalar")? {
            KernelParam::Scalar(s) => Ok(s),
            other => Err(self.unexpected("scalar", other)),
        }
    }

    fn next_null(&mut self) -> Result<()> {
        match self.next_param("null placeholder")? {
            KernelParam::Null => Ok(()),
            other => Err(self.unexpected("null placeholder", other)),
        }
    }

    fn next_int(&mut self, expected: &'static str) -> Result<i64> {
        match self.next_param(expected)? {
            KernelParam::Int(v) => Ok(v),
            other => Err(self.unexpected(expected, other)),
        }
    }

    fn next_non_negative(&mut self, expected: &'static str) -> Result<usize> {
        let value = self.next_int(expected)?;
        usize::try_from(value).map_err(|_| AbiError::UnexpectedParam {
            position: self.position - 1,
            expected,
            found: format!("int {value}"),
        })
    }

    /// Read one array of the given element kind and rank.
    pub fn next_array(&mut self, element: ElementKind, rank: usize) -> Result<ArrayView> {
        self.next_null()?;
        self.next_null()?;
        let len = self.next_non_negative("element count")?;
        let itemsize = self.next_non_negative("itemsize")?;
        let buffer = match self.next_param("buffer handle")? {
            KernelParam::Buffer(id) => id,
            other => return Err(self.unexpected("buffer handle", other)),
        };
        let shape = (0..rank)
            .map(|_| self.next_non_negative("extent"))
            .collect::<Result<Vec<_>>>()?;
        let strides = (0..rank)
            .map(|_| self.next_int("stride").map(|s| s as isize))
            .collect::<Result<Vec<_>>>()?;

        Ok(ArrayView {
            buffer,
            element,
            len,
            itemsize,
            shape,
            strides,
        })
    }

    pub fn next_arg(&mut self, kind: &ArgKind) -> Result<UnmarshalledArg> {
        match *kind {
            ArgKind::Scalar(_) => self.next_scalar().map(UnmarshalledArg::Scalar),
            ArgKind::Array { element, rank } => self.next_array(element, usize::from(rank)).map(UnmarshalledArg::Array),
        }
    }

    /// Read every argument described by `signature`.
    pub fn unmarshal_all(params: &'a [KernelParam], signature: &ArgumentSignature) -> Result<Vec<UnmarshalledArg>> {
        let mut reader = Self::new(params);
        let args = signature
            .kinds()
            .iter()
            .map(|kind| reader.next_arg(kind))
            .collect::<Result<Vec<_>>>()?;
        if let Some(extra) = params.get(reader.position) {
            return Err(AbiError::UnexpectedParam {
                position: reader.position,
                expected: "end of parameters",
                found: extra.describe(),
            });
        }
        Ok(args)
    }
}
