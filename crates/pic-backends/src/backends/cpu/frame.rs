use super::memory::MemoryManager;
use crate::error::{BackendError, Result};
use pic_kernel_runtime::{ArrayView, Element, Scalar, UnmarshalledArg};

/// Arguments and memory visible to one host kernel launch.
///
/// Array elements are addressed by multi-index through the marshalled
/// extents and byte strides, the way a compiled entry point would.
pub struct HostFrame<'a> {
    entry: &'a str,
    args: &'a [UnmarshalledArg],
    memory: &'a mut MemoryManager,
}

impl<'a> HostFrame<'a> {
    pub(crate) fn new(entry: &'a str, args: &'a [UnmarshalledArg], memory: &'a mut MemoryManager) -> Self {
        Self { entry, args, memory }
    }

    pub fn entry(&self) -> &str {
        self.entry
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    fn arg(&self, position: usize) -> Result<&'a UnmarshalledArg> {
        self.args.get(position).ok_or_else(|| {
            BackendError::kernel(
                self.entry,
                format!("argument {position} requested, {} passed", self.args.len()),
            )
        })
    }

    pub fn scalar(&self, position: usize) -> Result<Scalar> {
        match self.arg(position)? {
            UnmarshalledArg::Scalar(s) => Ok(*s),
            UnmarshalledArg::Array(_) => Err(BackendError::type_mismatch("scalar", "array")),
        }
    }

    /// Scalar argument widened to `f64`.
    pub fn scalar_f64(&self, position: usize) -> Result<f64> {
        let scalar = self.scalar(position)?;
        scalar
            .as_f64()
            .ok_or_else(|| BackendError::type_mismatch("real scalar", scalar.kind()))
    }

    pub fn array(&self, position: usize) -> Result<&'a ArrayView> {
        match self.arg(position)? {
            UnmarshalledArg::Array(view) => Ok(view),
            UnmarshalledArg::Scalar(s) => Err(BackendError::type_mismatch("array", s.kind())),
        }
    }

    pub fn shape(&self, position: usize) -> Result<&'a [usize]> {
        Ok(&self.array(position)?.shape)
    }

    /// Element count of an array argument.
    pub fn len(&self, position: usize) -> Result<usize> {
        Ok(self.array(position)?.len)
    }

    fn locate<T: Element>(&self, position: usize, index: &[usize]) -> Result<(u64, usize)> {
        let view = self.array(position)?;
        if view.element != T::KIND {
            return Err(BackendError::type_mismatch(view.element, T::KIND));
        }
        let offset = view
            .byte_offset(index)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| {
                BackendError::kernel(
                    self.entry,
                    format!("index {index:?} out of bounds for argument {position} with shape {:?}", view.shape),
                )
            })?;
        Ok((view.buffer, offset))
    }

    pub fn get<T: Element>(&self, position: usize, index: &[usize]) -> Result<T> {
        let (buffer, offset) = self.locate::<T>(position, index)?;
        let mut value: T = bytemuck::Zeroable::zeroed();
        self.memory.read_at(buffer, offset, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    pub fn set<T: Element>(&mut self, position: usize, index: &[usize], value: T) -> Result<()> {
        let (buffer, offset) = self.locate::<T>(position, index)?;
        self.memory.write_at(buffer, offset, bytemuck::bytes_of(&value))
    }
}
