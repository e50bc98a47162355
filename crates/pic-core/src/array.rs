//! Typed device arrays and host/device storage for simulation data.

use crate::error::{Error, Result};
use crate::executor::Executor;
use pic_backends::BufferHandle;
use pic_kernel_runtime::{ArrayArg, Element, KernelArg};
use std::marker::PhantomData;

/// A dense row-major array in device memory.
///
/// The array does not free itself; hand it back to
/// [`Executor::free`] when done.
#[derive(Debug)]
pub struct DeviceArray<T: Element> {
    handle: BufferHandle,
    shape: Vec<usize>,
    _marker: PhantomData<T>,
}

impl<T: Element> DeviceArray<T> {
    pub(crate) fn new(handle: BufferHandle, shape: Vec<usize>) -> Self {
        Self {
            handle,
            shape,
            _marker: PhantomData,
        }
    }

    /// Backend buffer holding the elements.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Extent of each axis.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the device allocation in bytes.
    pub fn nbytes(&self) -> usize {
        self.len() * T::KIND.itemsize()
    }

    /// Kernel argument referring to this array.
    pub fn arg(&self) -> KernelArg {
        KernelArg::Array(ArrayArg::contiguous(self.handle.id(), T::KIND, self.shape.clone()))
    }
}

impl<T: Element> From<&DeviceArray<T>> for KernelArg {
    fn from(array: &DeviceArray<T>) -> Self {
        array.arg()
    }
}

/// One array of an aggregate, wherever it currently lives.
#[derive(Debug)]
pub enum ResidentArray<T: Element> {
    Host { data: Vec<T>, shape: Vec<usize> },
    Device(DeviceArray<T>),
}

impl<T: Element> ResidentArray<T> {
    /// Host storage; `data.len()` must equal the product of `shape`.
    pub fn host(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::ShapeMismatch {
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(ResidentArray::Host { data, shape })
    }

    /// Zero-filled host storage.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        ResidentArray::Host {
            data: vec![<T as bytemuck::Zeroable>::zeroed(); len],
            shape,
        }
    }

    /// Whether the elements currently live in device memory.
    pub fn is_on_device(&self) -> bool {
        matches!(self, ResidentArray::Device(_))
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            ResidentArray::Host { shape, .. } => shape,
            ResidentArray::Device(array) => array.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes the elements occupy on either side.
    pub fn nbytes(&self) -> usize {
        self.len() * T::KIND.itemsize()
    }

    /// Host elements, or `None` while the array is on the device.
    pub fn host_data(&self) -> Option<&[T]> {
        match self {
            ResidentArray::Host { data, .. } => Some(data),
            ResidentArray::Device(_) => None,
        }
    }

    /// Mutable host elements, or `None` while the array is on the device.
    pub fn host_data_mut(&mut self) -> Option<&mut [T]> {
        match self {
            ResidentArray::Host { data, .. } => Some(data),
            ResidentArray::Device(_) => None,
        }
    }

    /// Device copy, or `None` while the array is on the host.
    pub fn device(&self) -> Option<&DeviceArray<T>> {
        match self {
            ResidentArray::Device(array) => Some(array),
            ResidentArray::Host { .. } => None,
        }
    }

    /// Kernel argument for this array. Host storage cannot be passed to a
    /// kernel and yields an argument the signature step rejects.
    pub fn arg(&self) -> KernelArg {
        match self {
            ResidentArray::Device(array) => array.arg(),
            ResidentArray::Host { .. } => KernelArg::unsupported(format!("host-resident {} array", T::KIND)),
        }
    }
}

/// Named arrays that change residency together.
///
/// Transfers are all-or-nothing: storage is swapped only once every member
/// has been copied, and a failed send releases whatever it allocated.
#[derive(Debug)]
pub struct ArrayGroup<T: Element> {
    names: Vec<String>,
    arrays: Vec<ResidentArray<T>>,
    on_device: bool,
}

impl<T: Element> Default for ArrayGroup<T> {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            arrays: Vec::new(),
            on_device: false,
        }
    }
}

impl<T: Element> ArrayGroup<T> {
    /// Empty group, host-resident.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host-resident member. Only allowed while the group is on host.
    pub fn push(&mut self, name: impl Into<String>, array: ResidentArray<T>) -> Result<usize> {
        if self.on_device || array.is_on_device() {
            return Err(Error::InvalidArgument(
                "arrays can only be added to a host-resident group".into(),
            ));
        }
        self.names.push(name.into());
        self.arrays.push(array);
        Ok(self.arrays.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Residency flag, set only once every member reached the device.
    pub fn is_on_device(&self) -> bool {
        self.on_device
    }

    /// Total bytes of all members.
    pub fn nbytes(&self) -> usize {
        self.arrays.iter().map(ResidentArray::nbytes).sum()
    }

    pub fn get(&self, index: usize) -> Option<&ResidentArray<T>> {
        self.arrays.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ResidentArray<T>> {
        self.arrays.get_mut(index)
    }

    /// Member registered under `name`.
    pub fn by_name(&self, name: &str) -> Option<&ResidentArray<T>> {
        self.names.iter().position(|n| n == name).map(|i| &self.arrays[i])
    }

    /// Member names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Copy every member to the device. Returns the bytes moved; zero when
    /// the group already lives there.
    pub fn send(&mut self, executor: &Executor) -> Result<usize> {
        if self.on_device {
            return Ok(0);
        }

        let mut uploaded = Vec::with_capacity(self.arrays.len());
        for (name, array) in self.names.iter().zip(&self.arrays) {
            let result = match array {
                ResidentArray::Host { data, shape } => executor.upload(data, shape),
                ResidentArray::Device(_) => Err(Error::InvalidArgument(format!(
                    "member `{name}` is already on device in a host-resident group"
                ))),
            };
            match result {
                Ok(device) => uploaded.push(device),
                Err(e) => {
                    for device in uploaded {
                        if let Err(free_err) = executor.free(device) {
                            tracing::warn!(error = %free_err, "failed to release partial upload");
                        }
                    }
                    return Err(e);
                }
            }
        }

        let nbytes = self.nbytes();
        for (slot, device) in self.arrays.iter_mut().zip(uploaded) {
            *slot = ResidentArray::Device(device);
        }
        self.on_device = true;
        Ok(nbytes)
    }

    /// Copy every member back to host memory and release the device copies.
    /// Returns the bytes moved; zero when the group is already on host.
    pub fn receive(&mut self, executor: &Executor) -> Result<usize> {
        if !self.on_device {
            return Ok(0);
        }

        let mut downloaded = Vec::with_capacity(self.arrays.len());
        for (name, array) in self.names.iter().zip(&self.arrays) {
            match array {
                ResidentArray::Device(device) => downloaded.push(executor.download(device)?),
                ResidentArray::Host { .. } => {
                    return Err(Error::InvalidArgument(format!(
                        "member `{name}` is on host in a device-resident group"
                    )))
                }
            }
        }

        let nbytes = self.nbytes();
        for (slot, data) in self.arrays.iter_mut().zip(downloaded) {
            let shape = slot.shape().to_vec();
            if let ResidentArray::Device(device) = std::mem::replace(slot, ResidentArray::Host { data, shape }) {
                if let Err(e) = executor.free(device) {
                    tracing::warn!(error = %e, "failed to release device copy after download");
                }
            }
        }
        self.on_device = false;
        Ok(nbytes)
    }
}
