//! Signature-specialized kernels
//!
//! A [`Kernel`] wraps one kernel source and compiles it lazily, once per
//! distinct [`ArgumentSignature`] it is called with:
//!
//! ```text
//! BoundKernel::invoke(args)
//!   1. ArgumentSignature::of(args)        reject unsupported arguments
//!   2. SpecializationCache lookup         hit → reuse the handle
//!   3. JitCompiler::specialize            miss → compile
//!      Backend::load_module                      and load, then cache
//!   4. marshal_args + Backend::launch
//! ```
//!
//! Launching is two-phase: geometry is bound with [`Kernel::configure`] and
//! the bound kernel is then invoked with its arguments.
//!
//! ```
//! use pic_backends::{host_kernel, LaunchConfig};
//! use pic_core::{Executor, KernelSource};
//!
//! let exec = Executor::new()?;
//! let fill = exec.kernel(KernelSource::host(
//!     "fill",
//!     host_kernel(|idx, frame| {
//!         let i = idx.global_x() as usize;
//!         if i < frame.len(0)? {
//!             let value = frame.scalar_f64(1)?;
//!             frame.set(0, &[i], value)?;
//!         }
//!         Ok(())
//!     }),
//! ));
//!
//! let x = exec.zeros::<f64>(&[100])?;
//! fill.for_units(100)?.invoke(&[x.arg(), 2.5f64.into()])?;
//! assert!(exec.download(&x)?.iter().all(|&v| v == 2.5));
//! # Ok::<(), pic_core::Error>(())
//! ```

mod cache;

pub use cache::SpecializationCache;

use crate::error::Result;
use crate::executor::Executor;
use pic_backends::{FunctionHandle, HostKernelFn, LaunchConfig, LaunchGeometry, DEFAULT_TPB_2D};
use pic_kernel_runtime::{marshal_args, ArgumentSignature, KernelArg};
use pic_tracing::performance::{record_compilation, record_launch};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Kernel implementation in a form some [`JitCompiler`](crate::compiler::JitCompiler) accepts.
/// Code of a kernel before specialization.
#[derive(Clone)]
pub enum KernelBody {
    /// CUDA C `__device__` function named after the kernel.
    Cuda(String),
    /// Per-thread host closure.
    Host(HostKernelFn),
}

/// A named kernel body, the unit that owns one specialization cache.
#[derive(Clone)]
pub struct KernelSource {
    name: String,
    body: KernelBody,
    arity: Option<usize>,
}

impl KernelSource {
    /// Kernel run per thread by a host backend.
    pub fn host(name: impl Into<String>, body: HostKernelFn) -> Self {
        Self {
            name: name.into(),
            body: KernelBody::Host(body),
            arity: None,
        }
    }

    /// Kernel from CUDA C source. `source` must define a templated
    /// `__device__` function called `name`.
    pub fn cuda(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: KernelBody::Cuda(source.into()),
            arity: None,
        }
    }

    /// Declare the number of arguments; other counts fail to specialize.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Kernel name, the prefix of every specialized entry point.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unspecialized body.
    pub fn body(&self) -> &KernelBody {
        &self.body
    }

    /// Declared argument count, if any.
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }
}

impl fmt::Debug for KernelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            KernelBody::Cuda(src) => format!("cuda ({} bytes)", src.len()),
            KernelBody::Host(_) => "host".to_string(),
        };
        f.debug_struct("KernelSource")
            .field("name", &self.name)
            .field("body", &body)
            .field("arity", &self.arity)
            .finish()
    }
}

struct KernelState {
    source: KernelSource,
    cache: SpecializationCache,
}

/// A kernel source bound to an executor, with its own specialization cache.
///
/// Clones share the cache.
#[derive(Clone)]
pub struct Kernel {
    state: Arc<KernelState>,
    executor: Executor,
}

impl Kernel {
    pub(crate) fn new(source: KernelSource, executor: Executor) -> Self {
        Self {
            state: Arc::new(KernelState {
                source,
                cache: SpecializationCache::new(),
            }),
            executor,
        }
    }

    /// Name of the wrapped kernel source.
    pub fn name(&self) -> &str {
        self.state.source.name()
    }

    /// The wrapped kernel source.
    pub fn source(&self) -> &KernelSource {
        &self.state.source
    }

    /// Bind launch geometry.
    pub fn configure(&self, config: LaunchConfig) -> BoundKernel<'_> {
        BoundKernel { kernel: self, config }
    }

    /// Bind a `(blocks_per_grid, threads_per_block)` pair.
    pub fn configure_1d(&self, blocks: u32, threads_per_block: u32) -> BoundKernel<'_> {
        self.configure(LaunchConfig::one_d(blocks, threads_per_block))
    }

    /// Enough blocks of the executor's default size to cover `units` threads.
    pub fn for_units(&self, units: u64) -> Result<BoundKernel<'_>> {
        Ok(self.configure(LaunchGeometry::for_units_1d(units, self.executor.default_tpb())?))
    }

    /// 2D grid over `x × y` units with the default `(1, 128)` block.
    pub fn for_units_2d(&self, x: u64, y: u64) -> Result<BoundKernel<'_>> {
        Ok(self.configure(LaunchGeometry::for_units_2d(x, y, DEFAULT_TPB_2D)?))
    }

    /// One-shot form of `configure(config).invoke(args)`.
    pub fn launch(&self, config: &LaunchConfig, args: &[KernelArg]) -> Result<()> {
        let signature = ArgumentSignature::of(args)?;
        config.validate()?;
        let function = self.specialize(&signature)?;
        let params = marshal_args(args)?;

        let start = Instant::now();
        self.executor
            .with_backend(|backend| backend.launch(function, config, &params))?;
        let duration_us = start.elapsed().as_micros() as u64;

        tracing::debug!(
            kernel = self.name(),
            signature = %signature,
            grid = %config.grid,
            block = %config.block,
            duration_us = duration_us,
            "kernel_launched"
        );
        record_launch(
            self.name(),
            u32::try_from(config.total_blocks()).unwrap_or(u32::MAX),
            u32::try_from(config.block.total_threads()).unwrap_or(u32::MAX),
            params.len(),
            duration_us,
        );
        Ok(())
    }

    /// Compile and load the specialization for `signature` unless cached.
    ///
    /// Calling this ahead of time moves compilation out of the first launch.
    pub fn specialize(&self, signature: &ArgumentSignature) -> Result<FunctionHandle> {
        let (function, compiled) = self.state.cache.get_or_try_insert(signature, || self.compile(signature))?;
        if !compiled {
            tracing::trace!(kernel = self.name(), signature = %signature, function = %function, "specialization_cache_hit");
        }
        Ok(function)
    }

    fn compile(&self, signature: &ArgumentSignature) -> Result<FunctionHandle> {
        let start = Instant::now();
        let compiler = self.executor.compiler();
        let image = compiler.specialize(&self.state.source, signature)?;
        let function = self
            .executor
            .with_backend(|backend| backend.load_module(&image))
            .map_err(|e| crate::compiler::specialization_error(&self.state.source, signature, e))?;
        let duration_us = start.elapsed().as_micros() as u64;

        tracing::info!(
            kernel = self.name(),
            signature = %signature,
            entry = image.entry(),
            compiler = compiler.name(),
            duration_us = duration_us,
            "kernel_specialized"
        );
        record_compilation(self.name(), &signature.to_string(), compiler.name(), duration_us);
        Ok(function)
    }

    /// Number of signatures compiled so far.
    pub fn compilations(&self) -> usize {
        self.state.cache.compilations()
    }

    /// Signatures with a loaded specialization, sorted.
    pub fn cached_signatures(&self) -> Vec<ArgumentSignature> {
        self.state.cache.signatures()
    }

    /// Executor the kernel launches on.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name())
            .field("compilations", &self.compilations())
            .finish()
    }
}

/// A kernel with launch geometry bound, ready to invoke.
#[derive(Debug, Clone, Copy)]
pub struct BoundKernel<'k> {
    kernel: &'k Kernel,
    config: LaunchConfig,
}

impl BoundKernel<'_> {
    /// The bound launch geometry.
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Launch with `args`, specializing on first use of their signature.
    pub fn invoke(&self, args: &[KernelArg]) -> Result<()> {
        self.kernel.launch(&self.config, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::HostCompiler;
    use crate::error::Error;
    use pic_backends::{host_kernel, CpuBackend};
    use pic_kernel_runtime::{ArrayArg, ElementKind};

    fn axpy(exec: &Executor) -> Kernel {
        exec.kernel(KernelSource::host(
            "axpy",
            host_kernel(|idx, frame| {
                let i = idx.global_x() as usize;
                if i < frame.len(1)? {
                    let a = frame.scalar_f64(0)?;
                    let x: f64 = frame.get(1, &[i])?;
                    let y: f64 = frame.get(2, &[i])?;
                    frame.set(2, &[i], a * x + y)?;
                }
                Ok(())
            }),
        ))
    }

    #[test]
    fn invoke_compiles_once_per_signature() {
        let exec = Executor::new().unwrap();
        let kernel = axpy(&exec);
        let x = exec.upload(&[1.0f64, 2.0, 3.0], &[3]).unwrap();
        let y = exec.upload(&[10.0f64, 20.0, 30.0], &[3]).unwrap();

        let bound = kernel.for_units(3).unwrap();
        bound.invoke(&[2.0f64.into(), x.arg(), y.arg()]).unwrap();
        bound.invoke(&[2.0f64.into(), x.arg(), y.arg()]).unwrap();

        assert_eq!(kernel.compilations(), 1);
        assert_eq!(exec.download(&y).unwrap(), vec![14.0, 28.0, 42.0]);
        assert_eq!(exec.stats().modules_loaded, 1);
        assert_eq!(exec.stats().launches, 2);
    }

    #[test]
    fn scalar_kind_change_recompiles() {
        let exec = Executor::new().unwrap();
        let kernel = axpy(&exec);
        let x = exec.zeros::<f64>(&[4]).unwrap();
        let y = exec.zeros::<f64>(&[4]).unwrap();

        kernel.configure_1d(1, 4).invoke(&[1.0f64.into(), x.arg(), y.arg()]).unwrap();
        kernel.configure_1d(1, 4).invoke(&[1.0f32.into(), x.arg(), y.arg()]).unwrap();
        assert_eq!(kernel.compilations(), 2);
        assert_eq!(kernel.cached_signatures().len(), 2);
    }

    #[test]
    fn unsupported_argument_fails_before_compiling() {
        let exec = Executor::new().unwrap();
        let kernel = axpy(&exec);
        let err = kernel
            .configure_1d(1, 1)
            .invoke(&[KernelArg::unsupported("dict")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(kernel.compilations(), 0);
        assert_eq!(exec.stats().modules_loaded, 0);
    }

    #[test]
    fn zero_threads_per_block_is_rejected() {
        let exec = Executor::new().unwrap();
        let kernel = axpy(&exec);
        let err = kernel.configure_1d(1, 0).invoke(&[1.0f64.into()]).unwrap_err();
        assert!(matches!(err, Error::Backend(pic_backends::BackendError::InvalidLaunchConfig(_))));
        assert_eq!(kernel.compilations(), 0);
    }

    #[test]
    fn failed_specialization_is_reported_and_not_cached() {
        let exec = Executor::new().unwrap();
        let kernel = exec.kernel(KernelSource::cuda("k", "__device__ void k() {}"));
        let err = kernel.configure_1d(1, 1).invoke(&[]).unwrap_err();
        assert!(matches!(err, Error::Specialization { ref kernel, .. } if kernel == "k"));
        assert_eq!(kernel.compilations(), 0);
        assert!(kernel.cached_signatures().is_empty());
    }

    #[test]
    fn kernels_keep_separate_caches() {
        let exec = Executor::new().unwrap();
        let a = axpy(&exec);
        let b = axpy(&exec);
        let x = exec.zeros::<f64>(&[2]).unwrap();
        let args = [0.5f64.into(), x.arg(), x.arg()];

        a.configure_1d(1, 2).invoke(&args).unwrap();
        assert_eq!(a.compilations(), 1);
        assert_eq!(b.compilations(), 0);

        let a2 = a.clone();
        a2.configure_1d(1, 2).invoke(&args).unwrap();
        assert_eq!(a.compilations(), 1);
    }

    #[test]
    fn strided_views_reach_the_kernel() {
        let backend = CpuBackend::new();
        let exec = Executor::from_parts(backend, HostCompiler::new());
        let kernel = exec.kernel(KernelSource::host(
            "mark",
            host_kernel(|idx, frame| {
                let i = idx.global_x() as usize;
                if i < frame.shape(0)?[0] {
                    frame.set(0, &[i], 1.0f64)?;
                }
                Ok(())
            }),
        ));
        let base = exec.zeros::<f64>(&[6]).unwrap();
        // Every other element of `base`.
        let view = ArrayArg::with_strides(base.handle().id(), ElementKind::F64, vec![3], vec![16]);

        kernel.configure_1d(1, 8).invoke(&[view.into()]).unwrap();
        assert_eq!(exec.download(&base).unwrap(), vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
    }
}
