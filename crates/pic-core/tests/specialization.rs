//! Integration tests for signature-keyed kernel specialization
//!
//! These drive kernels end to end through the host backend: signature
//! derivation, compile-on-miss, marshalling and launch.

use pic_backends::{host_kernel, Backend, CpuBackend, LaunchGeometry};
use pic_core::{Error, Executor, HostCompiler, Kernel, KernelSource};
use pic_kernel_runtime::{ArgKind, ElementKind, KernelArg};
use std::sync::{Arc, Barrier};
use std::thread;

/// `out[i] = in[i] + 1` over the leading axis, for ranks 1 and 2.
fn increment(exec: &Executor) -> Kernel {
    exec.kernel(KernelSource::host(
        "increment",
        host_kernel(|idx, frame| {
            let i = idx.global_x() as usize;
            let shape = frame.shape(0)?;
            if i >= shape[0] {
                return Ok(());
            }
            match shape.len() {
                1 => {
                    let v: f64 = frame.get(0, &[i])?;
                    frame.set(0, &[i], v + 1.0)
                }
                _ => {
                    for j in 0..shape[1] {
                        let v: f64 = frame.get(0, &[i, j])?;
                        frame.set(0, &[i, j], v + 1.0)?;
                    }
                    Ok(())
                }
            }
        }),
    ))
}

#[test]
fn test_two_signatures_compile_twice() -> pic_core::Result<()> {
    let exec = Executor::new()?;
    let kernel = increment(&exec);

    let a = exec.zeros::<f64>(&[16])?;
    let b = exec.zeros::<f64>(&[4, 4])?;
    for _ in 0..3 {
        kernel.for_units(16)?.invoke(&[a.arg()])?;
        kernel.for_units(4)?.invoke(&[b.arg()])?;
    }

    assert_eq!(kernel.compilations(), 2);
    assert_eq!(exec.stats().modules_loaded, 2);
    assert_eq!(exec.download(&a)?, vec![3.0; 16]);
    assert_eq!(exec.download(&b)?, vec![3.0; 16]);
    Ok(())
}

#[test]
fn test_end_to_end_geometry_and_cache() -> pic_core::Result<()> {
    let exec = Executor::new()?;
    let kernel = increment(&exec);

    // 1000 elements at 256 threads per block: 4 blocks, first compilation.
    let big = exec.zeros::<f64>(&[1000])?;
    let bound = kernel.for_units(1000)?;
    assert_eq!(bound.config().grid.x, 4);
    assert_eq!(bound.config().block.x, 256);
    bound.invoke(&[big.arg()])?;
    assert_eq!(kernel.compilations(), 1);
    assert!(exec.download(&big)?.iter().all(|&v| v == 1.0));

    // Same element kind and rank, different length: cache hit.
    let small = exec.zeros::<f64>(&[500])?;
    kernel.for_units(500)?.invoke(&[small.arg()])?;
    assert_eq!(kernel.compilations(), 1);

    // Rank 2: new signature.
    let grid = exec.zeros::<f64>(&[10, 3])?;
    kernel.for_units(10)?.invoke(&[grid.arg()])?;
    assert_eq!(kernel.compilations(), 2);

    let ranks: Vec<_> = kernel
        .cached_signatures()
        .iter()
        .map(|sig| sig.kinds()[0].rank())
        .collect();
    assert_eq!(ranks.len(), 2);
    assert!(ranks.contains(&1) && ranks.contains(&2));
    Ok(())
}

#[test]
fn test_exact_multiple_gets_an_extra_block() -> pic_core::Result<()> {
    let config = LaunchGeometry::for_units_1d(256, 256)?;
    assert_eq!(config.grid.x, 2);
    Ok(())
}

#[test]
fn test_element_kind_is_part_of_the_signature() -> pic_core::Result<()> {
    let exec = Executor::new()?;
    let kernel = exec.kernel(KernelSource::host("touch", host_kernel(|_, _| Ok(()))));

    let f = exec.zeros::<f32>(&[8])?;
    let d = exec.zeros::<f64>(&[8])?;
    kernel.configure_1d(1, 8).invoke(&[f.arg()])?;
    kernel.configure_1d(1, 8).invoke(&[d.arg()])?;
    kernel.configure_1d(1, 8).invoke(&[d.arg(), 3i32.into()])?;

    assert_eq!(kernel.compilations(), 3);
    Ok(())
}

#[test]
fn test_invalid_arguments_never_compile() -> pic_core::Result<()> {
    let exec = Executor::new()?;
    let kernel = increment(&exec);
    let host_only = pic_core::ResidentArray::<f64>::zeros(vec![8]);

    let err = kernel.for_units(8)?.invoke(&[host_only.arg()]).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = kernel
        .for_units(8)?
        .invoke(&[KernelArg::unsupported("String")])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    assert_eq!(kernel.compilations(), 0);
    assert_eq!(exec.stats().modules_loaded, 0);
    Ok(())
}

#[test]
fn test_rank_limit_surfaces_as_specialization_error() -> pic_core::Result<()> {
    let exec = Executor::new()?;
    let kernel = increment(&exec);
    let deep = exec.zeros::<f64>(&[2, 2, 2, 2])?;

    let err = kernel.for_units(2)?.invoke(&[deep.arg()]).unwrap_err();
    match err {
        Error::Specialization { kernel: name, signature, .. } => {
            assert_eq!(name, "increment");
            assert_eq!(signature, "f64[4]");
        }
        other => panic!("expected specialization error, got {other:?}"),
    }
    assert_eq!(kernel.compilations(), 0);
    Ok(())
}

#[test]
fn test_ahead_of_time_specialization() -> pic_core::Result<()> {
    let exec = Executor::new()?;
    let kernel = increment(&exec);
    let sig = pic_kernel_runtime::ArgumentSignature::new(vec![ArgKind::Array {
        element: ElementKind::F64,
        rank: 1,
    }]);

    let handle = kernel.specialize(&sig)?;
    assert_eq!(kernel.specialize(&sig)?, handle);

    let x = exec.zeros::<f64>(&[4])?;
    kernel.for_units(4)?.invoke(&[x.arg()])?;
    assert_eq!(kernel.compilations(), 1);
    Ok(())
}

#[test]
fn test_concurrent_first_calls_share_one_compilation() {
    let backend = CpuBackend::new();
    let observer = backend.clone();
    let exec = Executor::from_parts(backend, HostCompiler::new());
    let kernel = increment(&exec);
    let arrays: Vec<_> = (0..6).map(|_| exec.zeros::<f64>(&[64]).unwrap()).collect();
    let args: Vec<KernelArg> = arrays.iter().map(|a| a.arg()).collect();
    let barrier = Arc::new(Barrier::new(args.len()));

    let handles: Vec<_> = args
        .into_iter()
        .map(|arg| {
            let kernel = kernel.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                kernel.for_units(64).unwrap().invoke(&[arg]).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(kernel.compilations(), 1);
    assert_eq!(observer.stats().modules_loaded, 1);
    for array in &arrays {
        assert_eq!(exec.download(array).unwrap(), vec![1.0; 64]);
    }
}
