//! Benchmarks for kernel dispatch overhead
//!
//! Measures the cost of a cached launch (signature, lookup, marshal, launch)
//! against a trivial host kernel, and the cost of a residency round trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pic_backends::host_kernel;
use pic_core::simulation::{Fields, Species};
use pic_core::{with_device_residency, Executor, KernelSource, Simulation, SimulationConfig};
use pic_kernel_runtime::ArgumentSignature;

fn benchmark_cached_launch(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_launch");

    for size in [1usize, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let exec = Executor::new().unwrap();
            let kernel = exec.kernel(KernelSource::host("noop", host_kernel(|_, _| Ok(()))));
            let x = exec.zeros::<f64>(&[size]).unwrap();
            let args = [x.arg(), 1.0f64.into()];
            let bound = kernel.configure_1d(1, 1);
            bound.invoke(&args).unwrap();

            b.iter(|| bound.invoke(&args).unwrap());
        });
    }

    group.finish();
}

fn benchmark_signature(c: &mut Criterion) {
    let exec = Executor::new().unwrap();
    let a = exec.zeros::<f64>(&[64, 64]).unwrap();
    let b = exec.zeros::<f32>(&[4096]).unwrap();
    let args = [a.arg(), b.arg(), 2i32.into(), 0.5f64.into()];

    c.bench_function("argument_signature", |bench| {
        bench.iter(|| ArgumentSignature::of(&args).unwrap());
    });
}

fn benchmark_residency_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("residency_round_trip");

    for particles in [1_000usize, 100_000].iter() {
        group.throughput(Throughput::Bytes((*particles * 8 * 8) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(particles), particles, |b, &particles| {
            let exec = Executor::new().unwrap();
            let config = SimulationConfig {
                use_device: true,
                show_progress: false,
                ..SimulationConfig::default()
            };
            let mut sim = Simulation::new(exec.clone(), Fields::new(32, 16, 2).unwrap(), config).unwrap();
            sim.add_species(Species::new("electrons", -1.0, 1.0, particles).unwrap());

            b.iter(|| with_device_residency(&exec, &mut sim, |_| Ok(())).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_cached_launch,
    benchmark_signature,
    benchmark_residency_round_trip
);
criterion_main!(benches);
