//! Integration tests for host/device residency of simulation data

use pic_backends::{host_kernel, Backend, CpuBackend};
use pic_core::simulation::{FieldComponent, Fields, ParticleQuantity, Species, StepContext};
use pic_core::{
    receive_data_from_device, send_data_to_device, with_device_residency, DeviceResident, Error, Executor,
    HostCompiler, Kernel, KernelSource, PicCycle, ResidencyGuard, ResidencySet, Simulation, SimulationConfig,
};
use pic_kernel_runtime::Complex128;
use proptest::prelude::*;
use std::panic::{self, AssertUnwindSafe};

fn config() -> SimulationConfig {
    SimulationConfig {
        dt: 0.25,
        use_device: true,
        show_progress: false,
        progress_interval: 1,
    }
}

fn simulation(backend: CpuBackend) -> Simulation {
    let exec = Executor::from_parts(backend, HostCompiler::new());
    let mut sim = Simulation::new(exec, Fields::new(8, 4, 2).unwrap(), config()).unwrap();
    sim.add_species(Species::new("electrons", -1.0, 1.0, 32).unwrap());
    sim.add_species(Species::new("ions", 1.0, 1836.0, 32).unwrap());
    sim
}

#[test]
fn test_double_send_transfers_each_aggregate_once() {
    let backend = CpuBackend::new();
    let observer = backend.clone();
    let mut sim = simulation(backend);
    let exec = sim.executor().clone();

    assert_eq!(send_data_to_device(&exec, &mut sim).unwrap(), 3);
    let after_first = observer.stats();
    // 2 modes x 10 components, then 8 quantities per species.
    assert_eq!(after_first.h2d_transfers, 20 + 8 + 8);

    assert_eq!(send_data_to_device(&exec, &mut sim).unwrap(), 0);
    assert_eq!(observer.stats().h2d_transfers, after_first.h2d_transfers);
    assert_eq!(sim.residency(), vec![true, true, true]);

    assert_eq!(receive_data_from_device(&exec, &mut sim).unwrap(), 3);
    assert_eq!(receive_data_from_device(&exec, &mut sim).unwrap(), 0);
    assert_eq!(observer.stats().d2h_transfers, 36);
    assert_eq!(observer.live_buffers(), 0);
}

#[test]
fn test_guard_restores_flags_on_success_and_error() {
    let mut sim = simulation(CpuBackend::new());
    let exec = sim.executor().clone();

    with_device_residency(&exec, &mut sim, |sim| {
        assert_eq!(sim.residency(), vec![true, true, true]);
        Ok(())
    })
    .unwrap();
    assert_eq!(sim.residency(), vec![false, false, false]);

    let err = with_device_residency(&exec, &mut sim, |_| -> pic_core::Result<()> {
        Err(Error::InvalidArgument("solver diverged".into()))
    })
    .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(sim.residency(), vec![false, false, false]);
}

#[test]
fn test_guard_restores_flags_on_panic() {
    let backend = CpuBackend::new();
    let observer = backend.clone();
    let mut sim = simulation(backend);
    let exec = sim.executor().clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let guard = ResidencyGuard::acquire(&exec, &mut sim).unwrap();
        assert_eq!(guard.residency(), vec![true, true, true]);
        panic!("push kernel failed");
    }));

    assert!(result.is_err());
    assert_eq!(sim.residency(), vec![false, false, false]);
    assert_eq!(observer.live_buffers(), 0);
}

#[test]
fn test_guard_leaves_preexisting_device_data_in_place() {
    let mut sim = simulation(CpuBackend::new());
    let exec = sim.executor().clone();
    sim.ptcl[1].send_to_device(&exec).unwrap();
    let expected = [sim.fld.residency_id(), sim.ptcl[0].residency_id()];

    let guard = ResidencyGuard::acquire(&exec, &mut sim).unwrap();
    assert_eq!(guard.moved(), &expected);
    guard.release().unwrap();

    assert_eq!(sim.residency(), vec![false, false, true]);
}

/// `(species name, on device)` for every species, in order.
fn species_flags(sim: &Simulation) -> Vec<(String, bool)> {
    sim.ptcl
        .iter()
        .map(|s| (s.name().to_string(), s.is_on_device()))
        .collect()
}

#[test]
fn test_guard_restores_species_reordered_inside_scope() {
    let mut sim = simulation(CpuBackend::new());
    let exec = sim.executor().clone();
    sim.ptcl[0].send_to_device(&exec).unwrap();
    let before = species_flags(&sim);

    let mut guard = ResidencyGuard::acquire(&exec, &mut sim).unwrap();
    guard.ptcl.swap(0, 1);
    guard.release().unwrap();

    let mut after = species_flags(&sim);
    after.sort();
    assert_eq!(after, before);
    assert!(!sim.fld.is_on_device());
}

#[test]
fn test_guard_survives_species_removed_inside_scope() {
    let mut sim = simulation(CpuBackend::new());
    let exec = sim.executor().clone();
    sim.ptcl[1].send_to_device(&exec).unwrap();

    {
        let mut guard = ResidencyGuard::acquire(&exec, &mut sim).unwrap();
        let electrons = guard.ptcl.remove(0);
        assert!(electrons.is_on_device());
    }

    assert_eq!(species_flags(&sim), vec![("ions".to_string(), true)]);
    assert!(!sim.fld.is_on_device());
}

#[test]
fn test_exhausted_device_memory_leaves_data_on_host() {
    // Fields alone need 2 * 10 * 8 * 4 * 16 = 10240 bytes.
    let backend = CpuBackend::new().with_memory_limit(4096);
    let observer = backend.clone();
    let mut sim = simulation(backend);
    let exec = sim.executor().clone();

    let err = ResidencyGuard::acquire(&exec, &mut sim).map(|_| ()).unwrap_err();
    assert!(err.is_resource_exhausted());
    assert_eq!(sim.residency(), vec![false, false, false]);
    assert_eq!(observer.live_buffers(), 0);
    assert!(sim.fld.get(FieldComponent::Ez, 1).unwrap().host_data().is_some());
}

#[test]
fn test_exhaustion_midway_rolls_back_moved_aggregates() {
    // Room for the fields and one species, not both.
    let backend = CpuBackend::new().with_memory_limit(10240 + 8 * 32 * 8);
    let observer = backend.clone();
    let mut sim = simulation(backend);
    let exec = sim.executor().clone();

    let err = ResidencyGuard::acquire(&exec, &mut sim).map(|_| ()).unwrap_err();
    assert!(err.is_resource_exhausted());
    assert_eq!(sim.residency(), vec![false, false, false]);
    assert_eq!(observer.live_buffers(), 0);
}

/// Drifts particles along z with a kernel while the data is on the device.
struct Drift {
    push: Kernel,
}

impl Drift {
    fn new(exec: &Executor) -> Self {
        let push = exec.kernel(
            KernelSource::host(
                "drift",
                host_kernel(|idx, frame| {
                    let i = idx.global_x() as usize;
                    if i < frame.len(0)? {
                        let dt = frame.scalar_f64(2)?;
                        let z: f64 = frame.get(0, &[i])?;
                        let uz: f64 = frame.get(1, &[i])?;
                        frame.set(0, &[i], z + uz * dt)?;
                    }
                    Ok(())
                }),
            )
            .with_arity(3),
        );
        Self { push }
    }
}

impl PicCycle for Drift {
    fn advance(&mut self, ctx: StepContext<'_>) -> pic_core::Result<()> {
        for species in ctx.ptcl.iter() {
            let z = species.get(ParticleQuantity::Z)?;
            let uz = species.get(ParticleQuantity::Uz)?;
            self.push
                .for_units(species.n_particles() as u64)?
                .invoke(&[z.arg(), uz.arg(), ctx.dt.into()])?;
        }
        Ok(())
    }
}

#[test]
fn test_step_runs_kernels_on_device_resident_data() {
    let mut sim = simulation(CpuBackend::new());
    sim.ptcl[0].host_mut(ParticleQuantity::Uz).unwrap().fill(2.0);
    sim.fld
        .get_mut(FieldComponent::Rho, 0)
        .unwrap()
        .host_data_mut()
        .unwrap()[0] = Complex128::new(5.0, 0.0);

    let mut cycle = Drift::new(sim.executor());
    sim.step(4, &mut cycle).unwrap();

    assert_eq!(cycle.push.compilations(), 1);
    assert_eq!(sim.residency(), vec![false, false, false]);
    assert!(sim.ptcl[0].host(ParticleQuantity::Z).unwrap().iter().all(|&z| z == 2.0));
    assert!(sim.ptcl[1].host(ParticleQuantity::Z).unwrap().iter().all(|&z| z == 0.0));
    assert_eq!(
        sim.fld.get(FieldComponent::Rho, 0).unwrap().host_data().unwrap()[0],
        Complex128::new(5.0, 0.0)
    );
}

#[test]
fn test_host_resident_data_is_rejected_by_kernels() {
    let exec = Executor::new().unwrap();
    let mut sim = Simulation::new(
        exec.clone(),
        Fields::new(2, 2, 1).unwrap(),
        SimulationConfig {
            use_device: false,
            ..config()
        },
    )
    .unwrap();
    sim.add_species(Species::new("electrons", -1.0, 1.0, 4).unwrap());

    let mut cycle = Drift::new(&exec);
    let err = sim.step(1, &mut cycle).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

fn simulation_with_flags(flags: &[bool]) -> Simulation {
    let exec = Executor::from_parts(CpuBackend::new(), HostCompiler::new());
    let mut sim = Simulation::new(exec, Fields::new(2, 2, 1).unwrap(), config()).unwrap();
    for i in 1..flags.len() {
        sim.add_species(Species::new(format!("s{i}"), -1.0, 1.0, 4).unwrap());
    }
    let exec = sim.executor().clone();
    for (aggregate, &on) in sim.aggregates_mut().into_iter().zip(flags) {
        if on {
            aggregate.send_to_device(&exec).unwrap();
        }
    }
    sim
}

proptest! {
    #[test]
    fn guard_restores_any_initial_residency(
        flags in prop::collection::vec(any::<bool>(), 1..6),
        fail_inside in any::<bool>(),
    ) {
        let mut sim = simulation_with_flags(&flags);
        let exec = sim.executor().clone();
        prop_assert_eq!(sim.residency(), flags.clone());

        let result = with_device_residency(&exec, &mut sim, |inner| {
            assert!(inner.residency().iter().all(|&on| on));
            if fail_inside {
                return Err(Error::InvalidArgument("cycle failed".into()));
            }
            Ok(())
        });

        prop_assert_eq!(result.is_err(), fail_inside);
        prop_assert_eq!(sim.residency(), flags);
    }
}
