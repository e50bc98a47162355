//! Binding processes to accelerators
//!
//! Ranks are spread round-robin over the visible devices: rank `r` gets
//! device `r % n`. Selection happens in `n` rounds separated by barriers, so
//! ranks sharing a device bind it in the same round and no rank continues
//! before every rank has bound its device.

use crate::error::{Error, Result};
use crate::executor::Executor;
use std::sync::{Arc, Barrier};

/// Process-group interface: who am I, how many are we, wait for everyone.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Block until every rank of the group has called `barrier`.
    fn barrier(&self);
}

/// A group of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommunicator;

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}
}

/// Ranks running as threads of one process.
#[derive(Debug, Clone)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
}

impl ThreadCommunicator {
    /// One communicator per rank of a group of `size`; hand each to its own thread.
    pub fn group(size: usize) -> Vec<ThreadCommunicator> {
        let barrier = Arc::new(Barrier::new(size));
        (0..size)
            .map(|rank| ThreadCommunicator {
                rank,
                size,
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.barrier.wait();
    }
}

/// Device index assigned to `rank` when `n_devices` are visible.
///
/// # Panics
///
/// Panics if `n_devices` is zero.
pub const fn device_for_rank(rank: usize, n_devices: usize) -> usize {
    rank % n_devices
}

/// Bind the executor to this rank's device and wait for the whole group.
///
/// Every rank must call this. Returns the selected device index.
pub fn select_device<C: Communicator + ?Sized>(comm: &C, executor: &Executor) -> Result<usize> {
    let n_devices = executor.device_count()?;
    if n_devices == 0 {
        return Err(Error::Configuration(format!(
            "rank {} found no accelerator devices",
            comm.rank()
        )));
    }

    let rank = comm.rank();
    let target = device_for_rank(rank, n_devices);
    let mut outcome = Ok(target);

    for round in 0..n_devices {
        if round == target {
            if let Err(e) = executor.select_device(target) {
                outcome = Err(e);
            }
        }
        // Every rank joins every round, including after a failed bind.
        comm.barrier();
    }

    match &outcome {
        Ok(device) => tracing::info!(
            rank = rank,
            size = comm.size(),
            device = device,
            n_devices = n_devices,
            "device_selected"
        ),
        Err(e) => tracing::error!(rank = rank, device = target, error = %e, "device selection failed"),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::HostCompiler;
    use pic_backends::CpuBackend;
    use std::thread;

    #[test]
    fn round_robin_mapping() {
        let assigned: Vec<_> = (0..5).map(|r| device_for_rank(r, 2)).collect();
        assert_eq!(assigned, vec![0, 1, 0, 1, 0]);
        assert_eq!(device_for_rank(7, 1), 0);
    }

    #[test]
    fn local_communicator_binds_device_zero() {
        let exec = Executor::from_parts(CpuBackend::with_devices(4), HostCompiler::new());
        assert_eq!(select_device(&LocalCommunicator, &exec).unwrap(), 0);
        assert_eq!(exec.current_device(), 0);
    }

    #[test]
    fn zero_devices_is_a_configuration_error() {
        let exec = Executor::from_parts(CpuBackend::with_devices(0), HostCompiler::new());
        let err = select_device(&LocalCommunicator, &exec).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn thread_group_binds_every_rank() {
        let handles: Vec<_> = ThreadCommunicator::group(3)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let exec = Executor::from_parts(CpuBackend::with_devices(3), HostCompiler::new());
                    select_device(&comm, &exec).unwrap();
                    (comm.rank(), exec.current_device())
                })
            })
            .collect();

        for handle in handles {
            let (rank, device) = handle.join().unwrap();
            assert_eq!(rank, device);
        }
    }
}
