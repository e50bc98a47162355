//! Host/device residency of simulation data
//!
//! Simulation data is grouped into aggregates (the field structure, each
//! particle species) that move between host and device as a whole. Each
//! aggregate tracks where it lives; moving one that is already in place is a
//! no-op.
//!
//! ```text
//! ResidencyGuard::acquire(exec, sim)
//!   ├── use_device()? no  → nothing moves
//!   └── yes → send every host-resident aggregate, remember which
//! ...work on the device...
//! release() / Drop
//!   └── receive exactly the remembered aggregates
//! ```
//!
//! Aggregates that were already on the device when the guard was acquired
//! stay there after it is released.

use crate::error::Result;
use crate::executor::Executor;
use pic_tracing::perf_span;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESIDENCY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one aggregate, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResidencyId(u64);

impl ResidencyId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_RESIDENCY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ResidencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aggregate#{}", self.0)
    }
}

/// An aggregate of arrays that changes residency as a unit.
pub trait DeviceResident {
    /// Name for logs, e.g. `"fields"` or `"species electrons"`.
    fn label(&self) -> String;

    /// Identity used to find this aggregate again after its set changed.
    fn residency_id(&self) -> ResidencyId;

    fn is_on_device(&self) -> bool;

    /// Move every member array to the device.
    ///
    /// On failure nothing moved and [`is_on_device`](Self::is_on_device) is
    /// unchanged.
    fn send_to_device(&mut self, executor: &Executor) -> Result<()>;

    /// Move every member array back to host memory, with the same
    /// all-or-nothing contract as `send_to_device`.
    fn receive_from_device(&mut self, executor: &Executor) -> Result<()>;
}

/// A collection of aggregates that is moved together: one field structure
/// and zero or more species.
pub trait ResidencySet {
    /// Whether device execution is enabled for this set.
    fn use_device(&self) -> bool;

    /// Every aggregate, in a stable order.
    fn aggregates_mut(&mut self) -> Vec<&mut dyn DeviceResident>;

    fn aggregates(&self) -> Vec<&dyn DeviceResident>;

    /// Residency flag of every aggregate, in `aggregates()` order.
    fn residency(&self) -> Vec<bool> {
        self.aggregates().iter().map(|a| a.is_on_device()).collect()
    }
}

/// Send every host-resident aggregate of `set` to the device.
///
/// Returns how many aggregates were transferred.
pub fn send_data_to_device<S: ResidencySet + ?Sized>(executor: &Executor, set: &mut S) -> Result<usize> {
    let _span = perf_span!("send_data_to_device");
    let mut moved = 0;
    for aggregate in set.aggregates_mut() {
        if !aggregate.is_on_device() {
            aggregate.send_to_device(executor)?;
            moved += 1;
        }
    }
    Ok(moved)
}

/// Bring every device-resident aggregate of `set` back to host memory.
///
/// Returns how many aggregates were transferred.
pub fn receive_data_from_device<S: ResidencySet + ?Sized>(executor: &Executor, set: &mut S) -> Result<usize> {
    let _span = perf_span!("receive_data_from_device");
    let mut moved = 0;
    for aggregate in set.aggregates_mut() {
        if aggregate.is_on_device() {
            aggregate.receive_from_device(executor)?;
            moved += 1;
        }
    }
    Ok(moved)
}

/// Keeps a set's data on the device for a scope.
///
/// The guard dereferences to the set. Aggregates moved by
/// [`acquire`](Self::acquire) are brought back by [`release`](Self::release),
/// or by `Drop` when the scope is left early by an error or a panic.
/// Moved aggregates are remembered by [`ResidencyId`], so the set may be
/// reordered inside the scope. An aggregate removed from the set while on
/// the device cannot be brought back and is reported in the log.
pub struct ResidencyGuard<'a, S: ResidencySet + ?Sized> {
    executor: &'a Executor,
    set: &'a mut S,
    moved: Vec<ResidencyId>,
    released: bool,
}

impl<'a, S: ResidencySet + ?Sized> ResidencyGuard<'a, S> {
    pub fn acquire(executor: &'a Executor, set: &'a mut S) -> Result<Self> {
        let mut moved: Vec<ResidencyId> = Vec::new();

        if set.use_device() {
            let mut aggregates = set.aggregates_mut();
            let mut sent: Vec<usize> = Vec::new();
            for index in 0..aggregates.len() {
                if aggregates[index].is_on_device() {
                    continue;
                }
                if let Err(e) = aggregates[index].send_to_device(executor) {
                    for &undo in sent.iter().rev() {
                        let aggregate: &mut dyn DeviceResident = &mut *aggregates[undo];
                        if let Err(undo_err) = aggregate.receive_from_device(executor) {
                            tracing::error!(
                                aggregate = %aggregate.label(),
                                error = %undo_err,
                                "failed to restore aggregate after aborted acquire"
                            );
                        }
                    }
                    return Err(e);
                }
                sent.push(index);
                moved.push(aggregates[index].residency_id());
            }
        }

        tracing::debug!(moved = moved.len(), "residency_acquired");
        Ok(Self {
            executor,
            set,
            moved,
            released: false,
        })
    }

    /// Aggregates this guard moved to the device, in `aggregates_mut()`
    /// order at acquire time.
    pub fn moved(&self) -> &[ResidencyId] {
        &self.moved
    }

    /// Restore residency now and report transfer failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        let mut first_error = None;
        let mut pending = std::mem::take(&mut self.moved);
        let restored = pending.len();

        for aggregate in self.set.aggregates_mut().into_iter().rev() {
            let Some(pos) = pending.iter().position(|&id| id == aggregate.residency_id()) else {
                continue;
            };
            pending.swap_remove(pos);
            if !aggregate.is_on_device() {
                continue;
            }
            if let Err(e) = aggregate.receive_from_device(self.executor) {
                tracing::error!(aggregate = %aggregate.label(), error = %e, "failed to restore residency");
                first_error.get_or_insert(e);
            }
        }
        for id in pending {
            tracing::warn!(aggregate = %id, "aggregate left the set while on the device; not restored");
        }

        tracing::debug!(restored = restored, "residency_released");
        first_error.map_or(Ok(()), Err)
    }
}

impl<S: ResidencySet + ?Sized> Deref for ResidencyGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.set
    }
}

impl<S: ResidencySet + ?Sized> DerefMut for ResidencyGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.set
    }
}

impl<S: ResidencySet + ?Sized> Drop for ResidencyGuard<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            // Errors were already logged by restore.
            let _ = self.restore();
        }
    }
}

/// Run `f` with the set's data on the device when device execution is
/// enabled, restoring residency afterwards.
///
/// An error from `f` takes precedence over an error while restoring.
pub fn with_device_residency<S, R, F>(executor: &Executor, set: &mut S, f: F) -> Result<R>
where
    S: ResidencySet + ?Sized,
    F: FnOnce(&mut S) -> Result<R>,
{
    let mut guard = ResidencyGuard::acquire(executor, set)?;
    let result = f(&mut guard);
    let released = guard.release();
    let value = result?;
    released?;
    Ok(value)
}
