//! Specialization cache of one kernel
//!
//! Maps an [`ArgumentSignature`] to the function handle compiled for it.
//! Entries are created once and never evicted.
//!
//! Each signature owns a slot with its own lock. The first caller for a
//! signature compiles while holding the slot; concurrent callers for the same
//! signature wait on it and reuse the result, so a signature is compiled and
//! loaded at most once. Different signatures compile independently.
//!
//! # Example
//!
//! ```
//! use pic_backends::FunctionHandle;
//! use pic_core::kernel::SpecializationCache;
//! use pic_kernel_runtime::{ArgKind, ArgumentSignature, ElementKind};
//!
//! let cache = SpecializationCache::new();
//! let sig = ArgumentSignature::new(vec![ArgKind::Scalar(ElementKind::F64)]);
//!
//! let (first, compiled) = cache.get_or_try_insert(&sig, || Ok(FunctionHandle::new(7)))?;
//! assert!(compiled);
//! let (again, compiled) = cache.get_or_try_insert(&sig, || unreachable!())?;
//! assert!(!compiled);
//! assert_eq!(first, again);
//! # Ok::<(), pic_core::Error>(())
//! ```

use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use pic_backends::FunctionHandle;
use pic_kernel_runtime::ArgumentSignature;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Slot = Arc<Mutex<Option<FunctionHandle>>>;

#[derive(Debug, Default)]
pub struct SpecializationCache {
    slots: RwLock<HashMap<ArgumentSignature, Slot>>,
    compilations: AtomicUsize,
}

impl SpecializationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle compiled for `signature`, if any.
    pub fn get(&self, signature: &ArgumentSignature) -> Option<FunctionHandle> {
        let slot = self.slots.read().get(signature).cloned()?;
        let handle = *slot.lock();
        handle
    }

    /// Return the handle for `signature`, running `compile` on a miss.
    ///
    /// The flag is true when this call compiled. A failed compile leaves the
    /// slot empty; the next call tries again.
    pub fn get_or_try_insert<F>(&self, signature: &ArgumentSignature, compile: F) -> Result<(FunctionHandle, bool)>
    where
        F: FnOnce() -> Result<FunctionHandle>,
    {
        let existing = self.slots.read().get(signature).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => Arc::clone(self.slots.write().entry(signature.clone()).or_default()),
        };

        let mut entry = slot.lock();
        if let Some(handle) = *entry {
            return Ok((handle, false));
        }

        let handle = compile()?;
        *entry = Some(handle);
        self.compilations.fetch_add(1, Ordering::Relaxed);
        Ok((handle, true))
    }

    /// Successful compilations so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Signatures with a compiled handle, in sorted order.
    pub fn signatures(&self) -> Vec<ArgumentSignature> {
        let mut signatures: Vec<_> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(signature, _)| signature.clone())
            .collect();
        signatures.sort();
        signatures
    }

    pub fn len(&self) -> usize {
        self.slots.read().values().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
