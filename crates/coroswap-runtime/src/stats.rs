//! Engine counters
//!
//! Updated on the switch path through `Cell`s, read as an `EngineStats`
//! snapshot.

use std::cell::Cell;

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Completed context switches (Restores of a coroutine or idle)
    pub switches: u64,
    /// Store operations
    pub stores: u64,
    /// Restore operations
    pub restores: u64,
    /// Total bytes copied out of the physical stack
    pub bytes_saved: u64,
    /// Total bytes copied back onto the physical stack
    pub bytes_restored: u64,
    /// Heap image buffers allocated (including regrows)
    pub buffers_allocated: u64,
    /// Heap image buffers freed
    pub buffers_released: u64,
    /// Coroutines spawned
    pub spawned: u64,
    /// Coroutines whose body returned (or panicked)
    pub finished: u64,
    /// Coroutines dropped without finishing
    pub discarded: u64,
    /// Largest single Store, in bytes
    pub peak_image: usize,
}

impl EngineStats {
    /// Buffers currently held
    pub fn buffers_live(&self) -> u64 {
        self.buffers_allocated - self.buffers_released
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub switches: Cell<u64>,
    pub stores: Cell<u64>,
    pub restores: Cell<u64>,
    pub bytes_saved: Cell<u64>,
    pub bytes_restored: Cell<u64>,
    pub buffers_allocated: Cell<u64>,
    pub buffers_released: Cell<u64>,
    pub spawned: Cell<u64>,
    pub finished: Cell<u64>,
    pub discarded: Cell<u64>,
    pub peak_image: Cell<usize>,
}

#[inline]
pub(crate) fn bump(counter: &Cell<u64>, by: u64) {
    counter.set(counter.get() + by);
}

impl StatCounters {
    pub fn record_store(&self, bytes: usize) {
        bump(&self.stores, 1);
        bump(&self.bytes_saved, bytes as u64);
        if bytes > self.peak_image.get() {
            self.peak_image.set(bytes);
        }
    }

    pub fn record_restore(&self, bytes: usize) {
        bump(&self.restores, 1);
        bump(&self.switches, 1);
        bump(&self.bytes_restored, bytes as u64);
    }

    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            switches: self.switches.get(),
            stores: self.stores.get(),
            restores: self.restores.get(),
            bytes_saved: self.bytes_saved.get(),
            bytes_restored: self.bytes_restored.get(),
            buffers_allocated: self.buffers_allocated.get(),
            buffers_released: self.buffers_released.get(),
            spawned: self.spawned.get(),
            finished: self.finished.get(),
            discarded: self.discarded.get(),
            peak_image: self.peak_image.get(),
        }
    }
}
