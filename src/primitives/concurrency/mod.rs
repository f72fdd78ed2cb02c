#![forbid(unsafe_code)]

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Many-readers or single-writer admission gate for transactions.
///
/// A waiting writer blocks new readers, so a steady stream of readers cannot
/// starve it. Guards release their slot on drop.
#[derive(Clone, Default)]
pub struct AdmissionLock {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<LockState>,
    released: Condvar,
}

#[derive(Default, Debug)]
struct LockState {
    readers: u32,
    writer: bool,
    writers_waiting: u32,
}

/// Snapshot of lock state for observability.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Number of active readers.
    pub readers: u32,
    /// Whether the writer slot is held.
    pub writer: bool,
    /// Writers blocked waiting for admission.
    pub writers_waiting: u32,
}

/// Guard representing a held reader slot.
pub struct ReaderGuard {
    _guard: SlotGuard,
}

/// Guard representing the held writer slot.
pub struct WriterGuard {
    _guard: SlotGuard,
}

impl AdmissionLock {
    /// Unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a reader slot, blocking while a writer holds or awaits the lock.
    pub fn acquire_reader(&self) -> ReaderGuard {
        let mut state = self.inner.state.lock();
        while state.writer || state.writers_waiting > 0 {
            self.inner.released.wait(&mut state);
        }
        state.readers = state.readers.saturating_add(1);
        drop(state);
        ReaderGuard {
            _guard: SlotGuard::new(self.inner.clone(), Slot::Reader),
        }
    }

    /// Acquires the writer slot, blocking until no reader or writer remains.
    pub fn acquire_writer(&self) -> WriterGuard {
        let mut state = self.inner.state.lock();
        state.writers_waiting += 1;
        while state.writer || state.readers > 0 {
            self.inner.released.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer = true;
        drop(state);
        WriterGuard {
            _guard: SlotGuard::new(self.inner.clone(), Slot::Writer),
        }
    }

    /// Attempts to acquire the writer slot without blocking.
    pub fn try_acquire_writer(&self) -> Option<WriterGuard> {
        let mut state = self.inner.state.lock();
        if state.writer || state.readers > 0 {
            return None;
        }
        state.writer = true;
        drop(state);
        Some(WriterGuard {
            _guard: SlotGuard::new(self.inner.clone(), Slot::Writer),
        })
    }

    /// Returns a snapshot of the current lock state.
    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.inner.state.lock();
        LockSnapshot {
            readers: state.readers,
            writer: state.writer,
            writers_waiting: state.writers_waiting,
        }
    }
}

struct SlotGuard {
    inner: Arc<Inner>,
    slot: Slot,
}

impl SlotGuard {
    fn new(inner: Arc<Inner>, slot: Slot) -> Self {
        Self { inner, slot }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            match self.slot {
                Slot::Reader => {
                    state.readers = state.readers.saturating_sub(1);
                }
                Slot::Writer => {
                    state.writer = false;
                }
            }
        }
        self.inner.released.notify_all();
    }
}

#[derive(Copy, Clone, Debug)]
enum Slot {
    Reader,
    Writer,
}
