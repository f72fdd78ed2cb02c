use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{Transactional, TxnMode};
use crate::primitives::concurrency::{AdmissionLock, LockSnapshot, ReaderGuard, WriterGuard};
use crate::types::Result;

/// Slot held in the admission lock by an active transaction.
pub(crate) enum Section {
    Shared { _guard: ReaderGuard },
    Exclusive { _guard: WriterGuard },
}

/// Runs lifecycle hooks of one participant under the admission lock.
///
/// Lock order is always admission first, then the system mutex.
pub struct TxnExecutor {
    label: String,
    admission: AdmissionLock,
    system: Mutex<()>,
    participant: Arc<dyn Transactional>,
}

impl TxnExecutor {
    /// Executor serializing transactions on `participant`.
    pub fn new(label: impl Into<String>, participant: Arc<dyn Transactional>) -> Self {
        Self {
            label: label.into(),
            admission: AdmissionLock::new(),
            system: Mutex::new(()),
            participant,
        }
    }

    /// Name used on tracing events.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current admission lock state.
    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.admission.snapshot()
    }

    /// Blocks until admitted in `mode`.
    pub(crate) fn enter(&self, mode: TxnMode) -> Section {
        match mode {
            TxnMode::Read => Section::Shared {
                _guard: self.admission.acquire_reader(),
            },
            TxnMode::Write => Section::Exclusive {
                _guard: self.admission.acquire_writer(),
            },
        }
    }

    pub(crate) fn prepare(&self, mode: TxnMode) {
        let _system = self.system.lock();
        trace!(label = %self.label, ?mode, "txn.exec.prepare");
        self.participant.prepare_begin(mode);
    }

    /// Commits the participant, then runs `after` under the same mutex.
    /// A failed participant commit aborts what is still staged.
    pub(crate) fn commit_with<T>(&self, after: impl FnOnce() -> Result<T>) -> Result<T> {
        let _system = self.system.lock();
        trace!(label = %self.label, "txn.exec.commit");
        if let Err(err) = self.participant.commit() {
            self.participant.abort();
            return Err(err);
        }
        after()
    }

    pub(crate) fn abort(&self) {
        let _system = self.system.lock();
        trace!(label = %self.label, "txn.exec.abort");
        self.participant.abort();
    }

    pub(crate) fn end_read(&self) {
        let _system = self.system.lock();
        self.participant.end();
    }
}
