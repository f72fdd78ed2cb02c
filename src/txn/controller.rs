use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::executor::{Section, TxnExecutor};
use super::{Promote, Transactional, TxnMode, TxnType};
use crate::primitives::concurrency::LockSnapshot;
use crate::types::{QuadError, Result, TransactionError};

/// Admission control plus the generation counter used for promotion.
///
/// `generation` advances exactly once per committed WRITE transaction.
pub struct TxnController {
    executor: TxnExecutor,
    generation: AtomicU64,
}

impl TxnController {
    /// Controller driving `participant`.
    pub fn new(label: impl Into<String>, participant: Arc<dyn Transactional>) -> Arc<Self> {
        Arc::new(Self {
            executor: TxnExecutor::new(label, participant),
            generation: AtomicU64::new(0),
        })
    }

    /// Name used on tracing events.
    pub fn label(&self) -> &str {
        self.executor.label()
    }

    /// Creates an idle transaction context.
    pub fn txn(self: &Arc<Self>) -> Txn {
        Txn {
            controller: Arc::clone(self),
            active: None,
        }
    }

    /// Creates a context and begins a transaction of `txn_type` on it.
    pub fn begin(self: &Arc<Self>, txn_type: TxnType) -> Result<Txn> {
        let mut txn = self.txn();
        txn.begin(txn_type)?;
        Ok(txn)
    }

    /// Number of committed WRITE transactions.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Current admission lock state.
    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.executor.lock_snapshot()
    }

    /// Whether `txn` was created by this controller.
    pub fn owns(self: &Arc<Self>, txn: &Txn) -> bool {
        Arc::ptr_eq(&txn.controller, self)
    }

    /// Joins `txn` if it is active, otherwise opens a private READ
    /// transaction that lives as long as the returned scope.
    pub fn scope<'a>(self: &Arc<Self>, txn: &'a Txn) -> Result<TxnScope<'a>> {
        if !self.owns(txn) {
            return Err(QuadError::Invalid(
                "transaction belongs to another controller",
            ));
        }
        if txn.is_active() {
            return Ok(TxnScope::Joined(txn));
        }
        Ok(TxnScope::Owned(self.begin(TxnType::Read)?))
    }

    fn advance(&self, version: u64) -> Result<u64> {
        self.generation
            .compare_exchange(version, version + 1, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| version + 1)
            .map_err(|seen| {
                QuadError::Internal(format!(
                    "generation {seen} does not match writer version {version}"
                ))
            })
    }
}

struct Active {
    txn_type: TxnType,
    mode: TxnMode,
    version: u64,
    _section: Section,
}

/// Explicit transaction context.
///
/// Idle until `begin`; at most one transaction is active per context.
/// Dropping a context with an active transaction ends a READ and
/// force-aborts a WRITE.
pub struct Txn {
    controller: Arc<TxnController>,
    active: Option<Active>,
}

impl Txn {
    /// Controller this context belongs to.
    pub fn controller(&self) -> &Arc<TxnController> {
        &self.controller
    }

    /// Whether a transaction is active.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Current mode, `None` when idle.
    pub fn mode(&self) -> Option<TxnMode> {
        self.active.as_ref().map(|active| active.mode)
    }

    /// Type the transaction was begun with.
    pub fn txn_type(&self) -> Option<TxnType> {
        self.active.as_ref().map(|active| active.txn_type)
    }

    /// Generation observed at begin or at the last promotion.
    pub fn version(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.version)
    }

    /// Whether the transaction currently holds the writer slot.
    pub fn is_writer(&self) -> bool {
        self.mode() == Some(TxnMode::Write)
    }

    /// Mode of the active transaction, or `NotActive`.
    pub fn ensure_active(&self) -> Result<TxnMode> {
        self.mode()
            .ok_or(QuadError::Transaction(TransactionError::NotActive))
    }

    /// Fails unless a WRITE transaction is active.
    pub fn ensure_write(&self) -> Result<()> {
        match self.mode() {
            Some(TxnMode::Write) => Ok(()),
            Some(TxnMode::Read) => Err(TransactionError::WriteNotPermitted.into()),
            None => Err(TransactionError::NotActive.into()),
        }
    }

    /// Starts a transaction, blocking until admitted.
    pub fn begin(&mut self, txn_type: TxnType) -> Result<()> {
        if self.active.is_some() {
            return Err(TransactionError::AlreadyActive.into());
        }
        let mode = txn_type.initial_mode();
        let executor = &self.controller.executor;
        let section = executor.enter(mode);
        executor.prepare(mode);
        let version = self.controller.generation();
        debug!(label = executor.label(), ?txn_type, version, "txn.begin");
        self.active = Some(Active {
            txn_type,
            mode,
            version,
            _section: section,
        });
        Ok(())
    }

    /// Publishes staged writes. In READ mode this only ends the transaction.
    pub fn commit(&mut self) -> Result<()> {
        let active = self.active.take().ok_or(TransactionError::NotActive)?;
        let controller = &self.controller;
        match active.mode {
            TxnMode::Read => {
                controller.executor.end_read();
                debug!(label = controller.label(), "txn.commit.read");
                Ok(())
            }
            TxnMode::Write => {
                let generation = controller
                    .executor
                    .commit_with(|| controller.advance(active.version))?;
                debug!(label = controller.label(), generation, "txn.commit");
                Ok(())
            }
        }
    }

    /// Discards staged writes and leaves the transaction.
    pub fn abort(&mut self) -> Result<()> {
        let active = self.active.take().ok_or(TransactionError::NotActive)?;
        let executor = &self.controller.executor;
        match active.mode {
            TxnMode::Read => executor.end_read(),
            TxnMode::Write => executor.abort(),
        }
        debug!(label = executor.label(), mode = ?active.mode, "txn.abort");
        Ok(())
    }

    /// Leaves the transaction. A WRITE that was neither committed nor
    /// aborted is aborted and reported as [`QuadError::ForcedAbort`].
    /// Idle contexts ignore `end`.
    pub fn end(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let executor = &self.controller.executor;
        match active.mode {
            TxnMode::Read => {
                executor.end_read();
                Ok(())
            }
            TxnMode::Write => {
                executor.abort();
                drop(active);
                warn!(label = executor.label(), "txn.end.forced_abort");
                Err(QuadError::ForcedAbort)
            }
        }
    }

    /// Converts an active READ into a WRITE.
    ///
    /// Returns `Ok(false)` when the transaction type forbids promotion or
    /// when `Promote::Isolated` finds a newer commit; the transaction then
    /// stays READ. May block while other transactions drain.
    pub fn promote(&mut self, how: Promote) -> Result<bool> {
        let active = self.active.as_ref().ok_or(TransactionError::NotActive)?;
        if active.mode == TxnMode::Write {
            return Ok(true);
        }
        if !active.txn_type.promotable() {
            return Ok(false);
        }
        match self.try_promote(how) {
            Ok(()) => Ok(true),
            Err(QuadError::Transaction(TransactionError::ConcurrentModification)) => {
                debug!(label = self.controller.label(), ?how, "txn.promote.conflict");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn try_promote(&mut self, how: Promote) -> Result<()> {
        let Active {
            txn_type, version, ..
        } = *self.active.as_ref().ok_or(TransactionError::NotActive)?;
        let controller = Arc::clone(&self.controller);
        let strict = how == Promote::Isolated;
        if strict && version != controller.generation() {
            return Err(TransactionError::ConcurrentModification.into());
        }
        // The shared slot has to go before the exclusive one can be granted.
        self.active = None;
        let exclusive = controller.executor.enter(TxnMode::Write);
        if strict && version != controller.generation() {
            drop(exclusive);
            self.active = Some(Active {
                txn_type,
                mode: TxnMode::Read,
                version,
                _section: controller.executor.enter(TxnMode::Read),
            });
            return Err(TransactionError::ConcurrentModification.into());
        }
        controller.executor.prepare(TxnMode::Write);
        let version = controller.generation();
        debug!(label = controller.label(), ?how, version, "txn.promote");
        self.active = Some(Active {
            txn_type,
            mode: TxnMode::Write,
            version,
            _section: exclusive,
        });
        Ok(())
    }

    /// Runs `op` inside a transaction of `mode`.
    ///
    /// An idle context begins one, then commits (WRITE) or ends (READ) on
    /// success and aborts on error. An active context is reused as is; asking
    /// for WRITE inside a READ fails with `WriteNotPermitted`.
    pub fn execute<R, F>(&mut self, mode: TxnMode, op: F) -> Result<R>
    where
        F: FnOnce(&Txn) -> Result<R>,
    {
        if self.is_active() {
            if mode == TxnMode::Write {
                self.ensure_write()?;
            }
            return op(self);
        }
        self.begin(mode.into())?;
        match op(self) {
            Ok(value) => {
                match mode {
                    TxnMode::Write => self.commit()?,
                    TxnMode::Read => self.end()?,
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.abort() {
                    warn!(label = self.controller.label(), error = %abort_err, "txn.execute.abort_failed");
                }
                Err(err)
            }
        }
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let executor = &self.controller.executor;
        match active.mode {
            TxnMode::Read => executor.end_read(),
            TxnMode::Write => {
                warn!(label = executor.label(), "txn.drop.forced_abort");
                executor.abort();
            }
        }
    }
}

impl fmt::Debug for Txn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Txn")
            .field("label", &self.controller.label())
            .field("type", &self.txn_type())
            .field("mode", &self.mode())
            .field("version", &self.version())
            .finish()
    }
}

/// Transaction used by a read operation: the caller's, or a private one.
pub enum TxnScope<'a> {
    /// Caller's active transaction.
    Joined(&'a Txn),
    /// Private READ, ended on drop.
    Owned(Txn),
}

impl Deref for TxnScope<'_> {
    type Target = Txn;

    fn deref(&self) -> &Txn {
        match self {
            TxnScope::Joined(txn) => txn,
            TxnScope::Owned(txn) => txn,
        }
    }
}
