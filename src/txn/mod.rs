//! Transaction protocol shared by every stateful component.
//!
//! A [`TxnController`] admits many READ transactions or one WRITE
//! transaction at a time and fans lifecycle events out to a single
//! [`Transactional`] participant, normally a [`TxnHandler`] composite.
//! Callers drive transactions through an explicit [`Txn`] context handed to
//! every store operation.
//!
//! Components keep their committed state readable by everyone and stage the
//! writer's mutations privately until `commit`. Because a writer excludes all
//! readers, a component only needs a single staging slot.

mod controller;
mod executor;
mod handler;

pub use controller::{Txn, TxnController, TxnScope};
pub use executor::TxnExecutor;
pub use handler::TxnHandler;

use crate::types::Result;

/// Current access mode of an active transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TxnMode {
    /// Shared access.
    Read,
    /// Exclusive access.
    Write,
}

/// Kind of transaction requested at `begin`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TxnType {
    /// Read-only; never promotes.
    Read,
    /// Exclusive writer from the start.
    Write,
    /// Starts READ and may promote to WRITE.
    ReadPromote,
    /// Starts READ and may promote, adopting newer commits on the way.
    ReadCommittedPromote,
}

impl TxnType {
    /// Mode the transaction starts in.
    pub fn initial_mode(self) -> TxnMode {
        match self {
            TxnType::Write => TxnMode::Write,
            TxnType::Read | TxnType::ReadPromote | TxnType::ReadCommittedPromote => TxnMode::Read,
        }
    }

    /// Whether a READ transaction of this type may become a writer.
    pub fn promotable(self) -> bool {
        !matches!(self, TxnType::Read)
    }
}

impl From<TxnMode> for TxnType {
    fn from(mode: TxnMode) -> Self {
        match mode {
            TxnMode::Read => TxnType::Read,
            TxnMode::Write => TxnType::Write,
        }
    }
}

/// Promotion policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Promote {
    /// Fails if any writer committed since the transaction began.
    Isolated,
    /// Always proceeds, adopting the latest committed state.
    ReadCommitted,
}

/// Lifecycle hooks of a component holding staged state.
///
/// `commit` and `abort` are only invoked for WRITE transactions, `end` only
/// for READ ones. Hooks run under the controller's system mutex, after the
/// admission lock has been taken.
pub trait Transactional: Send + Sync {
    /// Name used on tracing events.
    fn label(&self) -> &str;

    /// Allocates staging for a transaction starting (or promoted) in `mode`.
    fn prepare_begin(&self, mode: TxnMode);

    /// Merges staged mutations into committed state.
    fn commit(&self) -> Result<()>;

    /// Discards staged mutations.
    fn abort(&self);

    /// A READ transaction finished.
    fn end(&self) {}
}
