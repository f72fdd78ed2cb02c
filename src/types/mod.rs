#![forbid(unsafe_code)]

use std::fmt;

/// Dictionary id of one RDF term.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TermId(pub u64);
/// Dictionary id of one packed quad tuple.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct QuadId(pub u64);

/// Failures of the transaction lifecycle.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionError {
    /// `begin` called while a transaction is already active on the context.
    #[error("transaction already active")]
    AlreadyActive,
    /// Lifecycle call on a context with no active transaction.
    #[error("no active transaction")]
    NotActive,
    /// Mutation attempted while the transaction is in READ mode.
    #[error("write not permitted in a read transaction")]
    WriteNotPermitted,
    /// Another writer committed since this transaction began.
    #[error("concurrent modification")]
    ConcurrentModification,
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum QuadError {
    /// Underlying IO failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Index outside the addressable range.
    #[error("index {index} exceeds maximum {max}")]
    Range {
        /// Offending index.
        index: u64,
        /// Largest accepted index.
        max: u64,
    },
    /// Transaction lifecycle violation.
    #[error("transaction: {0}")]
    Transaction(#[from] TransactionError),
    /// WRITE transaction ended without commit or abort.
    #[error("write transaction ended without commit or abort; forced abort")]
    ForcedAbort,
    /// Stored data is inconsistent.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Configuration could not be parsed or applied.
    #[error("config: {0}")]
    Config(String),
    /// Unexpected internal failure.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type used throughout the crate.
pub type Result<T, E = QuadError> = std::result::Result<T, E>;

impl QuadError {
    /// Returns the transaction error kind, if this is one.
    pub fn transaction(&self) -> Option<TransactionError> {
        match self {
            QuadError::Transaction(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for QuadError {
    fn from(err: toml::de::Error) -> Self {
        QuadError::Config(err.to_string())
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for QuadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TermId {
    fn from(value: u64) -> Self {
        TermId(value)
    }
}

impl From<TermId> for u64 {
    fn from(value: TermId) -> Self {
        value.0
    }
}

impl From<u64> for QuadId {
    fn from(value: u64) -> Self {
        QuadId(value)
    }
}

impl From<QuadId> for u64 {
    fn from(value: QuadId) -> Self {
        value.0
    }
}
