//! Transactional in-memory RDF quad store.
//!
//! Terms and quads are dictionary-encoded to dense ids; each quad position
//! keeps an inverted index from term id to a sparse bitmap of quad ids, and
//! pattern queries intersect those bitmaps. All state changes go through
//! explicit [`Txn`] contexts that give many concurrent readers or one
//! writer, with optional promotion of a reader to a writer.

#![warn(missing_docs)]

/// Tracing subscriber setup.
pub mod logging;
/// In-memory building blocks: bitmaps, tries and the admission lock.
pub mod primitives;
/// Dictionaries, indexes and the quad store built on them.
pub mod storage;
/// Transaction contexts and the lifecycle hooks of transactional components.
pub mod txn;
/// Errors and id newtypes.
pub mod types;

pub use logging::init_logging;
pub use primitives::bitmap::{Bitmap, MAX_INDEX};
pub use storage::{
    Dim, Literal, Node, Quad, QuadIter, QuadPattern, QuadRegistration, QuadStore, StoreOptions,
    Triple, TripleIter, DEFAULT_GRAPH_IRI,
};
pub use txn::{Promote, Txn, TxnController, TxnMode, TxnType};
pub use types::{QuadError, QuadId, Result, TermId, TransactionError};
