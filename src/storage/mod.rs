//! Transactional storage components and the quad store built from them.
//!
//! Every component stages the current writer's changes next to its
//! committed state and takes part in transactions through
//! [`crate::txn::Transactional`].

/// Deduplicating value dictionaries with id reuse.
pub mod catalog;

/// Value to id-bitmap inverted indexes.
pub mod index;

/// Sparse id-addressed lists.
pub mod long_list;

/// RDF quads over dictionaries and per-position indexes.
pub mod quads;

mod options;

pub use catalog::{DictMetricsSnapshot, Dictionary, Registration};
pub use index::Index;
pub use long_list::{IdxData, LongList};
pub use options::StoreOptions;
pub use quads::{
    Dim, IdxQuad, Literal, Node, Quad, QuadEngine, QuadIter, QuadPattern, QuadRegistration,
    QuadStore, Triple, TripleIter, DEFAULT_GRAPH_IRI,
};
