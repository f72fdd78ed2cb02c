//! Quad storage: RDF terms, the packed quad tuple, the dictionary-encoded
//! engine and the transactional store facade.

mod engine;
mod iter;
mod model;
mod store;
mod tuple;

pub use engine::{QuadEngine, QuadRegistration};
pub use iter::{QuadIter, TripleIter};
pub use model::{Dim, Literal, Node, Quad, QuadPattern, Triple, DEFAULT_GRAPH_IRI};
pub use store::QuadStore;
pub use tuple::{IdxQuad, IDX_QUAD_LEN};
