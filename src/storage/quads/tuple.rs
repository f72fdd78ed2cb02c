use std::fmt;

use super::model::Dim;
use crate::types::{QuadError, Result, TermId};

/// Encoded length of an [`IdxQuad`].
pub const IDX_QUAD_LEN: usize = 32;

/// Four term ids packed as big-endian `u64`s in G, S, P, O order.
///
/// Ordering is plain byte order over the 32 bytes.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdxQuad([u8; IDX_QUAD_LEN]);

impl IdxQuad {
    /// Packs four term ids.
    pub fn new(graph: TermId, subject: TermId, predicate: TermId, object: TermId) -> Self {
        let mut bytes = [0u8; IDX_QUAD_LEN];
        for (slot, term) in bytes.chunks_exact_mut(8).zip([graph, subject, predicate, object]) {
            slot.copy_from_slice(&term.0.to_be_bytes());
        }
        IdxQuad(bytes)
    }

    /// Parses a packed tuple.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; IDX_QUAD_LEN] = bytes
            .try_into()
            .map_err(|_| QuadError::Corruption("quad tuple must be 32 bytes"))?;
        Ok(IdxQuad(array))
    }

    /// Packed bytes.
    pub fn as_bytes(&self) -> &[u8; IDX_QUAD_LEN] {
        &self.0
    }

    /// Term id at position `dim`.
    pub fn term(&self, dim: Dim) -> TermId {
        let start = dim.index() * 8;
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.0[start..start + 8]);
        TermId(u64::from_be_bytes(word))
    }

    /// Term ids in tuple order.
    pub fn terms(&self) -> [TermId; 4] {
        Dim::ALL.map(|dim| self.term(dim))
    }

    /// Dictionary key: lowercase hex of the bytes.
    pub fn key(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for IdxQuad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [g, s, p, o] = self.terms();
        write!(f, "IdxQuad({g}, {s}, {p}, {o})")
    }
}

impl fmt::Display for IdxQuad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
