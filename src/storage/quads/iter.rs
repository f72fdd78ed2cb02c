use std::fmt;

use super::engine::QuadEngine;
use super::model::{Quad, Triple};
use crate::primitives::bitmap::{Bitmap, IntoIter};
use crate::txn::TxnScope;
use crate::types::Result;

/// Lazy result of a pattern query.
///
/// Holds the transaction it reads through; a private READ transaction
/// opened for the query ends when the iterator is dropped. Quads come out
/// in ascending quad id order.
pub struct QuadIter<'a> {
    engine: &'a QuadEngine,
    scope: TxnScope<'a>,
    ids: IntoIter,
    remaining: u64,
}

impl<'a> QuadIter<'a> {
    pub(crate) fn new(engine: &'a QuadEngine, scope: TxnScope<'a>, ids: Bitmap) -> Self {
        Self {
            remaining: ids.len(),
            engine,
            scope,
            ids: ids.into_iter(),
        }
    }

    /// Quads not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Drops the graph from every quad.
    pub fn triples(self) -> TripleIter<'a> {
        TripleIter { inner: self }
    }
}

impl Iterator for QuadIter<'_> {
    type Item = Result<Quad>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(self.engine.decode(&self.scope, id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl fmt::Debug for QuadIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadIter")
            .field("txn", &*self.scope)
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// [`QuadIter`] projected onto triples.
pub struct TripleIter<'a> {
    inner: QuadIter<'a>,
}

impl Iterator for TripleIter<'_> {
    type Item = Result<Triple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|quad| quad.map(|quad| quad.as_triple()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
