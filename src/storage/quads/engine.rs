use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::iter::QuadIter;
use super::model::{Dim, Node, Quad, QuadPattern};
use super::tuple::IdxQuad;
use crate::primitives::bitmap::Bitmap;
use crate::storage::catalog::{DictMetricsSnapshot, Dictionary};
use crate::storage::index::Index;
use crate::storage::options::StoreOptions;
use crate::txn::{Transactional, Txn, TxnHandler, TxnMode, TxnScope};
use crate::types::{QuadError, QuadId, Result, TermId};

/// Outcome of [`QuadEngine::register`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QuadRegistration {
    /// Id of the quad.
    pub id: QuadId,
    /// Whether the quad was already stored.
    pub existed: bool,
}

/// Dictionary-encoded quad table with one inverted bitmap index per
/// position.
///
/// Terms map to ids through `terms`; the packed id tuple of a quad maps to
/// the quad id through `quads`; `maps[dim]` maps a term id to the bitmap of
/// quad ids holding that term at `dim`. Patterns are answered by
/// intersecting the bitmaps of their bound positions.
pub struct QuadEngine {
    label: String,
    terms: Arc<Dictionary<Node>>,
    quads: Arc<Dictionary<IdxQuad>>,
    maps: [Arc<Index<TermId>>; 4],
    parts: TxnHandler,
    default_graph: Node,
    reclaim_terms: bool,
}

impl QuadEngine {
    /// Empty engine configured from `options`.
    pub fn new(options: &StoreOptions) -> Self {
        let name = options.name.as_str();
        let terms = Arc::new(
            Dictionary::with_display(format!("{name}.terms")).with_metrics(options.dict_metrics),
        );
        let quads = Arc::new(
            Dictionary::new(format!("{name}.quads"), IdxQuad::key)
                .with_metrics(options.dict_metrics),
        );
        let maps = Dim::ALL.map(|dim| {
            Arc::new(Index::new(
                format!("{name}.idx.{}", dim.name()),
                options.max_quad_id,
            ))
        });
        let mut parts = TxnHandler::new(name);
        for map in &maps {
            parts.push(map.clone());
        }
        parts.push(quads.clone());
        parts.push(terms.clone());
        Self {
            label: name.to_owned(),
            terms,
            quads,
            maps,
            parts,
            default_graph: Node::iri(options.default_graph.as_str()),
            reclaim_terms: options.reclaim_terms,
        }
    }

    /// Graph that receives plain triples.
    pub fn default_graph(&self) -> &Node {
        &self.default_graph
    }

    /// Participant labels in commit order.
    pub fn participants(&self) -> Vec<&str> {
        self.parts.labels()
    }

    /// Stores `quad`, registering its terms first.
    pub fn register(&self, txn: &Txn, quad: &Quad) -> Result<QuadRegistration> {
        txn.ensure_write()?;
        let mut ids = [TermId(0); 4];
        for dim in Dim::ALL {
            ids[dim.index()] = TermId(self.terms.register(txn, quad.get(dim).clone())?.id);
        }
        let [g, s, p, o] = ids;
        let reg = self.quads.register(txn, IdxQuad::new(g, s, p, o))?;
        if !reg.existed {
            for dim in Dim::ALL {
                self.maps[dim.index()].insert(txn, ids[dim.index()], reg.id)?;
            }
        }
        trace!(label = %self.label, id = reg.id, existed = reg.existed, "quads.register");
        Ok(QuadRegistration {
            id: QuadId(reg.id),
            existed: reg.existed,
        })
    }

    /// Removes `quad`. Returns false when it was not stored.
    pub fn delete(&self, txn: &Txn, quad: &Quad) -> Result<bool> {
        txn.ensure_write()?;
        let Some(ids) = self.resolve(txn, quad)? else {
            return Ok(false);
        };
        let [g, s, p, o] = ids;
        let Some(id) = self.quads.delete(txn, &IdxQuad::new(g, s, p, o))? else {
            return Ok(false);
        };
        for dim in Dim::ALL {
            self.maps[dim.index()].delete(txn, &ids[dim.index()], id)?;
        }
        if self.reclaim_terms {
            for dim in Dim::ALL {
                let term = ids[dim.index()];
                if self.is_unreferenced(txn, term)? {
                    if let Some(freed) = self.terms.delete(txn, quad.get(dim))? {
                        trace!(label = %self.label, term = freed, "quads.reclaim_term");
                    }
                }
            }
        }
        trace!(label = %self.label, id, "quads.delete");
        Ok(true)
    }

    /// Term ids of `quad`, or `None` if any term is unknown.
    fn resolve(&self, txn: &Txn, quad: &Quad) -> Result<Option<[TermId; 4]>> {
        let mut ids = [TermId(0); 4];
        for dim in Dim::ALL {
            match self.terms.get_id(txn, quad.get(dim))? {
                Some(id) => ids[dim.index()] = TermId(id),
                None => return Ok(None),
            }
        }
        Ok(Some(ids))
    }

    fn is_unreferenced(&self, txn: &Txn, term: TermId) -> Result<bool> {
        for map in &self.maps {
            if map.lookup(txn, &term)?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `quad` is stored.
    pub fn contains(&self, txn: &Txn, quad: &Quad) -> Result<bool> {
        txn.ensure_active()?;
        let Some([g, s, p, o]) = self.resolve(txn, quad)? else {
            return Ok(false);
        };
        self.quads.contains(txn, &IdxQuad::new(g, s, p, o))
    }

    /// Quad ids matching `pattern`.
    ///
    /// An unknown term and a term never used at its position both give the
    /// empty set. With nothing bound every live quad id is returned.
    pub fn candidates(&self, txn: &Txn, pattern: &QuadPattern) -> Result<Bitmap> {
        txn.ensure_active()?;
        let mut bound: SmallVec<[Bitmap; 4]> = SmallVec::new();
        for dim in Dim::ALL {
            let Some(node) = pattern.get(dim) else {
                continue;
            };
            let Some(term) = self.terms.get_id(txn, node)? else {
                debug!(label = %self.label, dim = dim.name(), "quads.find.unknown_term");
                return Ok(Bitmap::new());
            };
            match self.maps[dim.index()].lookup(txn, &TermId(term))? {
                Some(bitmap) => bound.push(bitmap),
                None => {
                    debug!(label = %self.label, dim = dim.name(), term, "quads.find.unused_term");
                    return Ok(Bitmap::new());
                }
            }
        }
        let result = if bound.is_empty() {
            self.quads.ids(txn)?
        } else {
            let refs: SmallVec<[&Bitmap; 4]> = bound.iter().collect();
            Bitmap::intersection(&refs)
        };
        debug!(
            label = %self.label,
            bound = bound.len(),
            candidates = result.len(),
            "quads.find"
        );
        Ok(result)
    }

    /// Lazily decodes every quad matching `pattern`, in ascending id order.
    pub fn find<'a>(&'a self, scope: TxnScope<'a>, pattern: &QuadPattern) -> Result<QuadIter<'a>> {
        let ids = self.candidates(&scope, pattern)?;
        Ok(QuadIter::new(self, scope, ids))
    }

    /// Reads quad `id` back into terms.
    pub fn decode(&self, txn: &Txn, id: u64) -> Result<Quad> {
        let tuple = self
            .quads
            .get_value(txn, id)?
            .ok_or(QuadError::Corruption("live quad id without a tuple"))?;
        let [g, s, p, o] = tuple.terms().map(|term| self.term(txn, term));
        Ok(Quad::new(g?, s?, p?, o?))
    }

    fn term(&self, txn: &Txn, id: TermId) -> Result<Node> {
        self.terms
            .get_value(txn, id.0)?
            .ok_or(QuadError::Corruption("quad references a missing term"))
    }

    /// Every term used at `dim`, in ascending term id order.
    pub fn list_nodes(&self, txn: &Txn, dim: Dim) -> Result<Vec<Node>> {
        let mut ids = self.maps[dim.index()].keys(txn)?;
        ids.sort_unstable();
        ids.into_iter().map(|id| self.term(txn, id)).collect()
    }

    /// Number of live quads.
    pub fn size(&self, txn: &Txn) -> Result<u64> {
        self.quads.len(txn)
    }

    /// Number of live terms.
    pub fn term_count(&self, txn: &Txn) -> Result<u64> {
        self.terms.len(txn)
    }

    /// Term dictionary counters.
    pub fn term_metrics(&self) -> Option<DictMetricsSnapshot> {
        self.terms.metrics()
    }

    /// Quad dictionary counters.
    pub fn quad_metrics(&self) -> Option<DictMetricsSnapshot> {
        self.quads.metrics()
    }
}

impl Transactional for QuadEngine {
    fn label(&self) -> &str {
        &self.label
    }

    fn prepare_begin(&self, mode: TxnMode) {
        self.parts.prepare_begin(mode);
    }

    fn commit(&self) -> Result<()> {
        self.parts.commit()
    }

    fn abort(&self) {
        self.parts.abort();
    }

    fn end(&self) {
        self.parts.end();
    }
}
