use std::sync::Arc;

use tracing::info;

use super::engine::{QuadEngine, QuadRegistration};
use super::iter::{QuadIter, TripleIter};
use super::model::{Dim, Node, Quad, QuadPattern, Triple};
use crate::primitives::concurrency::LockSnapshot;
use crate::storage::catalog::DictMetricsSnapshot;
use crate::storage::options::StoreOptions;
use crate::txn::{Txn, TxnController, TxnMode, TxnType};
use crate::types::{QuadError, Result};

/// In-memory transactional quad store.
///
/// Every operation takes a [`Txn`] created by [`QuadStore::txn`] or
/// [`QuadStore::begin`]. Mutations on an idle context run in their own
/// WRITE transaction; reads on an idle context run in a private READ
/// transaction that lasts as long as the call (or the returned iterator).
///
/// ```
/// use quadstore::{Node, Quad, QuadPattern, QuadStore, StoreOptions, TxnType};
///
/// # fn main() -> quadstore::Result<()> {
/// let store = QuadStore::open(StoreOptions::default())?;
/// let mut txn = store.begin(TxnType::Write)?;
/// store.register(&mut txn, &Quad::new(
///     Node::iri("http://example.org/g"),
///     Node::iri("http://example.org/alice"),
///     Node::iri("http://xmlns.com/foaf/0.1/name"),
///     Node::literal("Alice"),
/// ))?;
/// txn.commit()?;
///
/// let reader = store.txn();
/// let pattern = QuadPattern::any().subject(Node::iri("http://example.org/alice"));
/// assert_eq!(store.find(&reader, &pattern)?.count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct QuadStore {
    options: StoreOptions,
    engine: Arc<QuadEngine>,
    controller: Arc<TxnController>,
}

impl QuadStore {
    /// Opens an empty store configured by `options`.
    pub fn open(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let engine = Arc::new(QuadEngine::new(&options));
        let controller = TxnController::new(options.name.as_str(), engine.clone());
        info!(
            name = %options.name,
            default_graph = %options.default_graph,
            reclaim_terms = options.reclaim_terms,
            "quads.open"
        );
        Ok(Self {
            options,
            engine,
            controller,
        })
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Controller issuing transactions on this store.
    pub fn controller(&self) -> &Arc<TxnController> {
        &self.controller
    }

    /// Underlying engine.
    pub fn engine(&self) -> &QuadEngine {
        &self.engine
    }

    /// Idle transaction context bound to this store.
    pub fn txn(&self) -> Txn {
        self.controller.txn()
    }

    /// New context with a transaction of `txn_type` already begun.
    pub fn begin(&self, txn_type: TxnType) -> Result<Txn> {
        self.controller.begin(txn_type)
    }

    fn check(&self, txn: &Txn) -> Result<()> {
        if self.controller.owns(txn) {
            Ok(())
        } else {
            Err(QuadError::Invalid("transaction belongs to another store"))
        }
    }

    /// Graph that receives plain triples.
    pub fn default_graph(&self) -> &Node {
        self.engine.default_graph()
    }

    /// Places `triple` in the default graph.
    pub fn as_quad(&self, triple: Triple) -> Quad {
        Quad::from_triple(triple, self.default_graph().clone())
    }

    /// Stores `quad` in a WRITE transaction, joining `txn` when it is active.
    pub fn register(&self, txn: &mut Txn, quad: &Quad) -> Result<QuadRegistration> {
        self.check(txn)?;
        txn.execute(TxnMode::Write, |t| self.engine.register(t, quad))
    }

    /// Stores `triple` in the default graph.
    pub fn register_triple(&self, txn: &mut Txn, triple: Triple) -> Result<QuadRegistration> {
        let quad = self.as_quad(triple);
        self.register(txn, &quad)
    }

    /// Removes `quad`; false when it was not stored.
    pub fn delete(&self, txn: &mut Txn, quad: &Quad) -> Result<bool> {
        self.check(txn)?;
        txn.execute(TxnMode::Write, |t| self.engine.delete(t, quad))
    }

    /// Removes `triple` from the default graph.
    pub fn delete_triple(&self, txn: &mut Txn, triple: Triple) -> Result<bool> {
        let quad = self.as_quad(triple);
        self.delete(txn, &quad)
    }

    /// Lazily yields the quads matching `pattern`, ascending by quad id.
    pub fn find<'a>(&'a self, txn: &'a Txn, pattern: &QuadPattern) -> Result<QuadIter<'a>> {
        let scope = self.controller.scope(txn)?;
        self.engine.find(scope, pattern)
    }

    /// Triple pattern over the default graph.
    pub fn find_triples<'a>(
        &'a self,
        txn: &'a Txn,
        subject: Option<Node>,
        predicate: Option<Node>,
        object: Option<Node>,
    ) -> Result<TripleIter<'a>> {
        let pattern = QuadPattern::new(Some(self.default_graph().clone()), subject, predicate, object);
        Ok(self.find(txn, &pattern)?.triples())
    }

    /// Whether `quad` is stored.
    pub fn contains(&self, txn: &Txn, quad: &Quad) -> Result<bool> {
        let scope = self.controller.scope(txn)?;
        self.engine.contains(&scope, quad)
    }

    /// Number of live quads.
    pub fn size(&self, txn: &Txn) -> Result<u64> {
        let scope = self.controller.scope(txn)?;
        self.engine.size(&scope)
    }

    /// Number of live terms.
    pub fn term_count(&self, txn: &Txn) -> Result<u64> {
        let scope = self.controller.scope(txn)?;
        self.engine.term_count(&scope)
    }

    /// Every term in use at `dim`.
    pub fn list_nodes(&self, txn: &Txn, dim: Dim) -> Result<Vec<Node>> {
        let scope = self.controller.scope(txn)?;
        self.engine.list_nodes(&scope, dim)
    }

    /// Whether `txn` has an active transaction.
    pub fn is_in_transaction(&self, txn: &Txn) -> bool {
        txn.is_active()
    }

    /// Mode of `txn`, `None` when idle.
    pub fn transaction_mode(&self, txn: &Txn) -> Option<TxnMode> {
        txn.mode()
    }

    /// Type `txn` was begun with, `None` when idle.
    pub fn transaction_type(&self, txn: &Txn) -> Option<TxnType> {
        txn.txn_type()
    }

    /// Resolves whatever `txn` has open: a WRITE is aborted, a READ ended.
    pub fn close(&self, txn: &mut Txn) -> Result<()> {
        self.check(txn)?;
        match txn.mode() {
            Some(TxnMode::Write) => txn.abort(),
            Some(TxnMode::Read) => txn.end(),
            None => Ok(()),
        }
    }

    /// Number of committed WRITE transactions.
    pub fn generation(&self) -> u64 {
        self.controller.generation()
    }

    /// Current admission lock state.
    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.controller.lock_snapshot()
    }

    /// Term dictionary counters.
    pub fn term_metrics(&self) -> Option<DictMetricsSnapshot> {
        self.engine.term_metrics()
    }

    /// Quad dictionary counters.
    pub fn quad_metrics(&self) -> Option<DictMetricsSnapshot> {
        self.engine.quad_metrics()
    }
}
