#![forbid(unsafe_code)]

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::primitives::bitmap::{Bitmap, MAX_INDEX};
use crate::primitives::trie::RadixTrie;
use crate::storage::long_list::{IdxData, LongList};
use crate::txn::{Transactional, Txn, TxnMode};
use crate::types::{QuadError, Result};

/// Outcome of [`Dictionary::register`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Whether the value was already live.
    pub existed: bool,
    /// Stable id of the value.
    pub id: u64,
}

/// Counters for dictionary traffic.
#[derive(Default)]
pub struct DictMetrics {
    register_calls: AtomicU64,
    register_hits: AtomicU64,
    register_misses: AtomicU64,
    register_reuses: AtomicU64,
    deletes: AtomicU64,
    resolve_calls: AtomicU64,
    resolve_misses: AtomicU64,
}

/// Point-in-time copy of [`DictMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DictMetricsSnapshot {
    /// Calls to `register`.
    pub register_calls: u64,
    /// Registrations of an already live value.
    pub register_hits: u64,
    /// Registrations that allocated or revived an id.
    pub register_misses: u64,
    /// Allocations served from the free-list.
    pub register_reuses: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// Value to id lookups.
    pub resolve_calls: u64,
    /// Lookups that found nothing.
    pub resolve_misses: u64,
}

impl DictMetricsSnapshot {
    /// Share of `register` calls that hit a live value.
    pub fn register_hit_rate(&self) -> f64 {
        if self.register_calls == 0 {
            return 0.0;
        }
        self.register_hits as f64 / self.register_calls as f64
    }
}

impl DictMetrics {
    /// Reads every counter.
    pub fn snapshot(&self) -> DictMetricsSnapshot {
        DictMetricsSnapshot {
            register_calls: self.register_calls.load(Ordering::Relaxed),
            register_hits: self.register_hits.load(Ordering::Relaxed),
            register_misses: self.register_misses.load(Ordering::Relaxed),
            register_reuses: self.register_reuses.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            resolve_calls: self.resolve_calls.load(Ordering::Relaxed),
            resolve_misses: self.resolve_misses.load(Ordering::Relaxed),
        }
    }

    fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

type KeyFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

struct Committed<T> {
    trie: RadixTrie<IdxData<T>>,
    /// Free-list: ids available for reuse.
    deleted: Bitmap,
}

struct Staged<T> {
    adds: FxHashMap<String, IdxData<T>>,
    dels: FxHashMap<String, u64>,
    /// Free ids claimed by this transaction; always a subset of `deleted`.
    used: Bitmap,
    /// `deleted` minus `used`, copied from the free-list on first claim.
    available: Option<Bitmap>,
    /// Ids released by this transaction, reusable after commit.
    freed: Bitmap,
}

impl<T> Default for Staged<T> {
    fn default() -> Self {
        Self {
            adds: FxHashMap::default(),
            dels: FxHashMap::default(),
            used: Bitmap::new(),
            available: None,
            freed: Bitmap::new(),
        }
    }
}

/// Deduplicating map from values to stable ids.
///
/// Values are keyed by a caller-supplied string function and stored in a
/// radix trie; the id is the value's slot in a backing [`LongList`]. Ids of
/// deleted values go to a free-list bitmap and are reused lowest first.
pub struct Dictionary<T> {
    label: String,
    key_fn: KeyFn<T>,
    committed: RwLock<Committed<T>>,
    staged: Mutex<Option<Staged<T>>>,
    list: LongList<T>,
    metrics: Option<DictMetrics>,
}

impl<T: Clone + Send + Sync + Display + 'static> Dictionary<T> {
    /// Dictionary keyed by each value's `Display` rendering.
    pub fn with_display(label: impl Into<String>) -> Self {
        Self::new(label, |value: &T| value.to_string())
    }
}

impl<T: Clone + Send + Sync> Dictionary<T> {
    /// Dictionary keyed by `key_fn`, with metrics enabled.
    pub fn new<F>(label: impl Into<String>, key_fn: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        let label = label.into();
        Self {
            list: LongList::new(format!("{label}.list")),
            label,
            key_fn: Box::new(key_fn),
            committed: RwLock::new(Committed {
                trie: RadixTrie::new(),
                deleted: Bitmap::new(),
            }),
            staged: Mutex::new(None),
            metrics: Some(DictMetrics::default()),
        }
    }

    /// Enables or disables metrics collection.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled.then(DictMetrics::default);
        self
    }

    /// Counters, when metrics are enabled.
    pub fn metrics(&self) -> Option<DictMetricsSnapshot> {
        self.metrics.as_ref().map(DictMetrics::snapshot)
    }

    fn count(&self, pick: impl FnOnce(&DictMetrics) -> &AtomicU64) {
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.inc(pick(metrics));
        }
    }

    /// Returns the id of `value`, allocating one if it is not live.
    pub fn register(&self, txn: &Txn, value: T) -> Result<Registration> {
        txn.ensure_write()?;
        self.count(|m| &m.register_calls);
        let key = (self.key_fn)(&value);
        let committed = self.committed.read();
        let mut slot = self.staged.lock();
        let staged = slot.as_mut().ok_or(NOT_ENLISTED)?;

        if let Some(id) = staged.dels.remove(&key) {
            staged.freed.clear(id)?;
            self.list.set(txn, id, value)?;
            self.count(|m| &m.register_misses);
            trace!(label = %self.label, id, "dict.register.revive");
            return Ok(Registration { existed: false, id });
        }
        let known = staged
            .adds
            .get(&key)
            .or_else(|| committed.trie.get(&key))
            .map(IdxData::index);
        if let Some(id) = known {
            self.count(|m| &m.register_hits);
            trace!(label = %self.label, id, "dict.register.hit");
            return Ok(Registration { existed: true, id });
        }

        let available = staged
            .available
            .get_or_insert_with(|| committed.deleted.clone());
        let reusable = available.lowest();
        let id = match reusable {
            Some(id) => {
                available.clear(id)?;
                staged.used.set(id)?;
                self.list.set(txn, id, value.clone())?;
                self.count(|m| &m.register_reuses);
                id
            }
            None => {
                let next = self.list.len(txn)?;
                if next > MAX_INDEX {
                    return Err(QuadError::Range {
                        index: next,
                        max: MAX_INDEX,
                    });
                }
                self.list.add(txn, value.clone())?
            }
        };
        staged.adds.insert(key, IdxData::new(id, value));
        self.count(|m| &m.register_misses);
        trace!(label = %self.label, id, reused = reusable.is_some(), "dict.register.miss");
        Ok(Registration { existed: false, id })
    }

    /// Removes `value`, returning the id it held if it was live.
    pub fn delete(&self, txn: &Txn, value: &T) -> Result<Option<u64>> {
        txn.ensure_write()?;
        let key = (self.key_fn)(value);
        let committed = self.committed.read();
        let mut slot = self.staged.lock();
        let staged = slot.as_mut().ok_or(NOT_ENLISTED)?;

        if staged.dels.contains_key(&key) {
            return Ok(None);
        }
        let id = if let Some(entry) = staged.adds.remove(&key) {
            let id = entry.index();
            if staged.used.contains(id) {
                staged.used.clear(id)?;
                if let Some(available) = staged.available.as_mut() {
                    available.set(id)?;
                }
            } else {
                staged.freed.set(id)?;
            }
            id
        } else if let Some(entry) = committed.trie.get(&key) {
            let id = entry.index();
            staged.dels.insert(key, id);
            staged.freed.set(id)?;
            id
        } else {
            return Ok(None);
        };
        self.list.remove(txn, id)?;
        self.count(|m| &m.deletes);
        trace!(label = %self.label, id, "dict.delete");
        Ok(Some(id))
    }

    /// Id of `value` if it is live in this transaction's view.
    pub fn get_id(&self, txn: &Txn, value: &T) -> Result<Option<u64>> {
        let mode = txn.ensure_active()?;
        self.count(|m| &m.resolve_calls);
        let key = (self.key_fn)(value);
        let committed = self.committed.read();
        let mut found = None;
        let mut staged_hit = false;
        if mode == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                if staged.dels.contains_key(&key) {
                    staged_hit = true;
                } else if let Some(entry) = staged.adds.get(&key) {
                    staged_hit = true;
                    found = Some(entry.index());
                }
            }
        }
        if !staged_hit {
            found = committed.trie.get(&key).map(IdxData::index);
        }
        if found.is_none() {
            self.count(|m| &m.resolve_misses);
        }
        Ok(found)
    }

    /// Value stored under `id`.
    pub fn get_value(&self, txn: &Txn, id: u64) -> Result<Option<T>> {
        self.list.get(txn, id)
    }

    /// Whether `value` is live in this transaction's view.
    pub fn contains(&self, txn: &Txn, value: &T) -> Result<bool> {
        Ok(self.get_id(txn, value)?.is_some())
    }

    /// Number of live values.
    pub fn len(&self, txn: &Txn) -> Result<u64> {
        let mode = txn.ensure_active()?;
        let committed = self.committed.read().trie.len() as u64;
        if mode == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                return Ok(committed + staged.adds.len() as u64 - staged.dels.len() as u64);
            }
        }
        Ok(committed)
    }

    /// Ids of every live value.
    pub fn ids(&self, txn: &Txn) -> Result<Bitmap> {
        let mode = txn.ensure_active()?;
        let committed = self.committed.read();
        let mut ids = Bitmap::new();
        for entry in committed.trie.values() {
            ids.set(entry.index())?;
        }
        if mode == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                for id in staged.dels.values() {
                    ids.clear(*id)?;
                }
                for entry in staged.adds.values() {
                    ids.set(entry.index())?;
                }
            }
        }
        Ok(ids)
    }

    /// Live values in ascending id order.
    pub fn values(&self, txn: &Txn) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for id in self.ids(txn)?.iter() {
            let value = self
                .get_value(txn, id)?
                .ok_or(QuadError::Corruption("live dictionary id without a value"))?;
            out.push(value);
        }
        Ok(out)
    }

    /// Committed free-list.
    pub fn free_ids(&self) -> Bitmap {
        self.committed.read().deleted.clone()
    }
}

const NOT_ENLISTED: QuadError = QuadError::Invalid("dictionary not enlisted in the write transaction");

impl<T: Clone + Send + Sync> Transactional for Dictionary<T> {
    fn label(&self) -> &str {
        &self.label
    }

    fn prepare_begin(&self, mode: TxnMode) {
        if mode == TxnMode::Write {
            *self.staged.lock() = Some(Staged::default());
        }
        self.list.prepare_begin(mode);
    }

    fn commit(&self) -> Result<()> {
        let staged = self.staged.lock().take();
        if let Some(staged) = staged {
            let (adds, dels) = (staged.adds.len(), staged.dels.len());
            let mut committed = self.committed.write();
            for key in staged.dels.keys() {
                committed.trie.remove(key);
            }
            for (key, entry) in staged.adds {
                committed.trie.insert(key, entry);
            }
            committed.deleted.xor_with(&staged.used);
            committed.deleted.union_with(&staged.freed);
            debug!(
                label = %self.label,
                adds,
                dels,
                reused = staged.used.len(),
                free = committed.deleted.len(),
                "dict.commit"
            );
        }
        self.list.commit()
    }

    fn abort(&self) {
        self.staged.lock().take();
        self.list.abort();
    }

    fn end(&self) {
        self.list.end();
    }
}
