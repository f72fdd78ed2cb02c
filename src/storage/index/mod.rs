#![forbid(unsafe_code)]

use std::hash::Hash;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::primitives::bitmap::Bitmap;
use crate::txn::{Transactional, Txn, TxnMode};
use crate::types::{QuadError, Result};

struct Staged<K> {
    /// Working copy of every bitmap touched by this transaction.
    adds: FxHashMap<K, Bitmap>,
    /// Committed keys whose bitmap emptied.
    dels: FxHashSet<K>,
}

/// Transactional map from a value to the bitmap of ids carrying it.
///
/// A key whose bitmap empties is dropped, so [`Index::lookup`] tells an
/// unused value apart from one with a populated bitmap.
pub struct Index<K> {
    label: String,
    max_id: u64,
    committed: RwLock<FxHashMap<K, Bitmap>>,
    staged: Mutex<Option<Staged<K>>>,
}

impl<K> Index<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    /// Creates an index accepting ids up to `max_id`.
    pub fn new(label: impl Into<String>, max_id: u64) -> Self {
        Self {
            label: label.into(),
            max_id,
            committed: RwLock::new(FxHashMap::default()),
            staged: Mutex::new(None),
        }
    }

    /// Highest id accepted by `register` and `delete`.
    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    fn check_id(&self, id: u64) -> Result<()> {
        if id > self.max_id {
            return Err(QuadError::Range {
                index: id,
                max: self.max_id,
            });
        }
        Ok(())
    }

    /// Sets `id` in the bitmap of `key`.
    pub fn insert(&self, txn: &Txn, key: K, id: u64) -> Result<()> {
        self.stage_bit(txn, key, id, |_| ())
    }

    /// Sets `id` in the bitmap of `key` and returns the updated bitmap.
    pub fn register(&self, txn: &Txn, key: K, id: u64) -> Result<Bitmap> {
        self.stage_bit(txn, key, id, Bitmap::clone)
    }

    fn stage_bit<R>(
        &self,
        txn: &Txn,
        key: K,
        id: u64,
        view: impl FnOnce(&Bitmap) -> R,
    ) -> Result<R> {
        txn.ensure_write()?;
        self.check_id(id)?;
        let committed = self.committed.read();
        let mut slot = self.staged.lock();
        let staged = slot.as_mut().ok_or(NOT_ENLISTED)?;
        let dels = &mut staged.dels;
        let bitmap = staged.adds.entry(key).or_insert_with_key(|key| {
            if dels.remove(key) {
                Bitmap::new()
            } else {
                committed.get(key).cloned().unwrap_or_default()
            }
        });
        bitmap.set(id)?;
        trace!(label = %self.label, id, "index.register");
        Ok(view(bitmap))
    }

    /// Clears `id` from the bitmap of `key`. Returns whether the key was
    /// present; the key itself goes away once its bitmap is empty.
    pub fn delete(&self, txn: &Txn, key: &K, id: u64) -> Result<bool> {
        txn.ensure_write()?;
        self.check_id(id)?;
        let committed = self.committed.read();
        let mut slot = self.staged.lock();
        let staged = slot.as_mut().ok_or(NOT_ENLISTED)?;
        let mut bitmap = match staged.adds.remove(key) {
            Some(bitmap) => bitmap,
            None if staged.dels.contains(key) => return Ok(false),
            None => match committed.get(key) {
                Some(bitmap) => bitmap.clone(),
                None => return Ok(false),
            },
        };
        bitmap.clear(id)?;
        if bitmap.is_empty() {
            if committed.contains_key(key) {
                staged.dels.insert(key.clone());
            }
            trace!(label = %self.label, id, "index.delete.drop_key");
        } else {
            staged.adds.insert(key.clone(), bitmap);
        }
        Ok(true)
    }

    /// Bitmap of `key`, `None` when the key is unused.
    pub fn lookup(&self, txn: &Txn, key: &K) -> Result<Option<Bitmap>> {
        let mode = txn.ensure_active()?;
        if mode == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                if staged.dels.contains(key) {
                    return Ok(None);
                }
                if let Some(bitmap) = staged.adds.get(key) {
                    return Ok(Some(bitmap.clone()));
                }
            }
        }
        Ok(self.committed.read().get(key).cloned())
    }

    /// Bitmap of `key`, empty when the key is unused.
    pub fn get(&self, txn: &Txn, key: &K) -> Result<Bitmap> {
        Ok(self.lookup(txn, key)?.unwrap_or_default())
    }

    /// Number of keys with a non-empty bitmap.
    pub fn size(&self, txn: &Txn) -> Result<usize> {
        let mode = txn.ensure_active()?;
        let committed = self.committed.read();
        let mut size = committed.len();
        if mode == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                size += staged
                    .adds
                    .keys()
                    .filter(|key| !committed.contains_key(*key))
                    .count();
                size -= staged.dels.len();
            }
        }
        Ok(size)
    }

    /// Every key with a non-empty bitmap, in no particular order.
    pub fn keys(&self, txn: &Txn) -> Result<Vec<K>> {
        let mode = txn.ensure_active()?;
        let committed = self.committed.read();
        if mode == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                let mut keys: Vec<K> = committed
                    .keys()
                    .filter(|key| !staged.dels.contains(*key) && !staged.adds.contains_key(*key))
                    .cloned()
                    .collect();
                keys.extend(staged.adds.keys().cloned());
                return Ok(keys);
            }
        }
        Ok(committed.keys().cloned().collect())
    }
}

const NOT_ENLISTED: QuadError = QuadError::Invalid("index not enlisted in the write transaction");

impl<K> Transactional for Index<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn prepare_begin(&self, mode: TxnMode) {
        if mode == TxnMode::Write {
            *self.staged.lock() = Some(Staged {
                adds: FxHashMap::default(),
                dels: FxHashSet::default(),
            });
        }
    }

    fn commit(&self) -> Result<()> {
        let Some(staged) = self.staged.lock().take() else {
            return Ok(());
        };
        let (adds, dels) = (staged.adds.len(), staged.dels.len());
        let mut committed = self.committed.write();
        for key in staged.dels {
            committed.remove(&key);
        }
        committed.extend(staged.adds);
        debug!(label = %self.label, adds, dels, keys = committed.len(), "index.commit");
        Ok(())
    }

    fn abort(&self) {
        self.staged.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{TxnController, TxnType};
    use std::sync::Arc;

    fn fixture(max_id: u64) -> (Arc<Index<u64>>, Arc<TxnController>) {
        let index = Arc::new(Index::new("idx", max_id));
        let ctl = TxnController::new("idx", index.clone());
        (index, ctl)
    }

    fn bits(map: &Bitmap) -> Vec<u64> {
        map.iter().collect()
    }

    #[test]
    fn register_accumulates_ids() -> Result<()> {
        let (index, ctl) = fixture(1_000);
        let mut txn = ctl.begin(TxnType::Write)?;
        assert_eq!(bits(&index.register(&txn, 7, 3)?), vec![3]);
        assert_eq!(bits(&index.register(&txn, 7, 9)?), vec![3, 9]);
        index.register(&txn, 8, 9)?;
        assert_eq!(index.size(&txn)?, 2);
        txn.commit()?;

        let reader = ctl.begin(TxnType::Read)?;
        assert_eq!(bits(&index.get(&reader, &7)?), vec![3, 9]);
        assert!(index.get(&reader, &99)?.is_empty());
        assert_eq!(index.lookup(&reader, &99)?, None);
        let mut keys = index.keys(&reader)?;
        keys.sort_unstable();
        assert_eq!(keys, vec![7, 8]);
        Ok(())
    }

    #[test]
    fn insert_stages_without_returning_the_bitmap() -> Result<()> {
        const N: u64 = 40_000;
        let (index, ctl) = fixture(N);
        let mut txn = ctl.txn();
        txn.execute(TxnMode::Write, |t| {
            for id in 0..N {
                index.insert(t, 1, id)?;
            }
            index.insert(t, 2, N)?;
            assert_eq!(index.get(t, &1)?.len(), N);
            Ok(())
        })?;
        let reader = ctl.begin(TxnType::Read)?;
        let ones = index.get(&reader, &1)?;
        assert_eq!(ones.len(), N);
        assert_eq!((ones.lowest(), ones.highest()), (Some(0), Some(N - 1)));
        assert_eq!(bits(&index.get(&reader, &2)?), vec![N]);
        drop(reader);

        let mut writer = ctl.begin(TxnType::Write)?;
        let err = index.insert(&writer, 3, N + 1).unwrap_err();
        assert!(matches!(err, QuadError::Range { .. }));
        writer.abort()
    }

    #[test]
    fn delete_clears_one_bit_and_drops_empty_keys() -> Result<()> {
        let (index, ctl) = fixture(1_000);
        let mut txn = ctl.txn();
        txn.execute(TxnMode::Write, |t| {
            index.register(t, 1, 10)?;
            index.register(t, 1, 11)?;
            index.register(t, 2, 10)?;
            Ok(())
        })?;
        txn.execute(TxnMode::Write, |t| {
            assert!(index.delete(t, &1, 10)?);
            assert!(index.delete(t, &2, 10)?);
            assert!(!index.delete(t, &2, 10)?);
            assert!(!index.delete(t, &3, 10)?);
            assert_eq!(index.size(t)?, 1);
            assert_eq!(index.lookup(t, &2)?, None);
            Ok(())
        })?;
        let reader = ctl.begin(TxnType::Read)?;
        assert_eq!(bits(&index.get(&reader, &1)?), vec![11]);
        assert_eq!(index.lookup(&reader, &2)?, None);
        assert_eq!(index.size(&reader)?, 1);
        Ok(())
    }

    #[test]
    fn key_can_return_after_emptying() -> Result<()> {
        let (index, ctl) = fixture(1_000);
        let mut txn = ctl.txn();
        txn.execute(TxnMode::Write, |t| index.register(t, 5, 1).map(drop))?;
        txn.execute(TxnMode::Write, |t| {
            index.delete(t, &5, 1)?;
            let again = index.register(t, 5, 2)?;
            assert_eq!(bits(&again), vec![2]);
            assert_eq!(index.size(t)?, 1);
            Ok(())
        })?;
        let reader = ctl.begin(TxnType::Read)?;
        assert_eq!(bits(&index.get(&reader, &5)?), vec![2]);
        Ok(())
    }

    #[test]
    fn ids_above_the_declared_maximum_are_rejected() -> Result<()> {
        let (index, ctl) = fixture(63);
        let txn = ctl.begin(TxnType::Write)?;
        index.register(&txn, 1, 63)?;
        let err = index.register(&txn, 1, 64).unwrap_err();
        assert!(matches!(err, QuadError::Range { index: 64, max: 63 }));
        assert!(index.delete(&txn, &1, 64).is_err());
        Ok(())
    }

    #[test]
    fn abort_discards_staged_bitmaps() -> Result<()> {
        let (index, ctl) = fixture(1_000);
        let mut txn = ctl.txn();
        txn.execute(TxnMode::Write, |t| index.register(t, 1, 1).map(drop))?;
        let mut writer = ctl.begin(TxnType::Write)?;
        index.register(&writer, 1, 2)?;
        index.delete(&writer, &1, 1)?;
        index.register(&writer, 4, 4)?;
        writer.abort()?;

        let reader = ctl.begin(TxnType::Read)?;
        assert_eq!(bits(&index.get(&reader, &1)?), vec![1]);
        assert_eq!(index.lookup(&reader, &4)?, None);
        Ok(())
    }
}
