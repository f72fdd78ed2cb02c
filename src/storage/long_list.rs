//! Paged logical array addressed by `u64` index.
//!
//! Slots live in pages of at most [`PAGE_CAPACITY`] entries, page `n`
//! holding indices `n * PAGE_CAPACITY ..`. Removing a slot leaves a
//! tombstone so later indices never shift.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::txn::{Transactional, Txn, TxnMode};
use crate::types::{QuadError, Result};

/// Maximum number of slots per page.
pub const PAGE_CAPACITY: u64 = i32::MAX as u64;

/// Highest addressable index.
pub const MAX_ITEM_INDEX: u64 = PAGE_CAPACITY * PAGE_CAPACITY - 1;

/// One slot: an index with an optional value. `None` marks a tombstone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdxData<T> {
    index: u64,
    value: Option<T>,
}

impl<T> IdxData<T> {
    /// Live slot at `index`.
    pub fn new(index: u64, value: T) -> Self {
        Self {
            index,
            value: Some(value),
        }
    }

    /// Deleted slot at `index`.
    pub fn tombstone(index: u64) -> Self {
        Self { index, value: None }
    }

    /// Slot position.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Stored value, `None` for a tombstone.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Consumes the slot, returning its value.
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Whether the slot was deleted.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}

type Page<T> = BTreeMap<u64, IdxData<T>>;

#[derive(Default)]
struct Pages<T> {
    pages: BTreeMap<u64, Page<T>>,
    len: u64,
    live: u64,
}

struct Staged<T> {
    writes: BTreeMap<u64, IdxData<T>>,
    len: u64,
}

/// Transactional paged array.
pub struct LongList<T> {
    label: String,
    committed: RwLock<Pages<T>>,
    staged: Mutex<Option<Staged<T>>>,
}

fn check_index(index: u64) -> Result<()> {
    if index > MAX_ITEM_INDEX {
        return Err(QuadError::Range {
            index,
            max: MAX_ITEM_INDEX,
        });
    }
    Ok(())
}

fn page_of(index: u64) -> u64 {
    index / PAGE_CAPACITY
}

impl<T: Clone + Send + Sync> LongList<T> {
    /// Empty list labelled `label` on tracing events.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            committed: RwLock::new(Pages {
                pages: BTreeMap::new(),
                len: 0,
                live: 0,
            }),
            staged: Mutex::new(None),
        }
    }

    fn with_staged<R>(&self, txn: &Txn, f: impl FnOnce(&mut Staged<T>) -> Result<R>) -> Result<R> {
        txn.ensure_write()?;
        let mut slot = self.staged.lock();
        let staged = slot
            .as_mut()
            .ok_or(QuadError::Invalid("long list not enlisted in the write transaction"))?;
        f(staged)
    }

    /// Appends `value` at the end, returning its index.
    pub fn add(&self, txn: &Txn, value: T) -> Result<u64> {
        self.with_staged(txn, |staged| {
            let index = staged.len;
            check_index(index)?;
            staged.writes.insert(index, IdxData::new(index, value));
            staged.len += 1;
            Ok(index)
        })
    }

    /// Stores `value` at `index`, growing the list if needed.
    pub fn set(&self, txn: &Txn, index: u64, value: T) -> Result<()> {
        self.put(txn, IdxData::new(index, value))
    }

    /// Tombstones the slot at `index`.
    pub fn remove(&self, txn: &Txn, index: u64) -> Result<()> {
        self.put(txn, IdxData::tombstone(index))
    }

    fn put(&self, txn: &Txn, data: IdxData<T>) -> Result<()> {
        check_index(data.index)?;
        self.with_staged(txn, |staged| {
            staged.len = staged.len.max(data.index + 1);
            staged.writes.insert(data.index, data);
            Ok(())
        })
    }

    /// Value at `index`; `None` for tombstones and unused slots.
    pub fn get(&self, txn: &Txn, index: u64) -> Result<Option<T>> {
        check_index(index)?;
        if txn.ensure_active()? == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                if let Some(data) = staged.writes.get(&index) {
                    return Ok(data.value.clone());
                }
            }
        }
        let committed = self.committed.read();
        Ok(committed
            .pages
            .get(&page_of(index))
            .and_then(|page| page.get(&index))
            .and_then(|data| data.value.clone()))
    }

    /// Number of slots, tombstones included.
    pub fn len(&self, txn: &Txn) -> Result<u64> {
        if txn.ensure_active()? == TxnMode::Write {
            if let Some(staged) = self.staged.lock().as_ref() {
                return Ok(staged.len);
            }
        }
        Ok(self.committed.read().len)
    }

    /// Number of committed non-tombstone slots.
    pub fn live(&self) -> u64 {
        self.committed.read().live
    }

    /// Number of committed pages.
    pub fn page_count(&self) -> usize {
        self.committed.read().pages.len()
    }
}

impl<T: Clone + Send + Sync> Transactional for LongList<T> {
    fn label(&self) -> &str {
        &self.label
    }

    fn prepare_begin(&self, mode: TxnMode) {
        if mode == TxnMode::Write {
            let len = self.committed.read().len;
            *self.staged.lock() = Some(Staged {
                writes: BTreeMap::new(),
                len,
            });
        }
    }

    fn commit(&self) -> Result<()> {
        let Some(staged) = self.staged.lock().take() else {
            return Ok(());
        };
        let writes = staged.writes.len();
        let mut committed = self.committed.write();
        for (index, data) in staged.writes {
            let live = !data.is_tombstone();
            let page = committed.pages.entry(page_of(index)).or_default();
            let was_live = page
                .insert(index, data)
                .map_or(false, |prev| !prev.is_tombstone());
            match (was_live, live) {
                (false, true) => committed.live += 1,
                (true, false) => committed.live -= 1,
                _ => {}
            }
        }
        committed.len = committed.len.max(staged.len);
        trace!(label = %self.label, writes, len = committed.len, "long_list.commit");
        Ok(())
    }

    fn abort(&self) {
        self.staged.lock().take();
    }
}
