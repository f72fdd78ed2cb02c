//! Sparse paged bitmap over `u64` bit indices.
//!
//! Bits are grouped into 64-bit words keyed by an unsigned 32-bit page
//! [`Key`]. Only non-zero words are stored, so memory tracks the number of
//! populated pages rather than the highest bit. Set algebra walks the page
//! keys of all operands in ascending order (a merge join), which is why
//! [`Key`] ordering is spelled out explicitly.
#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::btree_map::{self, BTreeMap, Entry as Slot};
use std::fmt;
use std::iter::Peekable;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign};

use smallvec::SmallVec;

use crate::types::{QuadError, Result};

/// Bits per page word.
pub const WORD_BITS: u64 = 64;

/// Largest addressable bit: `64 * (2^32 - 1) + 63`.
pub const MAX_INDEX: u64 = WORD_BITS * (u32::MAX as u64) + (WORD_BITS - 1);

/// Page index of a [`Bitmap`], compared as an unsigned quantity.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Key(u32);

impl Key {
    /// Lowest page.
    pub const MIN: Key = Key(0);
    /// Highest page.
    pub const MAX: Key = Key(u32::MAX);

    /// Wraps a raw page number.
    pub const fn new(page: u32) -> Self {
        Key(page)
    }

    /// Page holding `bit`.
    pub fn for_bit(bit: u64) -> Result<Self> {
        check_bit(bit)?;
        Ok(Key((bit / WORD_BITS) as u32))
    }

    /// Raw page number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Index of the first bit stored in this page.
    pub const fn first_bit(self) -> u64 {
        self.0 as u64 * WORD_BITS
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        // u32 comparison: page 0x8000_0000 sorts after 0x7fff_ffff.
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

/// Binary word operation applied when combining pages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Logical {
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
}

impl Logical {
    /// Combines two words.
    pub fn apply(self, left: u64, right: u64) -> u64 {
        match self {
            Logical::And => left & right,
            Logical::Or => left | right,
            Logical::Xor => left ^ right,
        }
    }
}

/// One page of a bitmap: bits `key * 64 .. key * 64 + 63`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    key: Key,
    word: u64,
}

impl Entry {
    /// Page `key` holding `word`.
    pub fn new(key: Key, word: u64) -> Self {
        Self { key, word }
    }

    /// Page number.
    pub fn key(&self) -> Key {
        self.key
    }

    /// Bits of the page.
    pub fn word(&self) -> u64 {
        self.word
    }

    /// Whether the page has no bit set.
    pub fn is_empty(&self) -> bool {
        self.word == 0
    }

    /// Replaces the word with `op(word, operand)`.
    pub fn mutate(&mut self, op: Logical, operand: u64) {
        self.word = op.apply(self.word, operand);
    }

    /// Whether the absolute `bit` is set in this page.
    pub fn contains(&self, bit: u64) -> bool {
        bit / WORD_BITS == self.key.0 as u64 && self.word & mask(bit) != 0
    }
}

/// Sparse set of bit indices in `[0, MAX_INDEX]`.
///
/// Invariant: no stored page word is zero.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    pages: BTreeMap<Key, u64>,
}

impl Bitmap {
    /// Largest addressable bit.
    pub const MAX_INDEX: u64 = MAX_INDEX;

    /// Empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bitmap holding every bit of `bits`.
    pub fn from_bits<I>(bits: I) -> Result<Self>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut map = Self::new();
        for bit in bits {
            map.set(bit)?;
        }
        Ok(map)
    }

    /// Sets `bit`. Fails with a range error above [`MAX_INDEX`].
    pub fn set(&mut self, bit: u64) -> Result<()> {
        let key = Key::for_bit(bit)?;
        *self.pages.entry(key).or_insert(0) |= mask(bit);
        Ok(())
    }

    /// Clears `bit`, dropping the page once it empties.
    pub fn clear(&mut self, bit: u64) -> Result<()> {
        let key = Key::for_bit(bit)?;
        if let Slot::Occupied(mut slot) = self.pages.entry(key) {
            let word = *slot.get() & !mask(bit);
            if word == 0 {
                slot.remove();
            } else {
                *slot.get_mut() = word;
            }
        }
        Ok(())
    }

    /// Whether `bit` is set. Out-of-range bits are never set.
    pub fn contains(&self, bit: u64) -> bool {
        if bit > MAX_INDEX {
            return false;
        }
        let key = Key((bit / WORD_BITS) as u32);
        self.pages
            .get(&key)
            .map_or(false, |word| word & mask(bit) != 0)
    }

    /// Smallest set bit.
    pub fn lowest(&self) -> Option<u64> {
        let (key, word) = self.pages.first_key_value()?;
        Some(key.first_bit() + word.trailing_zeros() as u64)
    }

    /// Largest set bit.
    pub fn highest(&self) -> Option<u64> {
        let (key, word) = self.pages.last_key_value()?;
        Some(key.first_bit() + (WORD_BITS - 1 - word.leading_zeros() as u64))
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of set bits.
    pub fn len(&self) -> u64 {
        self.pages.values().map(|word| word.count_ones() as u64).sum()
    }

    /// Number of stored (non-empty) pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Clears every bit.
    pub fn clear_all(&mut self) {
        self.pages.clear();
    }

    /// Stored pages in ascending key order.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.pages.iter().map(|(key, word)| Entry::new(*key, *word))
    }

    /// Ascending iterator over set bits. Each call starts a fresh pass.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            pages: self.pages.iter(),
            base: 0,
            word: 0,
        }
    }

    /// Combines `operand` into the page it addresses.
    pub fn apply(&mut self, operand: Entry, op: Logical) {
        match self.pages.entry(operand.key) {
            Slot::Occupied(mut slot) => {
                let word = op.apply(*slot.get(), operand.word);
                if word == 0 {
                    slot.remove();
                } else {
                    *slot.get_mut() = word;
                }
            }
            Slot::Vacant(slot) => {
                let word = op.apply(0, operand.word);
                if word != 0 {
                    slot.insert(word);
                }
            }
        }
    }

    /// Page-wise OR of every input.
    pub fn union(maps: &[&Bitmap]) -> Bitmap {
        merge(maps, Logical::Or)
    }

    /// Page-wise AND of every input. No inputs yield the empty bitmap, and a
    /// page missing from any input is absent from the result.
    pub fn intersection(maps: &[&Bitmap]) -> Bitmap {
        merge(maps, Logical::And)
    }

    /// Like [`Bitmap::intersection`], but an absent input empties the result.
    pub fn intersection_of(maps: &[Option<&Bitmap>]) -> Bitmap {
        let mut present: SmallVec<[&Bitmap; 4]> = SmallVec::with_capacity(maps.len());
        for map in maps {
            match map {
                Some(map) => present.push(map),
                None => return Bitmap::new(),
            }
        }
        merge(&present, Logical::And)
    }

    /// Symmetric difference of two bitmaps.
    pub fn xor(left: &Bitmap, right: &Bitmap) -> Bitmap {
        merge(&[left, right], Logical::Xor)
    }

    /// In-place symmetric difference.
    pub fn xor_with(&mut self, other: &Bitmap) {
        for (key, word) in &other.pages {
            self.apply(Entry::new(*key, *word), Logical::Xor);
        }
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Bitmap) {
        for (key, word) in &other.pages {
            *self.pages.entry(*key).or_insert(0) |= *word;
        }
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &Bitmap) {
        self.pages.retain(|key, word| match other.pages.get(key) {
            Some(theirs) => {
                *word &= *theirs;
                *word != 0
            }
            None => false,
        });
    }
}

fn check_bit(bit: u64) -> Result<()> {
    if bit > MAX_INDEX {
        return Err(QuadError::Range {
            index: bit,
            max: MAX_INDEX,
        });
    }
    Ok(())
}

fn mask(bit: u64) -> u64 {
    1u64 << (bit % WORD_BITS)
}

type Cursor<'a> = Peekable<btree_map::Iter<'a, Key, u64>>;

fn merge(maps: &[&Bitmap], op: Logical) -> Bitmap {
    if maps.is_empty() {
        return Bitmap::new();
    }
    let mut cursors: SmallVec<[Cursor<'_>; 4]> =
        maps.iter().map(|map| map.pages.iter().peekable()).collect();
    let mut out: Vec<(Key, u64)> = Vec::new();
    loop {
        let mut low: Option<Key> = None;
        let mut exhausted = false;
        for cursor in cursors.iter_mut() {
            match cursor.peek() {
                Some(&(key, _)) => low = Some(low.map_or(*key, |cur| cur.min(*key))),
                None => exhausted = true,
            }
        }
        let Some(low) = low else { break };
        if exhausted && op == Logical::And {
            break;
        }
        let mut word: Option<u64> = None;
        let mut hits = 0usize;
        for cursor in cursors.iter_mut() {
            if let Some((_, theirs)) = cursor.next_if(|&(key, _)| *key == low) {
                word = Some(word.map_or(*theirs, |acc| op.apply(acc, *theirs)));
                hits += 1;
            }
        }
        if op == Logical::And && hits < cursors.len() {
            continue;
        }
        if let Some(word) = word.filter(|word| *word != 0) {
            out.push((low, word));
        }
    }
    Bitmap {
        pages: out.into_iter().collect(),
    }
}

/// Borrowing iterator over set bits, ascending.
pub struct Iter<'a> {
    pages: btree_map::Iter<'a, Key, u64>,
    base: u64,
    word: u64,
}

impl Iterator for Iter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.word == 0 {
            let (key, word) = self.pages.next()?;
            self.base = key.first_bit();
            self.word = *word;
        }
        let offset = self.word.trailing_zeros() as u64;
        self.word &= self.word - 1;
        Some(self.base + offset)
    }
}

/// Owning iterator over set bits, ascending.
pub struct IntoIter {
    pages: btree_map::IntoIter<Key, u64>,
    base: u64,
    word: u64,
}

impl IntoIter {
    /// An iterator that yields nothing.
    pub fn empty() -> Self {
        Bitmap::new().into_iter()
    }
}

impl Iterator for IntoIter {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.word == 0 {
            let (key, word) = self.pages.next()?;
            self.base = key.first_bit();
            self.word = word;
        }
        let offset = self.word.trailing_zeros() as u64;
        self.word &= self.word - 1;
        Some(self.base + offset)
    }
}

impl IntoIterator for Bitmap {
    type Item = u64;
    type IntoIter = IntoIter;

    fn into_iter(self) -> IntoIter {
        IntoIter {
            pages: self.pages.into_iter(),
            base: 0,
            word: 0,
        }
    }
}

impl<'a> IntoIterator for &'a Bitmap {
    type Item = u64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl BitOr for &Bitmap {
    type Output = Bitmap;

    fn bitor(self, rhs: &Bitmap) -> Bitmap {
        Bitmap::union(&[self, rhs])
    }
}

impl BitAnd for &Bitmap {
    type Output = Bitmap;

    fn bitand(self, rhs: &Bitmap) -> Bitmap {
        Bitmap::intersection(&[self, rhs])
    }
}

impl BitXor for &Bitmap {
    type Output = Bitmap;

    fn bitxor(self, rhs: &Bitmap) -> Bitmap {
        Bitmap::xor(self, rhs)
    }
}

impl BitOrAssign<&Bitmap> for Bitmap {
    fn bitor_assign(&mut self, rhs: &Bitmap) {
        self.union_with(rhs);
    }
}

impl BitAndAssign<&Bitmap> for Bitmap {
    fn bitand_assign(&mut self, rhs: &Bitmap) {
        self.intersect_with(rhs);
    }
}

impl BitXorAssign<&Bitmap> for Bitmap {
    fn bitxor_assign(&mut self, rhs: &Bitmap) {
        self.xor_with(rhs);
    }
}
