//! Compressed prefix (radix) trie keyed by byte strings.
//!
//! Each edge carries the longest run of bytes shared by every key below it,
//! so lookups cost one node per branching point rather than one per byte.
//! Children are kept in a `BTreeMap` keyed by the first byte of their edge,
//! which makes a pre-order walk visit keys in lexicographic order.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::mem;

struct Node<V> {
    label: Vec<u8>,
    value: Option<V>,
    children: BTreeMap<u8, Node<V>>,
}

impl<V> Node<V> {
    fn root() -> Self {
        Self {
            label: Vec::new(),
            value: None,
            children: BTreeMap::new(),
        }
    }

    fn leaf(label: &[u8], value: V) -> Self {
        Self {
            label: label.to_vec(),
            value: Some(value),
            children: BTreeMap::new(),
        }
    }

    /// Cuts this node's edge after `at` bytes, pushing the tail into a child.
    fn split(&mut self, at: usize) {
        let tail = self.label.split_off(at);
        let first = tail[0];
        let moved = Node {
            label: tail,
            value: self.value.take(),
            children: mem::take(&mut self.children),
        };
        self.children.insert(first, moved);
    }

    /// Folds a value-less node with a single child into that child.
    fn compact(&mut self) {
        if self.value.is_some() || self.children.len() != 1 {
            return;
        }
        if let Some((_, child)) = self.children.pop_first() {
            self.label.extend_from_slice(&child.label);
            self.value = child.value;
            self.children = child.children;
        }
    }
}

/// Ordered map from byte-string keys to values.
pub struct RadixTrie<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for RadixTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RadixTrie<V> {
    /// Empty trie.
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            len: 0,
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the trie holds no key.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: V) -> Option<V> {
        let previous = insert(&mut self.root, key.as_ref(), value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Value stored under `key`.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&V> {
        let mut node = &self.root;
        let mut rest = key.as_ref();
        while let Some(first) = rest.first() {
            let child = node.children.get(first)?;
            rest = rest.strip_prefix(child.label.as_slice())?;
            node = child;
        }
        node.value.as_ref()
    }

    /// Mutable value stored under `key`.
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut V> {
        let mut node = &mut self.root;
        let mut rest = key.as_ref();
        while let Some(first) = rest.first() {
            let child = node.children.get_mut(first)?;
            rest = rest.strip_prefix(child.label.as_slice())?;
            node = child;
        }
        node.value.as_mut()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`, merging edges left with a single child.
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Option<V> {
        let removed = remove(&mut self.root, key.as_ref())?;
        self.len -= 1;
        Some(removed)
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.root = Node::root();
        self.len = 0;
    }

    /// Values in lexicographic key order.
    pub fn values(&self) -> Values<'_, V> {
        Values {
            stack: vec![&self.root],
        }
    }
}

fn insert<V>(node: &mut Node<V>, key: &[u8], value: V) -> Option<V> {
    let Some(&first) = key.first() else {
        return node.value.replace(value);
    };
    let Some(child) = node.children.get_mut(&first) else {
        node.children.insert(first, Node::leaf(key, value));
        return None;
    };
    let common = shared_prefix(&child.label, key);
    if common < child.label.len() {
        child.split(common);
    }
    insert(child, &key[common..], value)
}

fn remove<V>(node: &mut Node<V>, key: &[u8]) -> Option<V> {
    let Some(&first) = key.first() else {
        return node.value.take();
    };
    let child = node.children.get_mut(&first)?;
    let rest = key.strip_prefix(child.label.as_slice())?;
    let removed = remove(child, rest)?;
    if child.value.is_none() && child.children.is_empty() {
        node.children.remove(&first);
    } else {
        child.compact();
    }
    Some(removed)
}

fn shared_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Pre-order walk over stored values.
pub struct Values<'a, V> {
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        while let Some(node) = self.stack.pop() {
            self.stack.extend(node.children.values().rev());
            if let Some(value) = node.value.as_ref() {
                return Some(value);
            }
        }
        None
    }
}
