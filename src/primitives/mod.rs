//! Data structures the storage components are built from.

/// Sparse paged bitmap with set algebra.
pub mod bitmap;

/// Reader/writer admission control.
pub mod concurrency;

/// Byte-wise radix trie.
pub mod trie;
