//! # offheap-lookup
//!
//! Two lookup structures that own all of their storage explicitly:
//!
//! - [`LpmTrie`]: a binary trie answering longest-prefix-match queries over
//!   32-bit keys, e.g. IPv4 addresses registered with CIDR masks.
//! - [`ExactHashTable`]: a fixed-capacity chained hash table answering
//!   exact-match queries over arbitrary byte-string keys.
//!
//! Both copy every key and value into an immutable [`ValueBlock`], one
//! allocation per stored value, and release everything in a single explicit
//! teardown (`destroy`) or on drop.
//!
//! ## Layers
//!
//! - [`trie`], [`hash`], [`value`]: the structures. They trust their callers
//!   and only fail on allocation.
//! - [`ipv4`], [`reader`]: parsing and validation of untrusted input.
//! - [`bulk`]: load-then-swap wrappers that rebuild a structure from a record
//!   source while readers keep using the previous one.
//! - [`ffi`]: a C ABI over opaque integer handles.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use offheap_lookup::{ExactHashTable, LpmTrie};
//!
//! let mut routes = LpmTrie::new();
//! routes.insert(0, 0, b"default").unwrap();
//! routes.insert(0x7f00_0000, 8, b"loopback").unwrap();
//! assert_eq!(routes.lookup(0x7f00_0001).unwrap().as_bytes(), b"loopback");
//!
//! let mut names = ExactHashTable::with_capacity(NonZeroUsize::new(64).unwrap()).unwrap();
//! names.insert(b"localhost", b"127.0.0.1").unwrap();
//! assert_eq!(names.lookup(b"localhost").unwrap().as_bytes(), b"127.0.0.1");
//! ```
//!
//! ## Concurrency
//!
//! The structures have no internal synchronization. Mutation takes `&mut`,
//! so the borrow checker serializes it; shared `&` lookups may run in
//! parallel. [`bulk`] adds a read/write lock for whole-structure replacement.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod config;
pub mod error;
pub mod ffi;
pub mod hash;
pub mod ipv4;
pub mod reader;
pub mod trie;
pub mod value;

pub use config::LoadConfig;
pub use error::{Error, Result};
pub use hash::{hash_key, ExactHashTable};
pub use ipv4::Ipv4Cidr;
pub use trie::LpmTrie;
pub use value::ValueBlock;

/// What an explicit teardown released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownStats {
    /// Trie nodes or hash entries released
    pub nodes: usize,
    /// Value blocks released, including hash keys
    pub blocks: usize,
}

#[cfg(test)]
mod alloc_count;
#[cfg(test)]
mod proptests;
