//! Immutable, length-tagged byte blocks.
//!
//! Every value stored by the trie or the hash table (and every key stored by
//! the hash table) is held in a [`ValueBlock`]. A block is exactly one owning
//! allocation sized to its payload, and it never changes after creation.

use std::fmt;
use std::ops::Deref;

use crate::error::{Error, Result};

/// An immutable byte buffer owning a single allocation.
///
/// The default block is empty and owns no allocation.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ValueBlock {
    bytes: Box<[u8]>,
}

impl ValueBlock {
    /// Copy `bytes` into a newly allocated block.
    ///
    /// The allocation is reserved fallibly, so exhaustion is reported as
    /// [`Error::OutOfMemory`] rather than aborting the process.
    pub fn copy_from(bytes: &[u8]) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes.len())
            .map_err(|_| Error::oom("value block"))?;
        buf.extend_from_slice(bytes);
        Ok(Self {
            bytes: buf.into_boxed_slice(),
        })
    }

    /// The payload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Give up the block, keeping its allocation.
    pub fn into_boxed_bytes(self) -> Box<[u8]> {
        self.bytes
    }

    /// Bytes owned on the heap by this block.
    pub fn heap_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl Deref for ValueBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for ValueBlock {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ValueBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values are usually short ASCII records.
        match std::str::from_utf8(&self.bytes) {
            Ok(s) => write!(f, "ValueBlock({s:?})"),
            Err(_) => write!(f, "ValueBlock({:02x?})", &*self.bytes),
        }
    }
}
