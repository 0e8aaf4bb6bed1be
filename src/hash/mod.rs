//! Fixed-capacity exact-match hash table over byte-string keys.
//!
//! The bucket count is chosen once at construction and never changes; chains
//! absorb any number of entries. New entries are prepended to their chain, so
//! the most recent insert of a key shadows older ones. Shadowed entries are
//! kept until teardown.

use std::num::NonZeroUsize;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::value::ValueBlock;
use crate::TeardownStats;

/// 4-byte reference into the entry arena.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
struct EntryRef(u32);

impl EntryRef {
    const NULL: Self = EntryRef(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

struct HashEntry {
    key: ValueBlock,
    value: ValueBlock,
    hash: u32,
    next: EntryRef,
}

/// Polynomial hash of `key`: seed 17, then `h = h * 31 + b` for each byte.
///
/// Bytes are read as signed and sign-extended before the add, with 32-bit
/// wrapping arithmetic. For bytes below `0x80` this is the plain unsigned sum.
#[inline]
pub fn hash_key(key: &[u8]) -> u32 {
    key.iter().fold(17u32, |h, &b| {
        h.wrapping_mul(31).wrapping_add(b as i8 as u32)
    })
}

/// Memory statistics for an [`ExactHashTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashMemoryStats {
    /// Bytes used by the bucket array
    pub bucket_bytes: usize,
    /// Bytes reserved for the entry arena
    pub entry_bytes: usize,
    /// Bytes owned by key blocks
    pub key_bytes: usize,
    /// Bytes owned by value blocks
    pub value_bytes: usize,
    /// Number of buckets with at least one entry
    pub occupied_buckets: usize,
    /// Length of the longest chain
    pub longest_chain: usize,
}

/// A chained hash table with a fixed number of buckets.
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use offheap_lookup::ExactHashTable;
///
/// let mut table = ExactHashTable::with_capacity(NonZeroUsize::new(17).unwrap()).unwrap();
/// table.insert(b"monkey", b"hello").unwrap();
///
/// assert_eq!(table.lookup(b"monkey").map(|v| v.as_bytes()), Some(&b"hello"[..]));
/// assert!(table.lookup(b"monkey2").is_none());
/// ```
pub struct ExactHashTable {
    /// Chain heads, one per bucket.
    buckets: Box<[EntryRef]>,
    entries: Vec<HashEntry>,
}

impl ExactHashTable {
    /// Create a table with `capacity` empty buckets.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the bucket array cannot be allocated.
    pub fn with_capacity(capacity: NonZeroUsize) -> Result<Self> {
        let capacity = capacity.get();
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(capacity)
            .map_err(|_| Error::oom("hash table buckets"))?;
        buckets.resize(capacity, EntryRef::NULL);

        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            entries: Vec::new(),
        })
    }

    /// Number of entries, counting shadowed duplicates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of buckets. Fixed for the lifetime of the table.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index for `key`.
    #[inline]
    pub fn bucket_of(&self, key: &[u8]) -> usize {
        self.bucket_for_hash(hash_key(key))
    }

    #[inline]
    fn bucket_for_hash(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    /// Number of entries chained in `bucket`.
    ///
    /// # Panics
    /// Panics if `bucket >= self.capacity()`.
    pub fn chain_len(&self, bucket: usize) -> usize {
        self.chain(self.buckets[bucket]).count()
    }

    fn chain(&self, head: EntryRef) -> impl Iterator<Item = &HashEntry> + '_ {
        let mut cur = head;
        std::iter::from_fn(move || {
            if cur.is_null() {
                return None;
            }
            let entry = &self.entries[cur.index()];
            cur = entry.next;
            Some(entry)
        })
    }

    /// Copy `key` and `value` into the table as the newest entry for `key`.
    ///
    /// No duplicate detection is done: an earlier entry with an equal key
    /// stays in its chain, unreachable by [`ExactHashTable::lookup`].
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if either block or the entry cannot be
    /// allocated. The table is unchanged in that case.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = ValueBlock::copy_from(key)?;
        let value = ValueBlock::copy_from(value)?;
        self.insert_blocks(key, value)
    }

    /// Like [`ExactHashTable::insert`], taking ownership of existing blocks.
    pub fn insert_blocks(&mut self, key: ValueBlock, value: ValueBlock) -> Result<()> {
        if self.entries.len() >= EntryRef::NULL.index() {
            return Err(Error::oom("hash entry"));
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| Error::oom("hash entry"))?;

        let hash = hash_key(&key);
        let bucket = self.bucket_for_hash(hash);
        let entry = EntryRef(self.entries.len() as u32);
        self.entries.push(HashEntry {
            key,
            value,
            hash,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = entry;

        trace!(hash, bucket, entry = entry.0, "hash insert");
        Ok(())
    }

    /// Value of the most recently inserted entry whose key equals `key`.
    pub fn lookup(&self, key: &[u8]) -> Option<&ValueBlock> {
        let hash = hash_key(key);
        let bucket = self.bucket_for_hash(hash);
        self.chain(self.buckets[bucket])
            .find(|e| e.hash == hash && e.key.as_bytes() == key)
            .map(|e| &e.value)
    }

    /// Get memory usage statistics.
    pub fn memory_usage(&self) -> HashMemoryStats {
        let mut stats = HashMemoryStats {
            bucket_bytes: self.buckets.len() * std::mem::size_of::<EntryRef>(),
            entry_bytes: self.entries.capacity() * std::mem::size_of::<HashEntry>(),
            ..HashMemoryStats::default()
        };
        for e in &self.entries {
            stats.key_bytes += e.key.heap_bytes();
            stats.value_bytes += e.value.heap_bytes();
        }
        for &head in self.buckets.iter() {
            if head.is_null() {
                continue;
            }
            stats.occupied_buckets += 1;
            stats.longest_chain = stats.longest_chain.max(self.chain(head).count());
        }
        stats
    }

    /// Release every entry, its key and value blocks, and the bucket array.
    ///
    /// Each chain is walked head to tail; shadowed duplicates are released
    /// along with everything else.
    pub fn destroy(self) -> TeardownStats {
        let ExactHashTable {
            buckets,
            mut entries,
        } = self;
        let mut stats = TeardownStats::default();

        for &head in buckets.iter() {
            let mut cur = head;
            while !cur.is_null() {
                let entry = &mut entries[cur.index()];
                cur = std::mem::replace(&mut entry.next, EntryRef::NULL);
                // Swapping in empty blocks frees the payloads without allocating.
                drop(std::mem::take(&mut entry.value));
                drop(std::mem::take(&mut entry.key));
                stats.blocks += 2;
                stats.nodes += 1;
            }
        }
        debug_assert_eq!(stats.nodes, entries.len(), "unchained hash entry");
        drop(entries);
        drop(buckets);

        debug!(entries = stats.nodes, blocks = stats.blocks, "hash table destroyed");
        stats
    }
}

impl std::fmt::Debug for ExactHashTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactHashTable")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}
