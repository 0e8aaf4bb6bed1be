//! Bulk loaded lookups with load-then-swap replacement.
//!
//! A fresh structure is built from a record source without holding any lock.
//! Only the swap itself takes the write lock, so readers keep hitting the
//! previous structure for the whole load. The replaced structure is torn down
//! after the lock is released.
//!
//! ```rust
//! use offheap_lookup::bulk::BulkLoadedPrefixMatch;
//! use offheap_lookup::ipv4::parse_address;
//! use offheap_lookup::reader::CidrCsvRecordReader;
//!
//! let lookup = BulkLoadedPrefixMatch::new();
//! let text = "10.10.0.0/16,campus\n10.10.10.0/24,lab\n";
//! lookup.load_then_swap(CidrCsvRecordReader::new(text.as_bytes())).unwrap();
//!
//! let addr = parse_address("10.10.10.7").unwrap();
//! assert_eq!(lookup.lookup(addr).as_deref(), Some(&b"lab"[..]));
//! ```

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::config::LoadConfig;
use crate::error::Result;
use crate::hash::ExactHashTable;
use crate::ipv4::Ipv4Cidr;
use crate::reader::{CidrCsvRecordReader, CsvRecordReader, RecordReader};
use crate::trie::LpmTrie;
use crate::TeardownStats;

/// A structure that can be released explicitly.
pub trait Teardown {
    /// Release every node and block owned by the structure.
    fn teardown(self) -> TeardownStats;
}

impl Teardown for LpmTrie {
    fn teardown(self) -> TeardownStats {
        self.destroy()
    }
}

impl Teardown for ExactHashTable {
    fn teardown(self) -> TeardownStats {
        self.destroy()
    }
}

struct Slot<T> {
    current: RwLock<Option<T>>,
}

impl<T: Teardown> Slot<T> {
    fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    fn replace(&self, next: Option<T>) -> Option<TeardownStats> {
        let old = std::mem::replace(&mut *self.current.write(), next);
        old.map(Teardown::teardown)
    }

    fn read<R>(&self, f: impl FnOnce(&T) -> Option<R>) -> Option<R> {
        self.current.read().as_ref().and_then(f)
    }

    fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}

/// Drain `reader` into `target`, tearing the target down on the first error.
fn build<T, R, F>(mut target: T, mut reader: R, mut insert: F) -> Result<(T, usize)>
where
    T: Teardown,
    R: RecordReader,
    F: FnMut(&mut T, R::Key, Vec<u8>) -> Result<()>,
{
    let mut records = 0usize;
    while let Some(record) = reader.next_record() {
        let result = record.and_then(|(key, value)| insert(&mut target, key, value));
        if let Err(e) = result {
            warn!(records, error = %e, "bulk load abandoned");
            target.teardown();
            return Err(e);
        }
        records += 1;
    }
    Ok((target, records))
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: the mapping is only read while building a fresh structure, and
    // every byte is copied out before the map is dropped.
    let map = unsafe { Mmap::map(&file)? };
    Ok(map)
}

/// Longest-prefix-match lookup over IPv4 CIDR blocks, replaced wholesale by
/// each load.
pub struct BulkLoadedPrefixMatch {
    slot: Slot<LpmTrie>,
}

impl BulkLoadedPrefixMatch {
    /// Create a lookup with nothing loaded.
    pub fn new() -> Self {
        Self { slot: Slot::new() }
    }

    /// Value for the longest loaded prefix of `address`, copied out.
    ///
    /// Returns `None` while nothing is loaded.
    pub fn lookup(&self, address: u32) -> Option<Vec<u8>> {
        self.slot.read(|trie| trie.lookup(address).map(|v| v.to_vec()))
    }

    /// Build a new trie from `reader` and swap it in.
    ///
    /// Returns the number of records loaded. On error the current trie is
    /// left in place.
    pub fn load_then_swap<R>(&self, reader: R) -> Result<usize>
    where
        R: RecordReader<Key = Ipv4Cidr>,
    {
        let (trie, records) = build(LpmTrie::new(), reader, |trie, cidr, value| {
            trie.insert(cidr.address, cidr.prefix_len, &value)
        })?;
        let nodes = trie.node_count();
        let replaced = self.slot.replace(Some(trie));
        info!(records, nodes, replaced = replaced.is_some(), "prefix match table swapped in");
        Ok(records)
    }

    /// Load `cidr,value` lines from a file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let map = map_file(path.as_ref())?;
        self.load_then_swap(CidrCsvRecordReader::new(&map[..]))
    }

    /// Check if a trie is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.slot.is_loaded()
    }

    /// Unload and destroy the current trie, if any.
    pub fn tear_down(&self) -> Option<TeardownStats> {
        self.slot.replace(None)
    }
}

impl Default for BulkLoadedPrefixMatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact-match key/value lookup, replaced wholesale by each load.
pub struct BulkLoadedKeyValue {
    slot: Slot<ExactHashTable>,
    config: LoadConfig,
}

impl BulkLoadedKeyValue {
    /// Create a lookup with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LoadConfig::default())
    }

    /// Create a lookup with the given configuration.
    pub fn with_config(config: LoadConfig) -> Self {
        Self {
            slot: Slot::new(),
            config,
        }
    }

    /// Value for `key`, copied out.
    ///
    /// Returns `None` while nothing is loaded.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.slot.read(|table| table.lookup(key).map(|v| v.to_vec()))
    }

    /// Build a new table from `reader` and swap it in.
    ///
    /// The table gets [`LoadConfig::hash_capacity`] buckets. Returns the
    /// number of records loaded. On error the current table is left in place.
    pub fn load_then_swap<R>(&self, reader: R) -> Result<usize>
    where
        R: RecordReader<Key = Vec<u8>>,
    {
        let table = ExactHashTable::with_capacity(self.config.hash_capacity)?;
        let (table, records) = build(table, reader, |table, key, value| {
            table.insert(&key, &value)
        })?;
        let replaced = self.slot.replace(Some(table));
        info!(records, replaced = replaced.is_some(), "key/value table swapped in");
        Ok(records)
    }

    /// Load `key,value` lines from a file.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let map = map_file(path.as_ref())?;
        self.load_then_swap(CsvRecordReader::new(&map[..]))
    }

    /// Check if a table is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.slot.is_loaded()
    }

    /// Unload and destroy the current table, if any.
    pub fn tear_down(&self) -> Option<TeardownStats> {
        self.slot.replace(None)
    }
}

impl Default for BulkLoadedKeyValue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use super::*;
    use crate::error::Error;
    use crate::ipv4::parse_address;

    const CIDR_TABLE: &str = "10.10.10.0/24,111111111\n\
                              10.10.10.10/32,222222222\n\
                              10.10.0.0/16,333333333\n\
                              127.0.0.0/8,444444444\n\
                              255.6.7.0/26,555555555";

    const KV_TABLE: &str = "AAAAAAAA,111111111\n\
                            BBBBBBBB,222222222\n\
                            CCCCCCCC,333333333\n\
                            DDDDDDDD,444444444\n\
                            EEEEEEEE,555555555";

    fn lookup(x: &BulkLoadedPrefixMatch, ip: &str) -> Option<Vec<u8>> {
        x.lookup(parse_address(ip).unwrap())
    }

    fn small_kv() -> BulkLoadedKeyValue {
        BulkLoadedKeyValue::with_config(
            LoadConfig::default().with_hash_capacity(NonZeroUsize::new(31).unwrap()),
        )
    }

    #[test]
    fn test_prefix_match_load() {
        let x = BulkLoadedPrefixMatch::new();
        assert!(!x.is_loaded());
        assert_eq!(lookup(&x, "10.10.10.1"), None);

        let records = x.load_then_swap(CidrCsvRecordReader::new(CIDR_TABLE.as_bytes())).unwrap();
        assert_eq!(records, 5);

        assert_eq!(lookup(&x, "10.10.10.1").unwrap(), b"111111111");
        assert_eq!(lookup(&x, "10.10.10.10").unwrap(), b"222222222");
        assert_eq!(lookup(&x, "10.10.255.1").unwrap(), b"333333333");
        assert_eq!(lookup(&x, "127.255.0.127").unwrap(), b"444444444");
        assert_eq!(lookup(&x, "255.6.7.63").unwrap(), b"555555555");
        assert_eq!(lookup(&x, "255.6.7.64"), None);

        let stats = x.tear_down().unwrap();
        assert_eq!(stats.blocks, 5);
        assert!(!x.is_loaded());
        assert_eq!(lookup(&x, "10.10.10.1"), None);
        assert!(x.tear_down().is_none());
    }

    #[test]
    fn test_key_value_load() {
        let x = small_kv();
        let records = x.load_then_swap(CsvRecordReader::new(KV_TABLE.as_bytes())).unwrap();
        assert_eq!(records, 5);

        assert_eq!(x.get(b"AAAAAAAA").unwrap(), b"111111111");
        assert_eq!(x.get(b"BBBBBBBB").unwrap(), b"222222222");
        assert_eq!(x.get(b"CCCCCCCC").unwrap(), b"333333333");
        assert_eq!(x.get(b"DDDDDDDD").unwrap(), b"444444444");
        assert_eq!(x.get(b"EEEEEEEE").unwrap(), b"555555555");
        assert_eq!(x.get(b"FFFFFFFF"), None);

        x.tear_down();
        assert_eq!(x.get(b"AAAAAAAA"), None);
    }

    #[test]
    fn test_default_capacity() {
        let x = BulkLoadedKeyValue::new();
        x.load_then_swap(CsvRecordReader::new(&b"k,v\n"[..])).unwrap();
        assert_eq!(x.get(b"k").unwrap(), b"v");
    }

    #[test]
    fn test_reload_replaces_contents() {
        let x = small_kv();
        x.load_then_swap(CsvRecordReader::new(&b"old,1\nshared,1\n"[..])).unwrap();
        x.load_then_swap(CsvRecordReader::new(&b"new,2\nshared,2\n"[..])).unwrap();

        assert_eq!(x.get(b"old"), None);
        assert_eq!(x.get(b"new").unwrap(), b"2");
        assert_eq!(x.get(b"shared").unwrap(), b"2");
    }

    #[test]
    fn test_failed_load_keeps_current() {
        let x = BulkLoadedPrefixMatch::new();
        x.load_then_swap(CidrCsvRecordReader::new(&b"10.0.0.0/8,ten\n"[..])).unwrap();

        let err = x
            .load_then_swap(CidrCsvRecordReader::new(&b"11.0.0.0/8,eleven\n12.0.0.0/99,bad\n"[..]))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { line: 2, .. }));

        assert_eq!(lookup(&x, "10.1.1.1").unwrap(), b"ten");
        assert_eq!(lookup(&x, "11.1.1.1"), None);
    }

    #[test]
    fn test_load_files() {
        let mut cidr = tempfile::NamedTempFile::new().unwrap();
        cidr.write_all(CIDR_TABLE.as_bytes()).unwrap();
        cidr.flush().unwrap();

        let prefix = BulkLoadedPrefixMatch::new();
        assert_eq!(prefix.load_file(cidr.path()).unwrap(), 5);
        assert_eq!(lookup(&prefix, "127.0.0.1").unwrap(), b"444444444");

        let mut kv = tempfile::NamedTempFile::new().unwrap();
        kv.write_all(KV_TABLE.as_bytes()).unwrap();
        kv.flush().unwrap();

        let table = small_kv();
        assert_eq!(table.load_file(kv.path()).unwrap(), 5);
        assert_eq!(table.get(b"CCCCCCCC").unwrap(), b"333333333");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BulkLoadedKeyValue::new()
            .load_file(dir.path().join("absent.csv"))
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_readers_during_reload() {
        let x = Arc::new(small_kv());
        x.load_then_swap(CsvRecordReader::new(&b"key,0\n"[..])).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let x = Arc::clone(&x);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let v = x.get(b"key").expect("key is always loaded");
                        assert!(v == b"0" || v == b"1");
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            x.load_then_swap(CsvRecordReader::new(&b"key,1\n"[..])).unwrap();
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(x.get(b"key").unwrap(), b"1");
    }
}
