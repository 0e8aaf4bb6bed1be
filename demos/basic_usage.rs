//! Basic usage of the trie and the hash table.
//!
//! Run with `RUST_LOG=trace` to see node allocation and lookups.

use std::num::NonZeroUsize;

use offheap_lookup::ipv4::parse_address;
use offheap_lookup::{ExactHashTable, Ipv4Cidr, LpmTrie};
use tracing_subscriber::EnvFilter;

fn main() -> offheap_lookup::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Longest prefix match ===\n");

    let mut trie = LpmTrie::new();
    for (block, value) in [
        ("0.0.0.0/0", "internet"),
        ("10.0.0.0/8", "private"),
        ("10.10.0.0/16", "campus"),
        ("10.10.10.0/24", "lab"),
        ("10.10.10.10/32", "printer"),
    ] {
        let cidr: Ipv4Cidr = block.parse()?;
        trie.insert(cidr.address, cidr.prefix_len, value.as_bytes())?;
    }

    for ip in ["10.10.10.10", "10.10.10.11", "10.10.200.1", "10.1.1.1", "8.8.8.8"] {
        let (len, value) = trie
            .lookup_with_prefix(parse_address(ip)?)
            .expect("default route matches everything");
        println!("  {:<15} -> /{:<2} {}", ip, len, String::from_utf8_lossy(value));
    }

    let stats = trie.memory_usage();
    println!(
        "\n  {} prefixes, {} nodes, {} node bytes",
        stats.entry_count, stats.node_count, stats.node_bytes
    );
    let released = trie.destroy();
    println!("  released {} nodes, {} blocks", released.nodes, released.blocks);

    println!("\n=== Exact match ===\n");

    let capacity = NonZeroUsize::new(4).expect("non-zero");
    let mut table = ExactHashTable::with_capacity(capacity)?;
    for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        table.insert(key.as_bytes(), format!("value-{i}").as_bytes())?;
    }

    for key in ["a", "c", "e", "z"] {
        match table.lookup(key.as_bytes()) {
            Some(v) => println!("  {:<3} -> {}", key, String::from_utf8_lossy(v)),
            None => println!("  {:<3} -> (none)", key),
        }
    }
    for bucket in 0..table.capacity() {
        println!("  bucket {} holds {} entries", bucket, table.chain_len(bucket));
    }
    table.destroy();

    Ok(())
}
