use super::*;

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;

use crate::ipv4::Ipv4Cidr;

#[derive(Clone, Debug)]
enum TrieOp {
    Insert(u32, u8, u16),
    Lookup(u32),
}

#[derive(Clone, Debug)]
enum HashOp {
    Insert(Vec<u8>, u16),
    Lookup(Vec<u8>),
}

/// Addresses clustered in a few /6 blocks so prefixes overlap often.
fn address_strategy() -> impl Strategy<Value = u32> + Clone {
    prop_oneof![
        3 => ((0u32..4), any::<u32>()).prop_map(|(hi, lo)| (hi << 26) | (lo >> 6)),
        1 => any::<u32>(),
    ]
}

fn trie_ops_strategy() -> impl Strategy<Value = Vec<TrieOp>> {
    let addr = address_strategy();
    let op = prop_oneof![
        50 => (addr.clone(), 0u8..=32, any::<u16>()).prop_map(|(a, l, v)| TrieOp::Insert(a, l, v)),
        50 => addr.prop_map(TrieOp::Lookup),
    ];
    prop::collection::vec(op, 0..=500)
}

fn hash_ops_strategy() -> impl Strategy<Value = Vec<HashOp>> {
    // Small alphabet and short keys: plenty of duplicates and collisions.
    let key = prop::collection::vec(prop_oneof![Just(b'a'), Just(b'B'), Just(0xffu8)], 0..=4);
    let op = prop_oneof![
        50 => (key.clone(), any::<u16>()).prop_map(|(k, v)| HashOp::Insert(k, v)),
        50 => key.prop_map(HashOp::Lookup),
    ];
    prop::collection::vec(op, 0..=500)
}

/// Linear-scan longest-prefix match over every registered block.
fn model_lookup(model: &BTreeMap<(u32, u8), u16>, address: u32) -> Option<u16> {
    model
        .iter()
        .filter(|((network, len), _)| {
            Ipv4Cidr {
                address: *network,
                prefix_len: *len,
            }
            .contains(address)
        })
        .max_by_key(|((_, len), _)| *len)
        .map(|(_, v)| *v)
}

fn decode(block: Option<&ValueBlock>) -> Option<u16> {
    block.map(|v| u16::from_le_bytes([v[0], v[1]]))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_trie_matches_linear_scan(ops in trie_ops_strategy()) {
        let mut trie = LpmTrie::new();
        let mut model: BTreeMap<(u32, u8), u16> = BTreeMap::new();
        let mut total_bits = 0usize;

        for op in ops {
            match op {
                TrieOp::Insert(addr, len, v) => {
                    trie.insert(addr, len, &v.to_le_bytes()).unwrap();
                    let network = Ipv4Cidr { address: addr, prefix_len: len }.network();
                    model.insert((network, len), v);
                    total_bits += len as usize;
                }
                TrieOp::Lookup(addr) => {
                    prop_assert_eq!(decode(trie.lookup(addr)), model_lookup(&model, addr));
                }
            }
            prop_assert_eq!(trie.len(), model.len());
        }

        // Every registered block is its own longest match at its network address.
        for (&(network, len), &v) in &model {
            let (matched_len, value) = trie.lookup_with_prefix(network).unwrap();
            prop_assert!(matched_len >= len);
            if matched_len == len {
                prop_assert_eq!(decode(Some(value)), Some(v));
            }
        }

        prop_assert!(trie.node_count() <= 1 + total_bits);
        let entries = trie.len();
        let stats = trie.destroy();
        prop_assert_eq!(stats.blocks, entries);
    }

    #[test]
    fn prop_hash_matches_hashmap(capacity in 1usize..=8, ops in hash_ops_strategy()) {
        let mut table = ExactHashTable::with_capacity(NonZeroUsize::new(capacity).unwrap()).unwrap();
        let mut model: HashMap<Vec<u8>, u16> = HashMap::new();
        let mut inserts = 0usize;

        for op in ops {
            match op {
                HashOp::Insert(k, v) => {
                    table.insert(&k, &v.to_le_bytes()).unwrap();
                    model.insert(k, v);
                    inserts += 1;
                }
                HashOp::Lookup(k) => {
                    prop_assert_eq!(decode(table.lookup(&k)), model.get(&k).copied());
                }
            }
        }

        prop_assert_eq!(table.capacity(), capacity);
        prop_assert_eq!(table.len(), inserts);
        let chained: usize = (0..capacity).map(|b| table.chain_len(b)).sum();
        prop_assert_eq!(chained, inserts);
        for (k, v) in &model {
            prop_assert_eq!(decode(table.lookup(k)), Some(*v));
        }

        let stats = table.destroy();
        prop_assert_eq!(stats.nodes, inserts);
        prop_assert_eq!(stats.blocks, 2 * inserts);
    }
}

#[test]
fn exhaustive_prefix_lengths_for_one_address() {
    let address = 0xc0a8_0101;
    for len in 0..=32u8 {
        let mut trie = LpmTrie::new();
        trie.insert(address, len, &[len]).unwrap();
        assert_eq!(trie.lookup(address).map(|v| v[0]), Some(len));
        assert_eq!(trie.node_count(), 1 + len as usize);

        // Flipping the bit right after the prefix stays inside the block;
        // flipping the last prefix bit leaves it.
        if len < 32 {
            let inside = address ^ (1 << (31 - len));
            assert_eq!(trie.lookup(inside).map(|v| v[0]), Some(len));
        }
        if len > 0 {
            let outside = address ^ (1 << (32 - len));
            assert_eq!(trie.lookup(outside), None);
        }
    }
}
