//! Longest-prefix-match binary trie over 32-bit keys.
//!
//! One trie level per key bit, most significant bit first. A node at depth
//! `d` that holds a value registers the `d`-bit prefix spelled by the path
//! from the root, so the root itself carries the zero-length default entry.
//!
//! Nodes live in a single arena and refer to their children by 32-bit index,
//! in the same way the arena-backed tries elsewhere in this workspace do.
//! Nothing is ever unlinked before teardown, so indices stay valid for the
//! lifetime of the trie.

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::value::ValueBlock;
use crate::TeardownStats;

/// Number of bits in a key, and the deepest possible prefix.
pub const KEY_BITS: u8 = 32;

/// 4-byte child reference into the node arena.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
struct NodeRef(u32);

impl NodeRef {
    const NULL: Self = NodeRef(u32::MAX);
    const ROOT: Self = NodeRef(0);

    #[inline]
    fn is_null(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

struct TrieNode {
    /// `[bit 0, bit 1]`
    children: [NodeRef; 2],
    value: Option<ValueBlock>,
}

impl TrieNode {
    const fn empty() -> Self {
        Self {
            children: [NodeRef::NULL, NodeRef::NULL],
            value: None,
        }
    }
}

/// Bit of `address` consumed at `depth`, where depth 0 is the MSB.
#[inline]
fn bit_at(address: u32, depth: u8) -> usize {
    debug_assert!(depth < KEY_BITS);
    ((address >> (31 - depth)) & 1) as usize
}

/// Memory statistics for an [`LpmTrie`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieMemoryStats {
    /// Bytes reserved for the node arena
    pub node_bytes: usize,
    /// Bytes owned by value blocks
    pub value_bytes: usize,
    /// Number of allocated nodes
    pub node_count: usize,
    /// Number of registered prefixes
    pub entry_count: usize,
}

/// A binary trie answering longest-prefix-match queries over `u32` keys.
///
/// ```rust
/// use offheap_lookup::LpmTrie;
///
/// let mut trie = LpmTrie::new();
/// trie.insert(0, 0, b"default").unwrap();
/// trie.insert(u32::from_be_bytes([10, 10, 10, 0]), 24, b"office").unwrap();
///
/// let hit = trie.lookup(u32::from_be_bytes([10, 10, 10, 77])).unwrap();
/// assert_eq!(hit.as_bytes(), b"office");
/// let miss = trie.lookup(u32::from_be_bytes([8, 8, 8, 8])).unwrap();
/// assert_eq!(miss.as_bytes(), b"default");
/// ```
pub struct LpmTrie {
    /// Node arena; index 0 is the root once anything has been inserted.
    nodes: Vec<TrieNode>,
    entries: usize,
    #[cfg(test)]
    node_limit: usize,
}

impl LpmTrie {
    /// Create an empty trie. No nodes are allocated until the first insert.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            entries: 0,
            #[cfg(test)]
            node_limit: NodeRef::NULL.index(),
        }
    }

    /// Number of registered prefixes.
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Check if no prefix has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of allocated nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Register `value` for the top `prefix_len` bits of `address`.
    ///
    /// The value is copied into a new block before the trie is touched.
    /// Inserting the same prefix again replaces (and frees) the old value.
    ///
    /// # Panics
    /// Panics if `prefix_len > 32`. Callers handling untrusted input should
    /// validate first, e.g. through [`crate::ipv4::Ipv4Cidr`].
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] if the value block or any path node
    /// cannot be allocated. Path nodes created before the failure stay in
    /// place with no value; every earlier entry remains reachable.
    pub fn insert(&mut self, address: u32, prefix_len: u8, value: &[u8]) -> Result<()> {
        assert!(
            prefix_len <= KEY_BITS,
            "prefix length {prefix_len} exceeds {KEY_BITS}"
        );
        let block = ValueBlock::copy_from(value)?;
        self.insert_block(address, prefix_len, block)
    }

    /// Like [`LpmTrie::insert`], taking ownership of an existing block.
    pub fn insert_block(&mut self, address: u32, prefix_len: u8, block: ValueBlock) -> Result<()> {
        assert!(
            prefix_len <= KEY_BITS,
            "prefix length {prefix_len} exceeds {KEY_BITS}"
        );

        let mut node = if self.nodes.is_empty() {
            self.alloc_node()?
        } else {
            NodeRef::ROOT
        };

        for depth in 0..prefix_len {
            let bit = bit_at(address, depth);
            let child = self.nodes[node.index()].children[bit];
            node = if child.is_null() {
                let fresh = self.alloc_node()?;
                self.nodes[node.index()].children[bit] = fresh;
                trace!(depth, bit, node = fresh.0, "allocated trie node");
                fresh
            } else {
                child
            };
        }

        match self.nodes[node.index()].value.replace(block) {
            Some(old) => debug!(address, prefix_len, old_len = old.len(), "replaced trie value"),
            None => self.entries += 1,
        }
        Ok(())
    }

    #[cfg(not(test))]
    #[inline]
    fn node_limit(&self) -> usize {
        NodeRef::NULL.index()
    }

    #[cfg(test)]
    fn node_limit(&self) -> usize {
        self.node_limit
    }

    fn alloc_node(&mut self) -> Result<NodeRef> {
        if self.nodes.len() >= self.node_limit() {
            return Err(Error::oom("trie node"));
        }
        self.nodes
            .try_reserve(1)
            .map_err(|_| Error::oom("trie node"))?;
        let node = NodeRef(self.nodes.len() as u32);
        self.nodes.push(TrieNode::empty());
        Ok(node)
    }

    /// Value registered for the longest prefix of `address`, if any.
    #[inline]
    pub fn lookup(&self, address: u32) -> Option<&ValueBlock> {
        self.lookup_with_prefix(address).map(|(_, value)| value)
    }

    /// Like [`LpmTrie::lookup`], also returning the matched prefix length.
    pub fn lookup_with_prefix(&self, address: u32) -> Option<(u8, &ValueBlock)> {
        if self.nodes.is_empty() {
            return None;
        }

        // Depth only increases, so a later match is always more specific.
        let mut best = None;
        let mut node = NodeRef::ROOT;
        let mut depth = 0u8;
        loop {
            let n = &self.nodes[node.index()];
            if let Some(value) = &n.value {
                best = Some((depth, value));
            }
            if depth == KEY_BITS {
                break;
            }
            let next = n.children[bit_at(address, depth)];
            if next.is_null() {
                break;
            }
            node = next;
            depth += 1;
        }

        trace!(address, depth, matched = ?best.map(|(len, _)| len), "trie lookup");
        best
    }

    /// Get memory usage statistics.
    pub fn memory_usage(&self) -> TrieMemoryStats {
        TrieMemoryStats {
            node_bytes: self.nodes.capacity() * std::mem::size_of::<TrieNode>(),
            value_bytes: self
                .nodes
                .iter()
                .filter_map(|n| n.value.as_ref())
                .map(ValueBlock::heap_bytes)
                .sum(),
            node_count: self.nodes.len(),
            entry_count: self.entries,
        }
    }

    /// Release every node and value block.
    ///
    /// Traversal is post-order: both subtrees of a node are released before
    /// its own value and the node itself. Dropping the trie frees the same
    /// memory; this variant also reports what was released.
    pub fn destroy(self) -> TeardownStats {
        let LpmTrie { mut nodes, entries, .. } = self;
        let mut stats = TeardownStats::default();

        if !nodes.is_empty() {
            // Deepest point: 33 expanded markers, 32 pending left siblings
            // and the two children just pushed, so 96 never spills.
            let mut stack: SmallVec<[(NodeRef, bool); 96]> = SmallVec::new();
            stack.push((NodeRef::ROOT, false));

            while let Some((r, expanded)) = stack.pop() {
                let node = &mut nodes[r.index()];
                if expanded {
                    if node.value.take().is_some() {
                        stats.blocks += 1;
                    }
                    stats.nodes += 1;
                    continue;
                }
                stack.push((r, true));
                // Right pushed first so the left subtree is released first.
                for child in [node.children[1], node.children[0]] {
                    if !child.is_null() {
                        stack.push((child, false));
                    }
                }
            }
        }

        debug_assert_eq!(stats.nodes, nodes.len(), "unreachable trie node");
        debug_assert_eq!(stats.blocks, entries);
        drop(nodes);

        debug!(nodes = stats.nodes, blocks = stats.blocks, "trie destroyed");
        stats
    }
}

impl Default for LpmTrie {
    fn default() -> Self {
        Self::new()
    }
}
