//! C3 — the meta-sequence (internal node) model.

use serde::{Deserialize, Serialize};

use crate::hash::Ref;

/// One entry of a meta-sequence: a pointer to a child subtree, the
/// per-kind ordering key, and the number of leaf items reachable below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTuple<K> {
    pub child_ref: Ref,
    pub index_key: K,
    pub num_leaves: u64,
}

/// An ordered array of [`MetaTuple`]s: the internal-node representation of
/// a prolly tree (spec.md §3). All children share one concrete kind and
/// sit exactly one level shallower than this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSequence<K> {
    tuples: Vec<MetaTuple<K>>,
}

impl<K: Clone> MetaSequence<K> {
    #[must_use]
    pub fn new(tuples: Vec<MetaTuple<K>>) -> Self {
        debug_assert!(!tuples.is_empty(), "a meta-sequence is never empty");
        Self { tuples }
    }

    #[must_use]
    pub fn tuple_at(&self, idx: usize) -> &MetaTuple<K> {
        &self.tuples[idx]
    }

    #[must_use]
    pub fn tuple_count(&self) -> usize {
        self.tuples.len()
    }

    #[must_use]
    pub fn last_tuple(&self) -> &MetaTuple<K> {
        self.tuples.last().expect("meta-sequence is never empty")
    }

    #[must_use]
    pub fn tuples(&self) -> &[MetaTuple<K>] {
        &self.tuples
    }

    /// Child refs, used for reachability (C6).
    #[must_use]
    pub fn chunks(&self) -> Vec<Ref> {
        self.tuples.iter().map(|t| t.child_ref).collect()
    }

    #[must_use]
    pub fn num_leaves(&self) -> u64 {
        self.tuples.iter().map(|t| t.num_leaves).sum()
    }
}

/// Per-kind aggregation of a meta node's tuple keys from the "local" keys
/// its children handed up, per spec.md §4.3:
///
/// - Indexed kinds (List/Blob): `aggregate` turns each child's own subtree
///   size into a running cumulative offset, and hands its own total size
///   up as the aggregate.
/// - Ordered kinds (Map/Set): `aggregate` passes tuple keys through
///   unchanged (they're already the max key of each child, which is
///   already correctly ordered), and hands the last key up as the
///   aggregate.
pub trait MetaValue: Clone + Ord + std::fmt::Debug {
    /// Given the "local" keys handed up by each child (in order), return
    /// the keys actually stored on this node's tuples, plus the aggregate
    /// key this node itself should hand to *its* parent.
    fn aggregate(local_keys: &[Self]) -> (Vec<Self>, Self);
}

/// List/Blob: cumulative offset at the end of each child's subtree.
impl MetaValue for u64 {
    fn aggregate(local_keys: &[Self]) -> (Vec<Self>, Self) {
        let mut running = 0u64;
        let mut out = Vec::with_capacity(local_keys.len());
        for size in local_keys {
            running += size;
            out.push(running);
        }
        (out, running)
    }
}

/// Map/Set: an ordered key type whose meta-tuple key is the largest key
/// present in the child's subtree. Implemented generically for any
/// already-`Ord` key by simply threading the input through.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderedKey<K>(pub K);

impl<K: Clone + Ord + std::fmt::Debug> MetaValue for OrderedKey<K> {
    fn aggregate(local_keys: &[Self]) -> (Vec<Self>, Self) {
        let last = local_keys.last().cloned().expect("chunk is never empty");
        (local_keys.to_vec(), last)
    }
}
