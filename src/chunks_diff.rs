//! C6 — reachable-chunk diff between two tree roots.
//!
//! Walks both trees top-down, always expanding whichever frontier still
//! holds the taller unvisited ref, and skips any ref the frontiers share
//! (same hash ⇒ identical subtree, content-addressing guarantees it).
//! What's left once both frontiers drain is exactly the set of chunks
//! reachable from one root but not the other. Grounded in
//! `types/chunk_diff.go`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::error::Result;
use crate::hash::{Ref, ValueKind};
use crate::seq::meta::OrderedKey;
use crate::store::{decode_meta, require, ChunkStore};
use crate::value::Value;

#[derive(PartialEq, Eq)]
struct HeightRef(Ref);

impl Ord for HeightRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.height.cmp(&other.0.height).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for HeightRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `(only_in_a, only_in_b)`: refs reachable from `root_a` but not `root_b`,
/// and vice versa. Shared subtrees never appear in either set.
///
/// Processes one height at a time, always the tallest height still
/// pending in either frontier: every ref at that height is pulled off
/// both heaps first, so a ref shared between the two sides is caught
/// regardless of which sibling order either heap happens to pop in (a
/// single pairwise top-of-heap comparison would miss shared refs sitting
/// behind same-height siblings).
pub fn chunks_diff(root_a: Ref, root_b: Ref, store: &dyn ChunkStore) -> Result<(HashSet<Ref>, HashSet<Ref>)> {
    let mut only_a = HashSet::new();
    let mut only_b = HashSet::new();
    let mut heap_a = BinaryHeap::new();
    let mut heap_b = BinaryHeap::new();
    heap_a.push(HeightRef(root_a));
    heap_b.push(HeightRef(root_b));

    loop {
        let cur_height = match (heap_a.peek(), heap_b.peek()) {
            (None, None) => break,
            (Some(a), None) => a.0.height,
            (None, Some(b)) => b.0.height,
            (Some(a), Some(b)) => a.0.height.max(b.0.height),
        };

        let mut level_a = pop_level(&mut heap_a, cur_height);
        let mut level_b = pop_level(&mut heap_b, cur_height);

        let shared: Vec<Ref> = level_a.intersection(&level_b).copied().collect();
        for r in shared {
            level_a.remove(&r);
            level_b.remove(&r);
        }

        for r in level_a {
            expand_or_record(r, store, &mut heap_a, &mut only_a)?;
        }
        for r in level_b {
            expand_or_record(r, store, &mut heap_b, &mut only_b)?;
        }
    }

    Ok((only_a, only_b))
}

fn pop_level(heap: &mut BinaryHeap<HeightRef>, height: u32) -> HashSet<Ref> {
    let mut level = HashSet::new();
    while let Some(top) = heap.peek() {
        if top.0.height != height {
            break;
        }
        level.insert(heap.pop().expect("peeked above").0);
    }
    level
}

fn expand_or_record(r: Ref, store: &dyn ChunkStore, heap: &mut BinaryHeap<HeightRef>, only: &mut HashSet<Ref>) -> Result<()> {
    only.insert(r);
    if r.is_leaf() {
        return Ok(());
    }
    let chunk = require(store, &r, &r)?;
    for child in child_refs(&chunk, r.kind)? {
        heap.push(HeightRef(child));
    }
    Ok(())
}

fn child_refs(chunk: &crate::chunk::Chunk, kind: ValueKind) -> Result<Vec<Ref>> {
    match kind {
        ValueKind::List | ValueKind::Blob => Ok(decode_meta::<u64>(chunk)?.chunks()),
        ValueKind::Map | ValueKind::Set => Ok(decode_meta::<OrderedKey<Value>>(chunk)?.chunks()),
        _ => Err(crate::error::Error::Decode(chunk.r#ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::List;
    use crate::store::InMemoryChunkStore;
    use test_log::test;

    #[test]
    fn identical_roots_have_no_difference() {
        let store = InMemoryChunkStore::new();
        let data: Vec<Value> = (0..2000i64).map(Value::Int).collect();
        let list = List::from_items(data, &store).unwrap();
        let (a, b) = chunks_diff(list.root(), list.root(), &store).unwrap();
        assert!(a.is_empty() && b.is_empty());
    }

    #[test]
    fn a_small_edit_only_touches_a_handful_of_chunks() {
        let store = InMemoryChunkStore::new();
        let data: Vec<Value> = (0..5000i64).map(Value::Int).collect();
        let before = List::from_items(data, &store).unwrap();
        let after = before.splice(2500, 1, vec![Value::Int(999_999)], &store).unwrap();

        let (only_before, only_after) = chunks_diff(before.root(), after.root(), &store).unwrap();
        assert!(!only_before.is_empty());
        assert!(!only_after.is_empty());
        // Locality of edit: far fewer chunks change than exist in the tree.
        assert!(only_before.len() < 50);
        assert!(only_after.len() < 50);
    }

    #[test]
    fn disjoint_trees_reach_entirely_different_chunks() {
        let store = InMemoryChunkStore::new();
        let a = List::from_items(vec![Value::Int(1)], &store).unwrap();
        let b = List::from_items(vec![Value::Int(2)], &store).unwrap();
        let (only_a, only_b) = chunks_diff(a.root(), b.root(), &store).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_b.len(), 1);
    }
}
