//! The ordered Map tree: a prolly tree over `(key, value)` pairs sorted by
//! key. Grounded in `types/ordered_sequences.go`'s Map support and
//! `types/map.go`'s edit surface.

use std::rc::Rc;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::hash::{Ref, ValueKind};
use crate::seq::boundary::{RollingHashBoundary, ORDERED_LEAF_WINDOW};
use crate::seq::chunker::Chunker;
use crate::seq::meta::OrderedKey;
use crate::store::{decode_leaf, decode_meta, require, ChunkStore};
use crate::value::Value;

pub type Entry = (Value, Value);
type K = OrderedKey<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Map {
    root: Ref,
}

impl Map {
    #[must_use]
    pub fn open(root: Ref) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> Ref {
        self.root
    }

    /// Build a map from entries in any order; they're sorted by key and
    /// deduplicated (last write for a duplicate key wins), matching the
    /// ordered-collection invariant that every leaf item is uniquely and
    /// monotonically keyed.
    pub fn from_entries(mut entries: Vec<Entry>, store: &dyn ChunkStore) -> Result<Self> {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        let mut chunker = new_chunker();
        for entry in entries {
            chunker.append(entry);
        }
        let root = chunker.done();
        store.put_many(chunker.into_emitted_chunks())?;
        Ok(Self { root })
    }

    pub fn len(&self, store: &dyn ChunkStore) -> Result<u64> {
        let chunk = require(store, &self.root, &self.root)?;
        leaf_count(&chunk)
    }

    pub fn get(&self, key: &Value, store: &dyn ChunkStore) -> Result<Option<Value>> {
        get_at(&self.root, key, store)
    }

    pub fn has(&self, key: &Value, store: &dyn ChunkStore) -> Result<bool> {
        Ok(get_at(&self.root, key, store)?.is_some())
    }

    pub fn to_vec(&self, store: &dyn ChunkStore) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        collect(&self.root, store, &mut out)?;
        Ok(out)
    }

    /// Insert `value` at `key`, overwriting any existing entry for that
    /// key. Locates the edit with a cursor and drives a resumed chunker
    /// through it (spec.md §4.4.7) rather than rebuilding the whole map.
    pub fn insert(&self, key: Value, value: Value, store: &dyn ChunkStore) -> Result<Self> {
        let (root, emitted) = crate::seq::edit::ordered_edit(
            self.root,
            store,
            &key,
            Some((key.clone(), value)),
            ORDERED_LEAF_WINDOW,
            |entry: &Entry| &entry.0,
            |chunk| decode_leaf::<Entry>(chunk),
            new_chunker,
        )?
        .expect("inserting always produces a new root");
        store.put_many(emitted)?;
        Ok(Self { root })
    }

    pub fn remove(&self, key: &Value, store: &dyn ChunkStore) -> Result<Self> {
        match crate::seq::edit::ordered_edit(
            self.root,
            store,
            key,
            None,
            ORDERED_LEAF_WINDOW,
            |entry: &Entry| &entry.0,
            |chunk| decode_leaf::<Entry>(chunk),
            new_chunker,
        )? {
            Some((root, emitted)) => {
                store.put_many(emitted)?;
                Ok(Self { root })
            }
            None => Ok(*self),
        }
    }
}

fn new_chunker<'a>() -> Chunker<'a, Entry, K> {
    let boundary = Box::new(RollingHashBoundary::new(ORDERED_LEAF_WINDOW, crate::seq::boundary::OBJECT_PATTERN, |e: &Entry| {
        e.0.digest()[0]
    }));
    let local_key_of: Rc<dyn Fn(&[Entry]) -> K> =
        Rc::new(|buf: &[Entry]| OrderedKey(buf.last().expect("leaf is never empty").0.clone()));
    let num_leaves_of: Rc<dyn Fn(&[Entry]) -> u64> = Rc::new(|buf: &[Entry]| buf.len() as u64);
    let encode: Rc<dyn Fn(&[Entry]) -> bytes::Bytes> =
        Rc::new(|buf: &[Entry]| bitcode::serialize(buf).expect("map leaf always encodes").into());
    Chunker::new_leaf(boundary, local_key_of, num_leaves_of, encode, ValueKind::Map)
}

fn leaf_count(chunk: &Chunk) -> Result<u64> {
    if chunk.r#ref().is_leaf() {
        Ok(decode_leaf::<Entry>(chunk)?.len() as u64)
    } else {
        Ok(decode_meta::<K>(chunk)?.num_leaves())
    }
}

fn get_at(root: &Ref, key: &Value, store: &dyn ChunkStore) -> Result<Option<Value>> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        let entries = decode_leaf::<Entry>(&chunk)?;
        return Ok(entries.into_iter().find(|(k, _)| k == key).map(|(_, v)| v));
    }
    let meta = decode_meta::<K>(&chunk)?;
    for tuple in meta.tuples() {
        if key <= &tuple.index_key.0 {
            return get_at(&tuple.child_ref, key, store);
        }
    }
    Ok(None)
}

fn collect(root: &Ref, store: &dyn ChunkStore, out: &mut Vec<Entry>) -> Result<()> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        out.extend(decode_leaf::<Entry>(&chunk)?);
        return Ok(());
    }
    let meta = decode_meta::<K>(&chunk)?;
    for tuple in meta.tuples() {
        collect(&tuple.child_ref, store, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryChunkStore;
    use test_log::test;

    #[test]
    fn round_trips_and_sorts() {
        let store = InMemoryChunkStore::new();
        let entries = vec![
            (Value::Str("b".into()), Value::Int(2)),
            (Value::Str("a".into()), Value::Int(1)),
            (Value::Str("c".into()), Value::Int(3)),
        ];
        let map = Map::from_entries(entries, &store).unwrap();
        assert_eq!(map.len(&store).unwrap(), 3);
        assert_eq!(map.get(&Value::Str("b".into()), &store).unwrap(), Some(Value::Int(2)));
        assert!(map.has(&Value::Str("b".into()), &store).unwrap());
        assert!(!map.has(&Value::Str("z".into()), &store).unwrap());
        let sorted = map.to_vec(&store).unwrap();
        assert_eq!(sorted.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec![
            Value::Str("a".into()),
            Value::Str("b".into()),
            Value::Str("c".into()),
        ]);
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let store = InMemoryChunkStore::new();
        let map = Map::from_entries(vec![(Value::Int(1), Value::Int(10))], &store).unwrap();
        let map = map.insert(Value::Int(1), Value::Int(99), &store).unwrap();
        assert_eq!(map.get(&Value::Int(1), &store).unwrap(), Some(Value::Int(99)));
        assert_eq!(map.len(&store).unwrap(), 1);
    }

    #[test]
    fn large_map_chunks_into_a_tree() {
        let store = InMemoryChunkStore::new();
        let entries: Vec<Entry> = (0..4000i64).map(|i| (Value::Int(i), Value::Int(i * 2))).collect();
        let map = Map::from_entries(entries, &store).unwrap();
        assert!(!map.root().is_leaf());
        assert_eq!(map.get(&Value::Int(3333), &store).unwrap(), Some(Value::Int(6666)));
    }

    #[test]
    fn remove_of_absent_key_is_a_no_op_returning_the_same_root() {
        let store = InMemoryChunkStore::new();
        let entries: Vec<Entry> = (0..4000i64).map(|i| (Value::Int(i), Value::Int(i * 2))).collect();
        let map = Map::from_entries(entries, &store).unwrap();
        let unchanged = map.remove(&Value::Int(99_999), &store).unwrap();
        assert_eq!(unchanged.root(), map.root());
    }

    #[test]
    fn insert_and_remove_on_a_multi_chunk_map_preserve_other_entries() {
        let store = InMemoryChunkStore::new();
        let entries: Vec<Entry> = (0..4000i64).map(|i| (Value::Int(i * 2), Value::Int(i))).collect();
        let map = Map::from_entries(entries, &store).unwrap();

        let with_new_key = map.insert(Value::Int(3333), Value::Int(-1), &store).unwrap();
        assert_eq!(with_new_key.get(&Value::Int(3333), &store).unwrap(), Some(Value::Int(-1)));
        assert_eq!(with_new_key.get(&Value::Int(3332), &store).unwrap(), Some(Value::Int(1666)));
        assert_eq!(with_new_key.len(&store).unwrap(), 4001);

        let removed = with_new_key.remove(&Value::Int(3333), &store).unwrap();
        assert_eq!(removed.get(&Value::Int(3333), &store).unwrap(), None);
        assert_eq!(removed.len(&store).unwrap(), 4000);
        assert_eq!(removed.get(&Value::Int(0), &store).unwrap(), Some(Value::Int(0)));
        assert_eq!(removed.get(&Value::Int(7998), &store).unwrap(), Some(Value::Int(3999)));
    }
}
