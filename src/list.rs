//! The indexed List tree: a prolly tree over `Value` items keyed by
//! position. Grounded in `types/compound_list.go`.

use std::rc::Rc;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::hash::{Ref, ValueKind};
use crate::seq::boundary::{RollingHashBoundary, LIST_WINDOW, OBJECT_PATTERN};
use crate::seq::chunker::Chunker;
use crate::store::{decode_leaf, decode_meta, require, ChunkStore};
use crate::value::Value;

/// A handle to a List's root chunk. Lists are immutable and persistent:
/// every mutating operation returns a new `List` pointing at a new root,
/// sharing whatever chunks the edit didn't touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct List {
    root: Ref,
}

impl List {
    #[must_use]
    pub fn open(root: Ref) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> Ref {
        self.root
    }

    pub fn from_items(items: Vec<Value>, store: &dyn ChunkStore) -> Result<Self> {
        let mut chunker = new_chunker();
        for item in items {
            chunker.append(item);
        }
        let root = chunker.done();
        store.put_many(chunker.into_emitted_chunks())?;
        Ok(Self { root })
    }

    pub fn len(&self, store: &dyn ChunkStore) -> Result<u64> {
        let chunk = require(store, &self.root, &self.root)?;
        Ok(leaf_count(&chunk)?)
    }

    pub fn get(&self, index: u64, store: &dyn ChunkStore) -> Result<Option<Value>> {
        get_at(&self.root, index, store)
    }

    pub fn to_vec(&self, store: &dyn ChunkStore) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        collect(&self.root, store, &mut out)?;
        Ok(out)
    }

    /// Replace `del_count` items starting at `start` with `inserted`,
    /// returning the new tree. Locates the edit with a cursor and drives a
    /// resumed chunker through it (spec.md §4.4.7), splicing the untouched
    /// remainder of the tree back in rather than rebuilding it: the
    /// content-defined chunk boundaries are unaffected by the path taken
    /// there, so this produces the exact same root an insert-everything
    /// rebuild would (spec.md §8's determinism property).
    pub fn splice(&self, start: u64, del_count: u64, inserted: Vec<Value>, store: &dyn ChunkStore) -> Result<Self> {
        let (root, emitted) =
            crate::seq::edit::splice_indexed(self.root, store, start, del_count, inserted, LIST_WINDOW, |chunk| decode_leaf::<Value>(chunk), new_chunker)?;
        store.put_many(emitted)?;
        Ok(Self { root })
    }

    pub fn insert(&self, index: u64, items: Vec<Value>, store: &dyn ChunkStore) -> Result<Self> {
        self.splice(index, 0, items, store)
    }

    pub fn remove(&self, index: u64, count: u64, store: &dyn ChunkStore) -> Result<Self> {
        self.splice(index, count, Vec::new(), store)
    }

    pub fn set(&self, index: u64, item: Value, store: &dyn ChunkStore) -> Result<Self> {
        self.splice(index, 1, vec![item], store)
    }

    pub fn append(&self, items: Vec<Value>, store: &dyn ChunkStore) -> Result<Self> {
        let len = self.len(store)?;
        self.splice(len, 0, items, store)
    }
}

fn new_chunker<'a>() -> Chunker<'a, Value, u64> {
    let boundary = Box::new(RollingHashBoundary::new(LIST_WINDOW, OBJECT_PATTERN, |v: &Value| v.digest()[0]));
    let local_key_of: Rc<dyn Fn(&[Value]) -> u64> = Rc::new(|buf: &[Value]| buf.len() as u64);
    let num_leaves_of: Rc<dyn Fn(&[Value]) -> u64> = Rc::new(|buf: &[Value]| buf.len() as u64);
    let encode: Rc<dyn Fn(&[Value]) -> bytes::Bytes> =
        Rc::new(|buf: &[Value]| bitcode::serialize(buf).expect("list leaf always encodes").into());
    Chunker::new_leaf(boundary, local_key_of, num_leaves_of, encode, ValueKind::List)
}

fn leaf_count(chunk: &Chunk) -> Result<u64> {
    if chunk.r#ref().is_leaf() {
        Ok(decode_leaf::<Value>(chunk)?.len() as u64)
    } else {
        Ok(decode_meta::<u64>(chunk)?.num_leaves())
    }
}

fn get_at(root: &Ref, index: u64, store: &dyn ChunkStore) -> Result<Option<Value>> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        let items = decode_leaf::<Value>(&chunk)?;
        return Ok(items.get(index as usize).cloned());
    }
    let meta = decode_meta::<u64>(&chunk)?;
    let mut base = 0u64;
    for tuple in meta.tuples() {
        let child_size = tuple.index_key - base;
        if index < base + child_size {
            return get_at(&tuple.child_ref, index - base, store);
        }
        base += child_size;
    }
    Ok(None)
}

fn collect(root: &Ref, store: &dyn ChunkStore, out: &mut Vec<Value>) -> Result<()> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        out.extend(decode_leaf::<Value>(&chunk)?);
        return Ok(());
    }
    let meta = decode_meta::<u64>(&chunk)?;
    for tuple in meta.tuples() {
        collect(&tuple.child_ref, store, out)?;
    }
    Ok(())
}
