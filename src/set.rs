//! The ordered Set tree: a prolly tree over unique, sorted `Value`
//! members. Grounded in `types/ordered_sequences.go`'s Set support;
//! structurally `Map` with the value dropped.

use std::rc::Rc;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::hash::{Ref, ValueKind};
use crate::seq::boundary::{RollingHashBoundary, ORDERED_LEAF_WINDOW};
use crate::seq::chunker::Chunker;
use crate::seq::meta::OrderedKey;
use crate::store::{decode_leaf, decode_meta, require, ChunkStore};
use crate::value::Value;

type K = OrderedKey<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Set {
    root: Ref,
}

impl Set {
    #[must_use]
    pub fn open(root: Ref) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> Ref {
        self.root
    }

    pub fn from_members(mut members: Vec<Value>, store: &dyn ChunkStore) -> Result<Self> {
        members.sort();
        members.dedup();
        let mut chunker = new_chunker();
        for member in members {
            chunker.append(member);
        }
        let root = chunker.done();
        store.put_many(chunker.into_emitted_chunks())?;
        Ok(Self { root })
    }

    pub fn len(&self, store: &dyn ChunkStore) -> Result<u64> {
        let chunk = require(store, &self.root, &self.root)?;
        leaf_count(&chunk)
    }

    pub fn contains(&self, member: &Value, store: &dyn ChunkStore) -> Result<bool> {
        Ok(contains_at(&self.root, member, store)?)
    }

    pub fn to_vec(&self, store: &dyn ChunkStore) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        collect(&self.root, store, &mut out)?;
        Ok(out)
    }

    /// Add `member`, a no-op if already present. Locates the edit with a
    /// cursor and drives a resumed chunker through it (spec.md §4.4.7)
    /// rather than rebuilding the whole set.
    pub fn insert(&self, member: Value, store: &dyn ChunkStore) -> Result<Self> {
        let (root, emitted) = crate::seq::edit::ordered_edit(
            self.root,
            store,
            &member,
            Some(member.clone()),
            ORDERED_LEAF_WINDOW,
            |v: &Value| v,
            |chunk| decode_leaf::<Value>(chunk),
            new_chunker,
        )?
        .expect("inserting always produces a new root");
        store.put_many(emitted)?;
        Ok(Self { root })
    }

    pub fn remove(&self, member: &Value, store: &dyn ChunkStore) -> Result<Self> {
        match crate::seq::edit::ordered_edit(
            self.root,
            store,
            member,
            None,
            ORDERED_LEAF_WINDOW,
            |v: &Value| v,
            |chunk| decode_leaf::<Value>(chunk),
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

fn new_chunker<'a>() -> Chunker<'a, Value, K> {
    let boundary =
        Box::new(RollingHashBoundary::new(ORDERED_LEAF_WINDOW, crate::seq::boundary::OBJECT_PATTERN, |v: &Value| v.digest()[0]));
    let local_key_of: Rc<dyn Fn(&[Value]) -> K> =
        Rc::new(|buf: &[Value]| OrderedKey(buf.last().expect("leaf is never empty").clone()));
    let num_leaves_of: Rc<dyn Fn(&[Value]) -> u64> = Rc::new(|buf: &[Value]| buf.len() as u64);
    let encode: Rc<dyn Fn(&[Value]) -> bytes::Bytes> =
        Rc::new(|buf: &[Value]| bitcode::serialize(buf).expect("set leaf always encodes").into());
    Chunker::new_leaf(boundary, local_key_of, num_leaves_of, encode, ValueKind::Set)
}

fn leaf_count(chunk: &Chunk) -> Result<u64> {
    if chunk.r#ref().is_leaf() {
        Ok(decode_leaf::<Value>(chunk)?.len() as u64)
    } else {
        Ok(decode_meta::<K>(chunk)?.num_leaves())
    }
}

fn contains_at(root: &Ref, member: &Value, store: &dyn ChunkStore) -> Result<bool> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        let members = decode_leaf::<Value>(&chunk)?;
        return Ok(members.iter().any(|m| m == member));
    }
    let meta = decode_meta::<K>(&chunk)?;
    for tuple in meta.tuples() {
        if member <= &tuple.index_key.0 {
            return contains_at(&tuple.child_ref, member, store);
        }
    }
    Ok(false)
}

fn collect(root: &Ref, store: &dyn ChunkStore, out: &mut Vec<Value>) -> Result<()> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        out.extend(decode_leaf::<Value>(&chunk)?);
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
    fn round_trips_sorted_and_deduped() {
        let store = InMemoryChunkStore::new();
        let set = Set::from_members(vec![Value::Int(3), Value::Int(1), Value::Int(1), Value::Int(2)], &store).unwrap();
        assert_eq!(set.len(&store).unwrap(), 3);
        assert!(set.contains(&Value::Int(2), &store).unwrap());
        assert!(!set.contains(&Value::Int(42), &store).unwrap());
        assert_eq!(set.to_vec(&store).unwrap(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn remove_drops_member() {
        let store = InMemoryChunkStore::new();
        let set = Set::from_members(vec![Value::Int(1), Value::Int(2)], &store).unwrap();
        let set = set.remove(&Value::Int(1), &store).unwrap();
        assert!(!set.contains(&Value::Int(1), &store).unwrap());
        assert_eq!(set.len(&store).unwrap(), 1);
    }

    #[test]
    fn remove_of_absent_member_is_a_no_op_returning_the_same_root() {
        let store = InMemoryChunkStore::new();
        let members: Vec<Value> = (0..4000i64).map(Value::Int).collect();
        let set = Set::from_members(members, &store).unwrap();
        let unchanged = set.remove(&Value::Int(99_999), &store).unwrap();
        assert_eq!(unchanged.root(), set.root());
    }

    #[test]
    fn insert_and_remove_on_a_multi_chunk_set_preserve_other_members() {
        let store = InMemoryChunkStore::new();
        let members: Vec<Value> = (0..4000i64).map(|i| Value::Int(i * 2)).collect();
        let set = Set::from_members(members, &store).unwrap();

        let with_new_member = set.insert(Value::Int(3333), &store).unwrap();
        assert!(with_new_member.contains(&Value::Int(3333), &store).unwrap());
        assert_eq!(with_new_member.len(&store).unwrap(), 4001);

        let removed = with_new_member.remove(&Value::Int(3333), &store).unwrap();
        assert!(!removed.contains(&Value::Int(3333), &store).unwrap());
        assert_eq!(removed.len(&store).unwrap(), 4000);
        assert!(removed.contains(&Value::Int(0), &store).unwrap());
        assert!(removed.contains(&Value::Int(7998), &store).unwrap());
    }
}
