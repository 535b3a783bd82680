//! C8 — the validating batching sink.
//!
//! Accepts chunks one at a time, checks that every ref a chunk points at
//! is already known (either durable in the store or already accepted by
//! this sink), and only hands batches to the store once `BATCH_SIZE` of
//! them have validated. Grounded in `chunk_storage/node_stream.rs`'s
//! accept-then-batch shape, generalized to the cross-reference check
//! spec.md §4.8 requires.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::chunk::{Chunk, Hints};
use crate::error::{Error, Result};
use crate::hash::{Ref, ValueKind};
use crate::seq::meta::OrderedKey;
use crate::store::{decode_leaf, decode_meta, ChunkStore};
use crate::value::Value;

pub const BATCH_SIZE: usize = 16;

/// A validating, batching front door onto a [`ChunkStore`]. Chunks only
/// reach the store once a batch of `BATCH_SIZE` of them has validated;
/// until then they sit in an internal buffer the caller can still recover
/// from (an invalid chunk fails without touching the store at all).
pub struct ValidatingBatchingSink<'s> {
    store: &'s dyn ChunkStore,
    known: HashSet<Ref>,
    buffer: Vec<Chunk>,
}

impl<'s> ValidatingBatchingSink<'s> {
    #[must_use]
    pub fn new(store: &'s dyn ChunkStore) -> Self {
        Self { store, known: HashSet::new(), buffer: Vec::new() }
    }

    /// Seed the cache with refs the caller already knows are durable (or
    /// about to be sent), so the first few chunks of a stream can validate
    /// against children this sink hasn't itself observed yet. Refs not
    /// actually present in the store are silently dropped; they don't earn
    /// a chunk's trust until the store confirms them.
    pub fn prepare(&mut self, hints: &Hints) {
        for r in hints {
            if self.store.has(r) {
                self.known.insert(*r);
            }
        }
    }

    /// Validate and enqueue one chunk. A chunk that references something
    /// this sink hasn't seen (and the store doesn't have) is rejected
    /// without being buffered; the sink's state is unchanged by a failed
    /// enqueue, so the caller can retry after sending the missing chunk
    /// first, or after another `prepare` call.
    pub fn enqueue(&mut self, chunk: Chunk) -> Result<()> {
        let r = chunk.r#ref();
        if self.known.contains(&r) {
            trace!(%r, "chunk already known, skipping");
            return Ok(());
        }

        for child in referenced_children(&chunk)? {
            if !self.known.contains(&child) && !self.store.has(&child) {
                debug!(%r, missing = %child, "chunk references an unvalidated ref");
                return Err(Error::MissingReference(r, child));
            }
        }

        self.known.insert(r);
        self.buffer.push(chunk);
        if self.buffer.len() >= BATCH_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Hand whatever's buffered to the store, regardless of whether a full
    /// batch has accumulated. A no-op if nothing is buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        trace!(count = batch.len(), "flushing batch");
        self.store.put_many(batch)
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// The refs a chunk's decoded content points at, one level down. Decoding
/// with the wrong shape for `r.kind`/`r.height` surfaces as [`Error::Decode`]
/// or [`Error::Bitcode`], exactly the "fails to decode" half of spec.md
/// §4.8's validation step.
fn referenced_children(chunk: &Chunk) -> Result<Vec<Ref>> {
    let r = chunk.r#ref();
    if r.is_leaf() {
        leaf_children(chunk, r.kind)
    } else {
        match r.kind {
            ValueKind::List | ValueKind::Blob => Ok(decode_meta::<u64>(chunk)?.chunks()),
            ValueKind::Map | ValueKind::Set => Ok(decode_meta::<OrderedKey<Value>>(chunk)?.chunks()),
            _ => Err(Error::Decode(r)),
        }
    }
}

fn leaf_children(chunk: &Chunk, kind: ValueKind) -> Result<Vec<Ref>> {
    match kind {
        ValueKind::Blob => Ok(Vec::new()),
        ValueKind::List | ValueKind::Set => {
            let items = decode_leaf::<Value>(chunk)?;
            Ok(items.iter().filter_map(Value::as_collection_ref).collect())
        }
        ValueKind::Map => {
            let entries = decode_leaf::<(Value, Value)>(chunk)?;
            Ok(entries.iter().flat_map(|(k, v)| [k.as_collection_ref(), v.as_collection_ref()]).flatten().collect())
        }
        _ => Err(Error::Decode(chunk.r#ref())),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::list::List;
    use crate::store::InMemoryChunkStore;

    #[test]
    fn leaf_chunks_with_no_collection_children_enqueue_directly() {
        let store = InMemoryChunkStore::new();
        let mut sink = ValidatingBatchingSink::new(&store);
        let chunk = Chunk::new(bitcode::serialize(&vec![Value::Int(1), Value::Int(2)]).unwrap(), 0, ValueKind::List);
        sink.enqueue(chunk).unwrap();
        sink.flush().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_a_chunk_referencing_an_unknown_child() {
        let store = InMemoryChunkStore::new();
        let mut sink = ValidatingBatchingSink::new(&store);
        let dangling = Chunk::new(b"not actually stored anywhere".to_vec(), 0, ValueKind::Blob).r#ref();
        let chunk = Chunk::new(bitcode::serialize(&vec![Value::Blob(dangling)]).unwrap(), 0, ValueKind::List);

        let err = sink.enqueue(chunk).unwrap_err();
        assert!(matches!(err, Error::MissingReference(_, m) if m == dangling));
        assert_eq!(sink.buffered_len(), 0);
    }

    #[test]
    fn prepare_admits_children_already_present_in_the_store() {
        let store = InMemoryChunkStore::new();
        let blob = List::from_items(vec![Value::Int(42)], &store).unwrap();

        let mut sink = ValidatingBatchingSink::new(&store);
        let mut hints = Hints::new();
        hints.insert(blob.root());
        sink.prepare(&hints);

        let chunk = Chunk::new(bitcode::serialize(&vec![Value::List(blob.root())]).unwrap(), 0, ValueKind::List);
        sink.enqueue(chunk).unwrap();
        sink.flush().unwrap();
    }

    #[test]
    fn flush_fires_automatically_once_a_batch_fills_up() {
        let store = InMemoryChunkStore::new();
        let mut sink = ValidatingBatchingSink::new(&store);
        for i in 0..BATCH_SIZE {
            let chunk = Chunk::new(bitcode::serialize(&vec![Value::Int(i as i64)]).unwrap(), 0, ValueKind::List);
            sink.enqueue(chunk).unwrap();
        }
        assert_eq!(sink.buffered_len(), 0);
        assert_eq!(store.len(), BATCH_SIZE);
    }

    #[test]
    fn a_chunk_already_known_to_this_sink_is_skipped_without_revalidation() {
        let store = InMemoryChunkStore::new();
        let mut sink = ValidatingBatchingSink::new(&store);
        let chunk = Chunk::new(bitcode::serialize(&vec![Value::Int(7)]).unwrap(), 0, ValueKind::List);
        sink.enqueue(chunk.clone()).unwrap();
        sink.enqueue(chunk).unwrap();
        assert_eq!(sink.buffered_len(), 1);
    }
}
