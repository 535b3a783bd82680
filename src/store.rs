//! C9 — the chunk store interface and its in-memory implementation.
//!
//! Grounded in `chunk_storage/hashmap_storage.rs`: a plain `HashMap` keyed
//! by content hash is enough for anything that isn't trying to survive a
//! restart. An optional `redb`-backed store (behind the `redb` feature,
//! grounded in `chunk_storage/redb.rs`) covers the persistent case the
//! teacher already depends on `redb` for.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::hash::Ref;

/// Content-addressed storage for opaque chunks (spec.md §6). Implementors
/// only need to answer "do I have this ref" and "give me these refs";
/// everything else (chunking, decoding, diffing) is layered on top.
pub trait ChunkStore: Send + Sync {
    fn get(&self, r: &Ref) -> Option<Chunk>;
    fn has(&self, r: &Ref) -> bool {
        self.get(r).is_some()
    }
    /// Persist a batch of already-validated chunks. Implementations should
    /// treat re-inserting an existing ref as a no-op rather than an error:
    /// content addressing means two chunks with the same ref are identical.
    fn put_many(&self, chunks: Vec<Chunk>) -> Result<()>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dead simple in-memory global storage.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChunkStore {
    data: Arc<RwLock<HashMap<Ref, Chunk>>>,
}

impl InMemoryChunkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn get(&self, r: &Ref) -> Option<Chunk> {
        self.data.read().expect("chunk store lock poisoned").get(r).cloned()
    }

    fn put_many(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut data = self.data.write().expect("chunk store lock poisoned");
        for chunk in chunks {
            trace!(r#ref = %chunk.r#ref(), "storing chunk");
            data.entry(chunk.r#ref()).or_insert(chunk);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.data.read().expect("chunk store lock poisoned").len()
    }
}

/// Decode a chunk's bytes as a leaf item list or a meta-sequence,
/// depending on which the caller expects (its `Ref.height` already tells
/// it which). Kept as free functions rather than methods on `ChunkStore`
/// so trees can mix decode logic with arbitrary store backends.
pub fn decode_leaf<Item: serde::de::DeserializeOwned>(chunk: &Chunk) -> Result<Vec<Item>> {
    bitcode::deserialize(&chunk.data).map_err(Error::from)
}

pub fn decode_meta<K: serde::de::DeserializeOwned>(chunk: &Chunk) -> Result<crate::seq::meta::MetaSequence<K>> {
    bitcode::deserialize(&chunk.data).map_err(Error::from)
}

/// Fetch `r` from `store` and fail loudly if it's missing, used at the
/// boundary between a store lookup and code that assumes a referenced
/// chunk exists (spec.md's reachability invariant).
pub fn require(store: &dyn ChunkStore, r: &Ref, referrer: &Ref) -> Result<Chunk> {
    store.get(r).ok_or_else(|| {
        debug!(%r, %referrer, "missing reference");
        Error::MissingReference(*referrer, *r)
    })
}

#[cfg(feature = "redb")]
pub mod redb_store {
    //! A `redb`-backed [`ChunkStore`], grounded in `chunk_storage/redb.rs`.
    //! Chunks are stored keyed by their 32-byte hash; height/kind are
    //! re-derived from the key's companion byte, since `redb` tables want a
    //! fixed-width key.

    use redb::{Database, ReadableTable, TableDefinition};

    use super::{ChunkStore, Result};
    use crate::chunk::Chunk;
    use crate::error::Error;
    use crate::hash::Ref;

    const TABLE: TableDefinition<'_, &[u8], &[u8]> = TableDefinition::new("chunks");

    fn encode_key(r: &Ref) -> Vec<u8> {
        let mut key = Vec::with_capacity(37);
        key.extend_from_slice(&r.hash);
        key.extend_from_slice(&r.height.to_be_bytes());
        key.push(r.kind as u8);
        key
    }

    pub struct RedbChunkStore {
        db: Database,
    }

    impl RedbChunkStore {
        pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
            let db = Database::create(path).map_err(|e| Error::Io(std::io::Error::other(e)))?;
            let write_txn = db.begin_write().map_err(|e| Error::Io(std::io::Error::other(e)))?;
            {
                write_txn.open_table(TABLE).map_err(|e| Error::Io(std::io::Error::other(e)))?;
            }
            write_txn.commit().map_err(|e| Error::Io(std::io::Error::other(e)))?;
            Ok(Self { db })
        }
    }

    impl ChunkStore for RedbChunkStore {
        fn get(&self, r: &Ref) -> Option<Chunk> {
            let read_txn = self.db.begin_read().ok()?;
            let table = read_txn.open_table(TABLE).ok()?;
            let key = encode_key(r);
            let value = table.get(key.as_slice()).ok()??;
            Some(Chunk::new(value.value().to_vec(), r.height, r.kind))
        }

        fn put_many(&self, chunks: Vec<Chunk>) -> Result<()> {
            let write_txn = self.db.begin_write().map_err(|e| Error::Io(std::io::Error::other(e)))?;
            {
                let mut table = write_txn.open_table(TABLE).map_err(|e| Error::Io(std::io::Error::other(e)))?;
                for chunk in &chunks {
                    let key = encode_key(&chunk.r#ref());
                    table.insert(key.as_slice(), chunk.data.as_ref()).map_err(|e| Error::Io(std::io::Error::other(e)))?;
                }
            }
            write_txn.commit().map_err(|e| Error::Io(std::io::Error::other(e)))?;
            Ok(())
        }

        fn len(&self) -> usize {
            let Ok(read_txn) = self.db.begin_read() else { return 0 };
            let Ok(table) = read_txn.open_table(TABLE) else { return 0 };
            table.len().unwrap_or(0) as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ValueKind;
    use test_log::test;

    #[test]
    fn put_then_get_round_trips() {
        let store = InMemoryChunkStore::new();
        let chunk = Chunk::new(b"hello".to_vec(), 0, ValueKind::Blob);
        let r = chunk.r#ref();
        store.put_many(vec![chunk.clone()]).unwrap();
        assert_eq!(store.get(&r), Some(chunk));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reinserting_same_ref_is_a_no_op() {
        let store = InMemoryChunkStore::new();
        let chunk = Chunk::new(b"hello".to_vec(), 0, ValueKind::Blob);
        store.put_many(vec![chunk.clone(), chunk.clone()]).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_ref_is_reported_with_the_referrer() {
        let store = InMemoryChunkStore::new();
        let missing = Chunk::new(b"ghost".to_vec(), 0, ValueKind::Blob).r#ref();
        let referrer = Chunk::new(b"referrer".to_vec(), 1, ValueKind::List).r#ref();
        let err = require(&store, &missing, &referrer).unwrap_err();
        assert!(matches!(err, Error::MissingReference(r, m) if r == referrer && m == missing));
    }
}
