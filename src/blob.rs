//! The indexed Blob tree: a prolly tree over raw bytes keyed by byte
//! offset. Grounded in `types/compound_blob.go`; structurally identical to
//! [`crate::list::List`] with `Item = u8`.

use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::hash::{Ref, ValueKind};
use crate::seq::boundary::{RollingHashBoundary, LIST_WINDOW, OBJECT_PATTERN};
use crate::seq::chunker::Chunker;
use crate::store::{decode_leaf, decode_meta, require, ChunkStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    root: Ref,
}

impl Blob {
    #[must_use]
    pub fn open(root: Ref) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> Ref {
        self.root
    }

    pub fn from_bytes(bytes: &[u8], store: &dyn ChunkStore) -> Result<Self> {
        let mut chunker = new_chunker();
        for b in bytes {
            chunker.append(*b);
        }
        let root = chunker.done();
        store.put_many(chunker.into_emitted_chunks())?;
        Ok(Self { root })
    }

    pub fn len(&self, store: &dyn ChunkStore) -> Result<u64> {
        let chunk = require(store, &self.root, &self.root)?;
        Ok(leaf_count(&chunk)?)
    }

    pub fn to_vec(&self, store: &dyn ChunkStore) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        collect(&self.root, store, &mut out)?;
        Ok(out)
    }

    /// Replace `del_count` bytes starting at `start` with `inserted`,
    /// returning the new tree. Locates the edit with a cursor and drives a
    /// resumed chunker through it (spec.md §4.4.7) rather than rebuilding
    /// the whole blob.
    pub fn splice(&self, start: u64, del_count: u64, inserted: &[u8], store: &dyn ChunkStore) -> Result<Self> {
        let (root, emitted) = crate::seq::edit::splice_indexed(
            self.root,
            store,
            start,
            del_count,
            inserted.to_vec(),
            LIST_WINDOW,
            |chunk: &Chunk| Ok(chunk.data.to_vec()),
            new_chunker,
        )?;
        store.put_many(emitted)?;
        Ok(Self { root })
    }

    /// A seekable, read-only view over this blob's content (spec.md §4.8).
    #[must_use]
    pub fn reader(&self, store: &dyn ChunkStore) -> Result<BlobReader> {
        let data = self.to_vec(store)?;
        Ok(BlobReader { data, pos: 0 })
    }
}

/// A materialized, seekable reader. Reads the whole blob up front rather
/// than paging individual chunks on demand; acceptable for the sizes this
/// store targets, and kept simple deliberately (see `DESIGN.md`).
pub struct BlobReader {
    data: Vec<u8>,
    pos: u64,
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos as usize;
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BlobReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(delta) => self.data.len() as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

fn new_chunker<'a>() -> Chunker<'a, u8, u64> {
    let boundary = Box::new(RollingHashBoundary::new(LIST_WINDOW, OBJECT_PATTERN, |b: &u8| *b));
    let local_key_of: Rc<dyn Fn(&[u8]) -> u64> = Rc::new(|buf: &[u8]| buf.len() as u64);
    let num_leaves_of: Rc<dyn Fn(&[u8]) -> u64> = Rc::new(|buf: &[u8]| buf.len() as u64);
    let encode: Rc<dyn Fn(&[u8]) -> bytes::Bytes> = Rc::new(|buf: &[u8]| bytes::Bytes::copy_from_slice(buf));
    Chunker::new_leaf(boundary, local_key_of, num_leaves_of, encode, ValueKind::Blob)
}

fn leaf_count(chunk: &Chunk) -> Result<u64> {
    if chunk.r#ref().is_leaf() {
        Ok(chunk.data.len() as u64)
    } else {
        Ok(decode_meta::<u64>(chunk)?.num_leaves())
    }
}

fn collect(root: &Ref, store: &dyn ChunkStore, out: &mut Vec<u8>) -> Result<()> {
    let chunk = require(store, root, root)?;
    if root.is_leaf() {
        out.extend_from_slice(&chunk.data);
        return Ok(());
    }
    let meta = decode_meta::<u64>(&chunk)?;
    for tuple in meta.tuples() {
        collect(&tuple.child_ref, store, out)?;
    }
    Ok(())
}
