//! C4 — the incremental sequence chunker.
//!
//! One generic `Chunker<Item, K>` serves every level of a tree: `Item` is
//! the real item type at the leaf level, or `MetaTuple<K>` one level up
//! (and every level above that, since a meta node's children are
//! themselves described by `MetaTuple`s regardless of their own height).
//! A chunker's parent, if it has one, is therefore always
//! `Chunker<MetaTuple<K>, K>` — the same recursive-through-`Box` shape used
//! by [`crate::seq::cursor::MetaCursor`].
//!
//! Grounded in `types/sequence_chunker.go`.

use std::rc::Rc;

use bytes::Bytes;

use crate::chunk::Chunk;
use crate::hash::{Ref, ValueKind};
use crate::seq::boundary::{BoundaryChecker, RollingHashBoundary, META_WINDOW};
use crate::seq::cursor::MetaCursor;
use crate::seq::meta::{MetaSequence, MetaTuple, MetaValue};

type LocalKeyFn<Item, K> = Rc<dyn Fn(&[Item]) -> K>;
type EncodeFn<Item> = Rc<dyn Fn(&[Item]) -> Bytes>;
type NumLeavesFn<Item> = Rc<dyn Fn(&[Item]) -> u64>;

/// Pulls not-yet-consumed old-tree siblings one at a time, for
/// [`Chunker::finalize_unchanged_tail`]. Backed by a [`MetaCursor`] walking
/// the tree the edit started from.
pub trait RemainingSiblings<K> {
    fn next_sibling(&mut self) -> Option<MetaTuple<K>>;
}

/// Walks the remaining siblings at one meta level of the original tree,
/// starting from wherever an edit's cursor was left after its last
/// modification. The first call uses the cursor's current position as-is
/// (it was already placed there by the edit); every call after that
/// advances first. This mirrors `finalizeCursor`'s tail replay, which
/// calls `parent.Skip()` on every new sibling including the first.
pub struct CursorSiblings<'a, K: Clone> {
    cursor: MetaCursor<'a, K>,
    started: bool,
}

impl<'a, K: Clone> CursorSiblings<'a, K> {
    #[must_use]
    pub fn new(cursor: MetaCursor<'a, K>) -> Self {
        Self { cursor, started: false }
    }
}

impl<'a, K: MetaValue> RemainingSiblings<K> for CursorSiblings<'a, K> {
    fn next_sibling(&mut self) -> Option<MetaTuple<K>> {
        if !self.started {
            self.started = true;
        } else if !self.cursor.advance() {
            return None;
        }
        self.cursor.current().cloned()
    }
}

/// One level of the incremental tree-edit algorithm. Buffers items (or
/// child tuples) until the boundary checker calls a chunk closed, emits
/// the finished chunk, and hands a summarizing [`MetaTuple`] up to a
/// lazily-created parent level.
pub struct Chunker<'a, Item, K> {
    buffer: Vec<Item>,
    boundary: Box<dyn BoundaryChecker<Item>>,
    local_key_of: LocalKeyFn<Item, K>,
    num_leaves_of: NumLeavesFn<Item>,
    encode: EncodeFn<Item>,
    height: u32,
    kind: ValueKind,
    parent: Option<Box<Chunker<'a, MetaTuple<K>, K>>>,
    /// The first child this level has closed, held back in case no second
    /// child ever shows up — in which case this level needs no parent at
    /// all and its one chunk becomes the tree root (spec.md §4.4.3).
    pending_first: Option<MetaTuple<K>>,
    remaining_old: Option<Box<dyn RemainingSiblings<K> + 'a>>,
    emitted: Vec<Chunk>,
}

impl<'a, Item: Clone, K: MetaValue> Chunker<'a, Item, K> {
    #[must_use]
    pub fn new_leaf(
        boundary: Box<dyn BoundaryChecker<Item>>,
        local_key_of: LocalKeyFn<Item, K>,
        num_leaves_of: NumLeavesFn<Item>,
        encode: EncodeFn<Item>,
        kind: ValueKind,
    ) -> Self {
        Self {
            buffer: Vec::new(),
            boundary,
            local_key_of,
            num_leaves_of,
            encode,
            height: 0,
            kind,
            parent: None,
            pending_first: None,
            remaining_old: None,
            emitted: Vec::new(),
        }
    }

    /// Attach the remaining untouched siblings of the tree this edit
    /// started from, so [`Chunker::done`] can splice them back in rather
    /// than treating the edit as ending the whole sequence.
    pub fn resume_from(&mut self, remaining_old: Box<dyn RemainingSiblings<K> + 'a>) {
        self.remaining_old = Some(remaining_old);
    }

    /// Warm up the rolling boundary state with `window` items preceding an
    /// edit, then replay the still-open chunk's own items (up to the
    /// cursor) into the buffer proper. Neither phase can emit a chunk: the
    /// original tree already proved no boundary falls among them.
    pub fn resume(&mut self, prior_window: &[Item], open_chunk_so_far: &[Item]) {
        for item in prior_window {
            self.boundary.write(item);
        }
        for item in open_chunk_so_far {
            self.append(item.clone());
        }
    }

    /// Add one item. May close the current chunk and hand a summary up.
    pub fn append(&mut self, item: Item) {
        let boundary = self.boundary.write(&item);
        self.buffer.push(item);
        if boundary {
            self.close_current_chunk();
        }
    }

    /// Reuse an already-existing child chunk unchanged, without decoding
    /// or re-serializing it. Only valid exactly at a chunk boundary.
    pub fn skip(&mut self, reused_child: MetaTuple<K>) {
        debug_assert!(self.buffer.is_empty(), "skip is only valid at a clean chunk boundary");
        self.hand_up(reused_child);
    }

    fn close_current_chunk(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let local_key = (self.local_key_of)(&self.buffer);
        let num_leaves = (self.num_leaves_of)(&self.buffer);
        let bytes = (self.encode)(&self.buffer);
        let chunk = Chunk::new(bytes, self.height, self.kind);
        self.buffer.clear();
        let tuple = MetaTuple { child_ref: chunk.r#ref(), index_key: local_key, num_leaves };
        self.emitted.push(chunk);
        self.hand_up(tuple);
    }

    fn hand_up(&mut self, tuple: MetaTuple<K>) {
        if let Some(parent) = self.parent.as_mut() {
            parent.append(tuple);
            return;
        }
        match self.pending_first.take() {
            None => self.pending_first = Some(tuple),
            Some(first) => {
                self.ensure_parent();
                let parent = self.parent.as_mut().expect("just created");
                parent.append(first);
                parent.append(tuple);
            }
        }
    }

    fn ensure_parent(&mut self) {
        if self.parent.is_none() {
            self.parent = Some(Box::new(Chunker::<'a, MetaTuple<K>, K>::new_meta(self.height + 1, self.kind)));
        }
    }

    /// Splice any untouched old-tree siblings back in, flush the last
    /// (possibly undersized) chunk, and resolve the tree's new root ref.
    pub fn done(&mut self) -> Ref {
        if let Some(mut remaining) = self.remaining_old.take() {
            while let Some(tuple) = remaining.next_sibling() {
                self.skip(tuple);
            }
        }
        self.close_current_chunk();
        self.finish()
    }

    fn finish(&mut self) -> Ref {
        match self.parent.take() {
            None => self.pending_first.take().expect("chunker produced no chunks").child_ref,
            Some(mut parent) => {
                if let Some(first) = self.pending_first.take() {
                    parent.append(first);
                }
                parent.done()
            }
        }
    }

    /// Every chunk this level (and, transitively, its parents) produced,
    /// for the caller to persist through a [`crate::store::ChunkStore`].
    pub fn into_emitted_chunks(mut self) -> Vec<Chunk> {
        let mut all = std::mem::take(&mut self.emitted);
        if let Some(parent) = self.parent.take() {
            all.extend(parent.into_emitted_chunks());
        }
        all
    }
}

impl<'a, K: MetaValue> Chunker<'a, MetaTuple<K>, K> {
    fn new_meta(height: u32, kind: ValueKind) -> Self {
        let local_key_of: LocalKeyFn<MetaTuple<K>, K> = Rc::new(|buf: &[MetaTuple<K>]| {
            let locals: Vec<K> = buf.iter().map(|t| t.index_key.clone()).collect();
            K::aggregate(&locals).1
        });
        let num_leaves_of: NumLeavesFn<MetaTuple<K>> = Rc::new(|buf: &[MetaTuple<K>]| buf.iter().map(|t| t.num_leaves).sum());
        let encode: EncodeFn<MetaTuple<K>> = Rc::new(|buf: &[MetaTuple<K>]| {
            let locals: Vec<K> = buf.iter().map(|t| t.index_key.clone()).collect();
            let (stored, _) = K::aggregate(&locals);
            let tuples: Vec<MetaTuple<K>> = buf
                .iter()
                .zip(stored)
                .map(|(t, key)| MetaTuple { child_ref: t.child_ref, index_key: key, num_leaves: t.num_leaves })
                .collect();
            let seq = MetaSequence::new(tuples);
            bitcode::serialize(&seq).expect("MetaSequence always encodes").into()
        });
        let boundary: Box<dyn BoundaryChecker<MetaTuple<K>>> =
            Box::new(RollingHashBoundary::new(META_WINDOW, crate::seq::boundary::OBJECT_PATTERN, |t: &MetaTuple<K>| {
                t.child_ref.hash[0]
            }));
        Self::new_leaf(boundary, local_key_of, num_leaves_of, encode, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::boundary::{RollingHashBoundary, LIST_WINDOW, OBJECT_PATTERN};

    fn byte_chunker() -> Chunker<'static, u8, u64> {
        let boundary: Box<dyn BoundaryChecker<u8>> =
            Box::new(RollingHashBoundary::new(LIST_WINDOW, OBJECT_PATTERN, |b: &u8| *b));
        let local_key_of: LocalKeyFn<u8, u64> = Rc::new(|buf: &[u8]| buf.len() as u64);
        let num_leaves_of: NumLeavesFn<u8> = Rc::new(|buf: &[u8]| buf.len() as u64);
        let encode: EncodeFn<u8> = Rc::new(|buf: &[u8]| Bytes::copy_from_slice(buf));
        Chunker::new_leaf(boundary, local_key_of, num_leaves_of, encode, ValueKind::Blob)
    }

    #[test]
    fn single_undersized_chunk_collapses_to_its_own_root() {
        let mut c = byte_chunker();
        for b in b"hello world" {
            c.append(*b);
        }
        let root = c.done();
        assert!(root.is_leaf());
    }

    #[test]
    fn many_chunks_build_a_meta_level_whose_root_is_not_a_leaf() {
        let mut c = byte_chunker();
        let mut bytes = vec![0u8; 20_000];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        for b in &bytes {
            c.append(*b);
        }
        let root = c.done();
        assert!(!root.is_leaf(), "20000 varied bytes should chunk into more than one leaf");
    }

    #[test]
    fn deterministic_regardless_of_batch_size() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 2654435761) as u8).collect();

        let mut whole = byte_chunker();
        for b in &data {
            whole.append(*b);
        }
        let whole_root = whole.done();

        let mut piecewise = byte_chunker();
        for chunk in data.chunks(37) {
            for b in chunk {
                piecewise.append(*b);
            }
        }
        let piecewise_root = piecewise.done();

        assert_eq!(whole_root, piecewise_root);
    }
}
