//! Cursor-driven incremental edits: C2 (`cursor`) and C4 (`chunker`)
//! wired together into the actual mutating operations spec.md §4.4.7
//! describes (`cursor-at(i); Skip(); Append(v); Done()`), instead of a
//! materialize-and-rebuild shortcut.
//!
//! Every edit below follows the same shape: `seek` a [`MetaCursor`] chain
//! down to the tuple covering the edit position, `resume` a fresh
//! [`Chunker`] with the window of items preceding the edit plus whatever
//! of the open chunk survives, replay the edit itself (`advance` past
//! removed items, `append` inserted ones), then `resume_from` the
//! untouched remainder of the original tree before `done`.

use std::rc::Rc;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::hash::Ref;
use crate::seq::chunker::{Chunker, CursorSiblings};
use crate::seq::cursor::{Cursor, MetaCursor, MetaReloadFn};
use crate::seq::meta::{MetaSequence, MetaTuple, MetaValue, OrderedKey};
use crate::seq::LeafCursor;
use crate::store::{decode_meta, require, ChunkStore};
use crate::value::Value;

fn leaf_reload<'a, Item: Clone + 'a>(
    store: &'a dyn ChunkStore,
    decode: impl Fn(&Chunk) -> Result<Vec<Item>> + 'a,
) -> Rc<dyn Fn(&Ref) -> Vec<Item> + 'a> {
    Rc::new(move |r: &Ref| {
        let chunk = require(store, r, r).expect("reachable child chunk missing from store");
        decode(&chunk).expect("chunk failed to decode")
    })
}

fn meta_reload<'a, K>(store: &'a dyn ChunkStore) -> MetaReloadFn<'a, K>
where
    K: Clone + serde::de::DeserializeOwned,
{
    Rc::new(move |r: &Ref| {
        let chunk = require(store, r, r).expect("reachable meta chunk missing from store");
        decode_meta::<K>(&chunk).expect("meta chunk failed to decode")
    })
}

/// Build the `MetaCursor` chain from the tree root down to the meta level
/// whose tuples point directly at leaf chunks, ready for `seek`.
///
/// Every level but the root is seeded with a placeholder tuple: `seek`
/// always reloads a non-root level's node fresh from its parent's
/// just-searched position before doing its own binary search, so the
/// placeholder is never actually read.
fn bottom_meta_cursor<'a, K: Clone>(root: Ref, read_meta: &MetaReloadFn<'a, K>) -> MetaCursor<'a, K> {
    let root_meta = read_meta(&root);
    let placeholder = root_meta.tuples()[0].clone();
    let mut cursor = MetaCursor::new_root(root_meta, Rc::clone(read_meta));
    let mut remaining = root.height;
    while remaining > 1 {
        cursor = MetaCursor::new_child(Box::new(cursor), MetaSequence::new(vec![placeholder.clone()]), 0, Rc::clone(read_meta));
        remaining -= 1;
    }
    cursor
}

/// Shared core of every cursor-driven edit: given a `MetaCursor` already
/// positioned (via `seek`) on the tuple whose child chunk contains the
/// edit, and the local index inside that chunk the edit starts at, remove
/// `remove_count` items, insert `insert_items`, and hand the remainder of
/// the tree back to `chunker` to splice in unchanged.
fn apply_edit_at_leaf<'a, Item, K>(
    store: &'a dyn ChunkStore,
    meta_cursor: MetaCursor<'a, K>,
    local_idx: usize,
    remove_count: u64,
    insert_items: Vec<Item>,
    window_size: usize,
    decode_items: impl Fn(&Chunk) -> Result<Vec<Item>> + Clone + 'a,
    chunker: &mut Chunker<'a, Item, K>,
) -> Result<()>
where
    Item: Clone + 'a,
    K: MetaValue,
{
    let leaf_ref = meta_cursor.current().expect("seek positions on a tuple").child_ref;
    let leaf_chunk = require(store, &leaf_ref, &leaf_ref)?;
    let leaf_items = decode_items(&leaf_chunk)?;
    let local_idx = local_idx.min(leaf_items.len());

    let leaf_reload_fn = leaf_reload(store, decode_items);
    let mut leaf_cursor: LeafCursor<'a, Item, K> = Cursor::new_child(meta_cursor, leaf_items, local_idx as isize, leaf_reload_fn);

    let idx_in_chunk = leaf_cursor.index_in_chunk().max(0) as usize;
    let window_needed = idx_in_chunk + window_size;
    let mut prior_window = leaf_cursor.max_n_prev_items(window_needed);
    let split_at = prior_window.len().saturating_sub(idx_in_chunk);
    let open_chunk_so_far = prior_window.split_off(split_at);
    chunker.resume(&prior_window, &open_chunk_so_far);

    let mut removed = 0u64;
    while removed < remove_count {
        if !leaf_cursor.advance() {
            break;
        }
        removed += 1;
    }

    for item in insert_items {
        chunker.append(item);
    }

    let remaining = leaf_cursor.remaining_in_current_chunk();
    if remaining > 0 {
        if leaf_cursor.index_in_chunk() != 0 {
            let survivors = leaf_cursor.max_n_next_items(remaining);
            for item in survivors {
                chunker.append(item);
            }
            let mut parent = leaf_cursor.parent().cloned().expect("non-leaf root always has a meta parent");
            parent.advance();
            chunker.resume_from(Box::new(CursorSiblings::new(parent)));
        } else {
            let parent = leaf_cursor.parent().cloned().expect("non-leaf root always has a meta parent");
            chunker.resume_from(Box::new(CursorSiblings::new(parent)));
        }
    }
    Ok(())
}

/// Splice an indexed tree (List/Blob, `K = u64`): replace `remove_count`
/// items starting at `at` with `insert_items`.
pub fn splice_indexed<'a, Item: Clone + 'a>(
    root: Ref,
    store: &'a dyn ChunkStore,
    at: u64,
    remove_count: u64,
    insert_items: Vec<Item>,
    window_size: usize,
    decode_items: impl Fn(&Chunk) -> Result<Vec<Item>> + Clone + 'a,
    mut new_chunker: impl FnMut() -> Chunker<'a, Item, u64>,
) -> Result<(Ref, Vec<Chunk>)> {
    if root.is_leaf() {
        let chunk = require(store, &root, &root)?;
        let mut items = decode_items(&chunk)?;
        let start = (at as usize).min(items.len());
        let end = (start + remove_count as usize).min(items.len());
        items.splice(start..end, insert_items);
        let mut chunker = new_chunker();
        for item in items {
            chunker.append(item);
        }
        let new_root = chunker.done();
        return Ok((new_root, chunker.into_emitted_chunks()));
    }

    let read_meta: MetaReloadFn<'a, u64> = meta_reload(store);
    let mut meta_cursor = bottom_meta_cursor::<u64>(root, &read_meta);

    let compare = |target: &u64, t: &MetaTuple<u64>| *target < t.index_key;
    let step = |target: &u64, prev: Option<&MetaTuple<u64>>, _cur: &MetaTuple<u64>| target - prev.map_or(0, |p| p.index_key);
    let local = meta_cursor.seek(&read_meta, &compare, &step, at);

    let mut chunker = new_chunker();
    apply_edit_at_leaf(store, meta_cursor, local as usize, remove_count, insert_items, window_size, decode_items, &mut chunker)?;
    let new_root = chunker.done();
    Ok((new_root, chunker.into_emitted_chunks()))
}

/// Insert or remove a keyed item in an ordered tree (Map/Set, `K =
/// OrderedKey<Value>`). `new_item` present means insert-or-overwrite;
/// `new_item` absent means remove. Returns `None` when the edit is a true
/// no-op (removing an absent key).
pub fn ordered_edit<'a, Item: Clone + 'a>(
    root: Ref,
    store: &'a dyn ChunkStore,
    target: &Value,
    new_item: Option<Item>,
    window_size: usize,
    key_of: impl Fn(&Item) -> &Value + Clone + 'a,
    decode_items: impl Fn(&Chunk) -> Result<Vec<Item>> + Clone + 'a,
    mut new_chunker: impl FnMut() -> Chunker<'a, Item, OrderedKey<Value>>,
) -> Result<Option<(Ref, Vec<Chunk>)>> {
    if root.is_leaf() {
        let chunk = require(store, &root, &root)?;
        let mut items = decode_items(&chunk)?;
        let idx = items.partition_point(|it| key_of(it) < target);
        let present = idx < items.len() && key_of(&items[idx]) == target;
        if !present && new_item.is_none() {
            return Ok(None);
        }
        let remove = usize::from(present);
        items.splice(idx..idx + remove, new_item);
        let mut chunker = new_chunker();
        for item in items {
            chunker.append(item);
        }
        let new_root = chunker.done();
        return Ok(Some((new_root, chunker.into_emitted_chunks())));
    }

    let read_meta: MetaReloadFn<'a, OrderedKey<Value>> = meta_reload(store);
    let mut meta_cursor = bottom_meta_cursor::<OrderedKey<Value>>(root, &read_meta);

    let compare = |carry: &Value, t: &MetaTuple<OrderedKey<Value>>| *carry <= t.index_key.0;
    let step = |carry: &Value, _prev: Option<&MetaTuple<OrderedKey<Value>>>, _cur: &MetaTuple<OrderedKey<Value>>| carry.clone();
    meta_cursor.seek(&read_meta, &compare, &step, target.clone());

    let leaf_ref = meta_cursor.current().expect("seek positions on a tuple").child_ref;
    let leaf_chunk = require(store, &leaf_ref, &leaf_ref)?;
    let leaf_items = decode_items(&leaf_chunk)?;
    let idx = leaf_items.partition_point(|it| key_of(it) < target);
    let present = idx < leaf_items.len() && key_of(&leaf_items[idx]) == target;
    if !present && new_item.is_none() {
        return Ok(None);
    }
    let remove_count = u64::from(present);
    let insert_items: Vec<Item> = new_item.into_iter().collect();

    let mut chunker = new_chunker();
    apply_edit_at_leaf(store, meta_cursor, idx, remove_count, insert_items, window_size, decode_items, &mut chunker)?;
    let new_root = chunker.done();
    Ok(Some((new_root, chunker.into_emitted_chunks())))
}
