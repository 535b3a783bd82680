//! The generic prolly-tree sequence engine: boundary detection (C1), the
//! meta-sequence model (C3), the bidirectional cursor (C2) and the
//! incremental chunker (C4). Concrete trees (list/map/set/blob) in
//! `crate::list` etc. instantiate these with their own item/key types.

pub mod boundary;
pub mod chunker;
pub mod cursor;
pub mod meta;

pub mod edit;

use cursor::Cursor;

/// A cursor over materialized leaf items, one level below the lowest
/// `MetaCursor`.
pub type LeafCursor<'a, Item, K> = Cursor<'a, Item, cursor::MetaCursor<'a, K>>;

/// A cursor over a tree with no meta levels at all: a single leaf chunk.
pub type RootLeafCursor<'a, Item> = Cursor<'a, Item, ()>;
