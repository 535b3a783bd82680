//! C2 — the bidirectional sequence cursor.
//!
//! One generic `Cursor<Item, Parent>` implements the contract in
//! spec.md §4.2 for both tree levels that actually exist: a leaf-level
//! cursor over materialized items (`Item` = list/blob/map/set item,
//! `Parent` = [`MetaCursor`]), and the recursive meta-level cursor over
//! `MetaTuple`s (`Item` = `MetaTuple<K>`, `Parent` = `Box<MetaCursor<K>>`).
//! Grounded in `types/sequence_cursor.go`.

use std::rc::Rc;

use crate::hash::Ref;
use crate::seq::meta::{MetaSequence, MetaTuple};

/// What a cursor needs from the level directly above it: the ref of the
/// child it currently straddles (used to reload the level below after
/// crossing a sibling boundary), plus the ability to step.
pub trait ParentCursor: Clone {
    fn current_child_ref(&self) -> Option<Ref>;
    fn advance(&mut self) -> bool;
    fn retreat(&mut self) -> bool;
}

impl ParentCursor for () {
    fn current_child_ref(&self) -> Option<Ref> {
        None
    }
    fn advance(&mut self) -> bool {
        false
    }
    fn retreat(&mut self) -> bool {
        false
    }
}

impl<T: ParentCursor> ParentCursor for Box<T> {
    fn current_child_ref(&self) -> Option<Ref> {
        (**self).current_child_ref()
    }
    fn advance(&mut self) -> bool {
        (**self).advance()
    }
    fn retreat(&mut self) -> bool {
        (**self).retreat()
    }
}

pub type ReloadFn<'a, Item> = Rc<dyn Fn(&Ref) -> Vec<Item> + 'a>;

/// A position inside an item sequence at one tree level, with a parent
/// link one level up (or none at the root). Allowed `idx` values are
/// `-1..=len` (spec.md §4.2): `-1` and `len` are the "phantom" before-start
/// / past-end positions.
pub struct Cursor<'a, Item, P> {
    parent: Option<P>,
    node: Vec<Item>,
    idx: isize,
    reload: ReloadFn<'a, Item>,
}

impl<'a, Item: Clone, P: ParentCursor> Clone for Cursor<'a, Item, P> {
    fn clone(&self) -> Self {
        Self {
            parent: self.parent.clone(),
            node: self.node.clone(),
            idx: self.idx,
            reload: Rc::clone(&self.reload),
        }
    }
}

impl<'a, Item: Clone, P: ParentCursor> Cursor<'a, Item, P> {
    #[must_use]
    pub fn new_root(node: Vec<Item>, reload: ReloadFn<'a, Item>) -> Self {
        Self { parent: None, node, idx: 0, reload }
    }

    #[must_use]
    pub fn new_child(parent: P, node: Vec<Item>, idx: isize, reload: ReloadFn<'a, Item>) -> Self {
        Self { parent: Some(parent), node, idx, reload }
    }

    /// The parent cursor one level up, if any — used by edit sites that
    /// need to hand the position at the end of an edit to
    /// [`crate::seq::chunker::CursorSiblings`] for tail replay.
    #[must_use]
    pub fn parent(&self) -> Option<&P> {
        self.parent.as_ref()
    }

    fn length(&self) -> isize {
        self.node.len() as isize
    }

    /// How many items remain in the currently-loaded chunk at and after
    /// the cursor, without crossing into a sibling. `0` once the cursor has
    /// stepped past the last item of the whole sequence.
    #[must_use]
    pub fn remaining_in_current_chunk(&self) -> usize {
        if self.idx < 0 {
            return 0;
        }
        (self.length() - self.idx).max(0) as usize
    }

    #[must_use]
    pub fn current(&self) -> Option<&Item> {
        if self.idx < -1 || self.idx > self.length() {
            panic!("cursor index {} out of [-1, {}] range", self.idx, self.length());
        }
        if self.idx == -1 || self.idx == self.length() {
            None
        } else {
            Some(&self.node[self.idx as usize])
        }
    }

    #[must_use]
    pub fn maybe_current(&self) -> Option<&Item> {
        self.current()
    }

    #[must_use]
    pub fn prev_in_chunk(&self) -> Option<&Item> {
        if self.idx > 0 {
            Some(&self.node[(self.idx - 1) as usize])
        } else {
            None
        }
    }

    #[must_use]
    pub fn index_in_chunk(&self) -> isize {
        self.idx
    }

    pub fn current_child_ref(&self) -> Option<Ref>
    where
        Item: AsChildRef,
    {
        self.current().map(AsChildRef::as_child_ref)
    }

    /// Step one item forward. Returns `false` and leaves the cursor in the
    /// phantom "past end" state if already there.
    pub fn advance(&mut self) -> bool {
        if self.idx < self.length() {
            self.idx += 1;
            if self.idx == 0 {
                // Stepped from "before start" to a valid position: the
                // parent was pointing before its own start too, and must
                // catch up now.
                if let Some(parent) = self.parent.as_mut() {
                    parent.advance();
                }
            }
            if self.idx < self.length() {
                return true;
            }
        }
        if let Some(parent) = self.parent.as_mut() {
            if parent.advance() {
                let child_ref = parent.current_child_ref().expect("advance succeeded");
                self.node = (self.reload)(&child_ref);
                self.idx = 0;
                return true;
            }
        }
        false
    }

    /// Step one item backward. Symmetric to [`Cursor::advance`].
    pub fn retreat(&mut self) -> bool {
        if self.idx >= 0 {
            self.idx -= 1;
            if let Some(parent) = self.parent.as_mut() {
                if self.idx == self.length() - 1 {
                    parent.retreat();
                }
            }
            if self.idx >= 0 {
                return true;
            }
        }
        if let Some(parent) = self.parent.as_mut() {
            if parent.retreat() {
                let child_ref = parent.current_child_ref().expect("retreat succeeded");
                self.node = (self.reload)(&child_ref);
                self.idx = self.length() - 1;
                return true;
            }
        }
        false
    }

    /// Up to `n` items strictly before the cursor, oldest first.
    #[must_use]
    pub fn max_n_prev_items(&self, n: usize) -> Vec<Item> {
        let mut retreater = self.clone();
        let mut prev = Vec::with_capacity(n);
        for _ in 0..n {
            if !retreater.retreat() {
                break;
            }
            prev.push(retreater.current().cloned_item());
        }
        prev.reverse();
        prev
    }

    /// Up to `n` items at-and-after the cursor, including the current one.
    #[must_use]
    pub fn max_n_next_items(&self, n: usize) -> Vec<Item> {
        let mut next = Vec::with_capacity(n);
        if n == 0 {
            return next;
        }
        let Some(first) = self.current() else { return next };
        next.push(first.clone());

        let mut advancer = self.clone();
        for _ in 1..n {
            if !advancer.advance() {
                return next;
            }
            next.push(advancer.current().cloned_item());
        }
        next
    }
}

/// Small helper so `max_n_prev_items`/`max_n_next_items` can assert the
/// cursor landed on a real item without repeating the unwrap message.
trait OptionItemExt<Item> {
    fn cloned_item(self) -> Item;
}

impl<Item: Clone> OptionItemExt<Item> for Option<&Item> {
    fn cloned_item(self) -> Item {
        self.expect("cursor stepped but has no current item").clone()
    }
}

/// Projects a sequence item onto the ref used to fetch its child content
/// on reload, i.e. only meaningful for `MetaTuple<K>` items.
pub trait AsChildRef {
    fn as_child_ref(&self) -> Ref;
}

impl<K> AsChildRef for MetaTuple<K> {
    fn as_child_ref(&self) -> Ref {
        self.child_ref
    }
}

/// The recursive meta-level cursor: a cursor over `MetaTuple<K>` entries
/// whose own parent (if any) is another `MetaCursor<K>`.
pub struct MetaCursor<'a, K> {
    inner: Cursor<'a, MetaTuple<K>, Box<MetaCursor<'a, K>>>,
}

impl<'a, K: Clone> Clone for MetaCursor<'a, K> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<'a, K: Clone> ParentCursor for MetaCursor<'a, K> {
    fn current_child_ref(&self) -> Option<Ref> {
        self.inner.current().map(MetaTuple::as_child_ref)
    }
    fn advance(&mut self) -> bool {
        self.inner.advance()
    }
    fn retreat(&mut self) -> bool {
        self.inner.retreat()
    }
}

/// Reads a meta-sequence chunk by ref, producing its flattened tuple list.
pub type MetaReloadFn<'a, K> = Rc<dyn Fn(&Ref) -> MetaSequence<K> + 'a>;

impl<'a, K: Clone> MetaCursor<'a, K> {
    #[must_use]
    pub fn new_root(node: MetaSequence<K>, read_meta: MetaReloadFn<'a, K>) -> Self {
        let reload: ReloadFn<'a, MetaTuple<K>> = {
            let read_meta = Rc::clone(&read_meta);
            Rc::new(move |r: &Ref| read_meta(r).tuples().to_vec())
        };
        Self { inner: Cursor::new_root(node.tuples().to_vec(), reload) }
    }

    #[must_use]
    pub fn new_child(
        parent: Box<MetaCursor<'a, K>>,
        node: MetaSequence<K>,
        idx: isize,
        read_meta: MetaReloadFn<'a, K>,
    ) -> Self {
        let reload: ReloadFn<'a, MetaTuple<K>> = {
            let read_meta = Rc::clone(&read_meta);
            Rc::new(move |r: &Ref| read_meta(r).tuples().to_vec())
        };
        Self { inner: Cursor::new_child(parent, node.tuples().to_vec(), idx, reload) }
    }

    #[must_use]
    pub fn current(&self) -> Option<&MetaTuple<K>> {
        self.inner.current()
    }

    #[must_use]
    pub fn index_in_chunk(&self) -> isize {
        self.inner.index_in_chunk()
    }

    #[must_use]
    pub fn max_n_prev_items(&self, n: usize) -> Vec<MetaTuple<K>> {
        self.inner.max_n_prev_items(n)
    }

    #[must_use]
    pub fn max_n_next_items(&self, n: usize) -> Vec<MetaTuple<K>> {
        self.inner.max_n_next_items(n)
    }

    pub fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    pub fn retreat(&mut self) -> bool {
        self.inner.retreat()
    }

    /// Descend the whole chain from the root down to this cursor's level,
    /// binary-searching each level in turn (spec.md §4.2 `seek`).
    ///
    /// `compare(&carry, item)` must be monotonic: false, false, ..., true,
    /// true. `step(&carry, prev, cur)` reduces the carry forward as the
    /// search descends one level. If the search lands past the last tuple,
    /// the cursor clamps to the last tuple (still addressable by the
    /// parent's index key).
    pub fn seek<Carry, Cmp, Step>(&mut self, read_meta: &MetaReloadFn<'a, K>, compare: &Cmp, step: &Step, carry: Carry) -> Carry
    where
        Carry: Clone,
        Cmp: Fn(&Carry, &MetaTuple<K>) -> bool,
        Step: Fn(&Carry, Option<&MetaTuple<K>>, &MetaTuple<K>) -> Carry,
    {
        let mut carry = carry;
        if let Some(mut parent) = self.inner.parent.take() {
            carry = parent.seek(read_meta, compare, step, carry);
            let parent_ref = parent.current_child_ref().expect("seek positions parent on a tuple");
            let node = read_meta(&parent_ref);
            let reload = Rc::clone(&self.inner.reload);
            self.inner = Cursor::new_child(parent, node.tuples().to_vec(), 0, reload);
        }

        let idx = {
            let tuples = self.inner.node_slice();
            let mut idx = tuples.partition_point(|t| !compare(&carry, t));
            if idx == tuples.len() {
                idx = tuples.len() - 1;
            }
            idx
        };
        self.inner.set_idx(idx as isize);

        let tuples = self.inner.node_slice();
        let prev = if idx > 0 { Some(&tuples[idx - 1]) } else { None };
        step(&carry, prev, &tuples[idx])
    }
}

impl<'a, Item: Clone, P: ParentCursor> Cursor<'a, Item, P> {
    fn node_slice(&self) -> &[Item] {
        &self.node
    }
    fn set_idx(&mut self, idx: isize) {
        self.idx = idx;
    }
}
