//! C1 — the rolling-boundary checker.
//!
//! `spec.md`'s rolling-hash primitive is an external collaborator, but a
//! concrete, deterministic implementation is needed to make chunking
//! testable. This is a classic cyclic-polynomial ("buzhash") rolling hash
//! over the last `window_size` item digests, grounded in
//! `meta_sequence.go`'s `buzHashBoundaryChecker` (window/pattern constants
//! per spec.md §4.1: avg chunk fan-out ~64).

use std::collections::VecDeque;
use std::sync::OnceLock;

/// Average fan-out of 64: low 6 bits of the rolling hash must match.
pub const OBJECT_PATTERN: u32 = (1 << 6) - 1;

pub const LIST_WINDOW: usize = 64;
pub const META_WINDOW: usize = 8;
pub const ORDERED_LEAF_WINDOW: usize = 8;

/// Decide, over a sliding window of item digests, where a chunk ends.
pub trait BoundaryChecker<Item> {
    /// Returns `true` iff the sequence should chunk immediately after `item`.
    fn write(&mut self, item: &Item) -> bool;

    /// Minimum number of items that must be replayed before resuming a
    /// chunking sequence mid-tree (spec.md §4.4.2/§4.4.6).
    fn window_size(&self) -> usize;
}

fn buzhash_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        for slot in &mut table {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            *slot = ((state >> 32) as u32) | 1;
        }
        table
    })
}

/// A boundary checker parametric over any item type via a caller-supplied
/// single-byte digest projection, per spec.md's design note: "Model with a
/// small capability record passed into the constructor rather than global
/// registration."
pub struct RollingHashBoundary<Item> {
    window: usize,
    pattern: u32,
    buf: VecDeque<u8>,
    state: u32,
    digest_of: fn(&Item) -> u8,
}

impl<Item> RollingHashBoundary<Item> {
    #[must_use]
    pub fn new(window: usize, pattern: u32, digest_of: fn(&Item) -> u8) -> Self {
        Self { window, pattern, buf: VecDeque::with_capacity(window), state: 0, digest_of }
    }
}

impl<Item> BoundaryChecker<Item> for RollingHashBoundary<Item> {
    fn write(&mut self, item: &Item) -> bool {
        let table = buzhash_table();
        let incoming = (self.digest_of)(item);

        if self.buf.len() == self.window {
            let outgoing = self.buf.pop_front().expect("buffer at capacity");
            let evicted = table[outgoing as usize].rotate_left((self.window % 32) as u32);
            self.state = self.state.rotate_left(1) ^ table[incoming as usize] ^ evicted;
        } else {
            self.state = self.state.rotate_left(1) ^ table[incoming as usize];
        }
        self.buf.push_back(incoming);

        self.state & self.pattern == self.pattern
    }

    fn window_size(&self) -> usize {
        self.window
    }
}
