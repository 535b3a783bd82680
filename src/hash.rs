//! Content hashing and the `Ref` identity used throughout the tree.

use std::fmt;

use blake3::{Hash, Hasher};
use serde::{Deserialize, Serialize};

pub fn merge_hashes(left: &Hash, right: &Hash) -> Hash {
    let mut combined_hashes = left.as_bytes().to_vec();
    combined_hashes.extend(right.as_bytes());
    blake3::hash(&combined_hashes)
}

/// Hashing function. Uses BLAKE3 but without Subtree-freeness
pub fn hash(input_data: &[u8]) -> Hash {
    let chunk_len = blake3::guts::CHUNK_LEN;
    let num_chunks = (input_data.len() + chunk_len - 1) / chunk_len;
    let mut chunk_hashes = Vec::new();

    for i in 0..num_chunks {
        let chunk_start = i * chunk_len;
        let chunk_end = usize::min(chunk_start + chunk_len, input_data.len());
        let chunk = &input_data[chunk_start..chunk_end];

        let mut chunk_hasher = Hasher::new();
        chunk_hasher.update(chunk);
        chunk_hashes.push(chunk_hasher.finalize());
    }

    if chunk_hashes.is_empty() {
        return blake3::hash(&[]);
    }

    while chunk_hashes.len() > 1 {
        let mut parent_hashes = Vec::new();
        for pair in chunk_hashes.chunks(2) {
            let parent_hash = if pair.len() == 2 {
                merge_hashes(&pair[0], &pair[1])
            } else {
                pair[0]
            };
            parent_hashes.push(parent_hash);
        }
        chunk_hashes = parent_hashes;
    }

    chunk_hashes[0]
}

/// The kind of value a [`Ref`] ultimately points at. Doubles as the
/// "target-type tag" mentioned in the glossary, and as the dispatch key
/// used by the value-level diff (C7) to decide whether to descend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    Blob,
    List,
    Set,
    Map,
    Struct,
    Ref,
}

impl ValueKind {
    #[must_use]
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Float | Self::Str)
    }

    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Blob | Self::List | Self::Set | Self::Map)
    }
}

/// A content hash identifying a chunk, plus the height of the subtree it
/// roots (0 for leaves, `1 + max(children heights)` for metas) and the
/// kind of value it ultimately decodes to.
///
/// Two refs compare by hash bytes, lexicographically, as required by
/// `ChunksDiff`'s within-height merge step; `height` is used separately as
/// the heap key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    pub hash: [u8; 32],
    pub height: u32,
    pub kind: ValueKind,
}

impl Ref {
    #[must_use]
    pub fn new(hash: Hash, height: u32, kind: ValueKind) -> Self {
        Self { hash: *hash.as_bytes(), height, kind }
    }

    #[must_use]
    pub fn of_bytes(bytes: &[u8], height: u32, kind: ValueKind) -> Self {
        Self::new(hash(bytes), height, kind)
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }
}

impl PartialOrd for Ref {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ref {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.hash[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "…@h{}", self.height)
    }
}
