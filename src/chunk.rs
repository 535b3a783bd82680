//! Opaque, immutable chunk bytes and the write-side hint set.

use std::collections::HashSet;

use bytes::Bytes;

use crate::hash::{Ref, ValueKind};

/// An opaque, immutable byte slice whose identity equals the hash of its
/// bytes. Decoding a chunk into a [`crate::value::Value`] is outside this
/// module's concern (see `value::decode_chunk`); this type only carries
/// the bytes plus the ref they were written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub r#ref: Ref,
}

impl Chunk {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, height: u32, kind: ValueKind) -> Self {
        let data = data.into();
        let r#ref = Ref::of_bytes(&data, height, kind);
        Self { data, r#ref }
    }

    #[must_use]
    pub fn r#ref(&self) -> Ref {
        self.r#ref
    }
}

/// An opaque set of refs the caller promises are reachable from
/// forthcoming writes, used to prime [`crate::sink::ValidatingBatchingSink::prepare`].
pub type Hints = HashSet<Ref>;
