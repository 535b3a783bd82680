//! The minimal tagged value needed to drive kind dispatch in the
//! value-level diff (C7). Encoding/decoding to bytes, a full type
//! descriptor system and primitive-value semantics are treated as external
//! collaborators by `spec.md`; this is the smallest representation that
//! still lets the structural core (chunking, cursors, diffing) operate on
//! something concrete.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hash::{hash, Ref, ValueKind};

/// A struct value: a small, fixed, field-ordered record. Unlike
/// Blob/List/Set/Map, structs are not chunked into a prolly tree (they are
/// assumed small), but they still participate in the ordered value-diff
/// the same way Map does (spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StructValue {
    pub name: String,
    pub fields: BTreeMap<String, Value>,
}

/// A tagged value. Collection variants (`Blob`/`List`/`Set`/`Map`) hold the
/// ref of their root chunk; whether that chunk is a materialized leaf or a
/// meta-sequence is an internal detail resolved on demand through a
/// [`crate::store::ValueReader`] — callers never need to know which.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Ref),
    List(Ref),
    Set(Ref),
    Map(Ref),
    Struct(StructValue),
    Ref(Ref),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Blob(_) => ValueKind::Blob,
            Self::List(_) => ValueKind::List,
            Self::Set(_) => ValueKind::Set,
            Self::Map(_) => ValueKind::Map,
            Self::Struct(_) => ValueKind::Struct,
            Self::Ref(_) => ValueKind::Ref,
        }
    }

    /// The ref a collection value already carries, if any.
    #[must_use]
    pub fn as_collection_ref(&self) -> Option<Ref> {
        match self {
            Self::Blob(r) | Self::List(r) | Self::Set(r) | Self::Map(r) | Self::Ref(r) => Some(*r),
            Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Struct(_) => None,
        }
    }

    /// A content digest for this value: for collection/ref kinds this is
    /// just the already-known ref's hash (content addressing means it
    /// already uniquely identifies the value); for primitives/structs it
    /// is the hash of a canonical encoding. Used as the per-item digest
    /// fed into list-leaf boundary checkers (spec.md §4.1/§4.5) and as the
    /// value's own identity for equality.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        if let Some(r) = self.as_collection_ref() {
            return r.hash;
        }
        let encoded = bitcode::serialize(self).expect("Value always encodes");
        *hash(&encoded).as_bytes()
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Bool(_) => 0,
                Value::Int(_) => 1,
                Value::Float(_) => 2,
                Value::Str(_) => 3,
                Value::Blob(_) => 4,
                Value::List(_) => 5,
                Value::Set(_) => 6,
                Value::Map(_) => 7,
                Value::Struct(_) => 8,
                Value::Ref(_) => 9,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b))
            | (Value::List(a), Value::List(b))
            | (Value::Set(a), Value::Set(b))
            | (Value::Map(a), Value::Map(b))
            | (Value::Ref(a), Value::Ref(b)) => a.cmp(b),
            (Value::Struct(a), Value::Struct(b)) => (&a.name, &a.fields).cmp(&(&b.name, &b.fields)),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn equal_collections_share_digest() {
        let r = Ref::of_bytes(b"abc", 0, ValueKind::List);
        let v1 = Value::List(r);
        let v2 = Value::List(r);
        assert_eq!(v1.digest(), v2.digest());
        assert_eq!(v1, v2);
    }

    #[test]
    fn primitives_order_before_collections() {
        let a = Value::Int(5);
        let b = Value::List(Ref::of_bytes(b"x", 0, ValueKind::List));
        assert_eq!(a.cmp(&b), Ordering::Less);
    }

    #[test]
    fn cross_kind_ordering_is_antisymmetric() {
        // A blob and a list/set/map of unrelated content must not compare
        // by ref bytes one way and by kind rank the other: that would break
        // the total order a sorted Map/Set key space relies on.
        let blob = Value::Blob(Ref::of_bytes(b"z", 0, ValueKind::Blob));
        let list = Value::List(Ref::of_bytes(b"a", 0, ValueKind::List));
        assert_eq!(blob.cmp(&list), list.cmp(&blob).reverse());
    }
}
