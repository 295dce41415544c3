// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::tag::Tag;

/// A self-describing, comparator-compatible value.
///
/// `Value` is the only type that crosses this crate's public API as a key
/// or a value: every field, term, event id, and stored document value is
/// one of these variants. [`super::dump`] turns a `Value` into the byte
/// string actually stored in the embedded store, and that same byte
/// string sorts the way [`compare_values`](super::compare) orders the
/// `Value`s, because the comparator installed on every database is just
/// [`super::compare`].
///
/// Integers are always encoded with the smallest variant that holds them
/// losslessly: non-negative values that fit in a `u32` are `U32` even if
/// constructed from an `i64`, negative values that fit in an `i32` are
/// `I32`, and only magnitudes outside both ranges fall back to `U64`/`I64`.
/// This rule is what lets the tag order alone decide cross-variant integer
/// comparisons (see [`Tag`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absence of a value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A non-negative integer that doesn't fit in a `u32`.
    U64(u64),
    /// A negative integer more negative than `i32::MIN`.
    I64(i64),
    /// A non-negative integer that fits in a `u32`.
    U32(u32),
    /// A negative integer that fits in an `i32`.
    I32(i32),
    /// An IEEE-754 double.
    F64(f64),
    /// An opaque byte string (also used for UTF-8 text).
    Raw(Vec<u8>),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// An ordered sequence of key/value pairs; not required to be sorted
    /// or deduplicated by the caller, but [`super::compare`] treats it as
    /// a flattened sequence so two maps with the same pairs in the same
    /// order compare equal.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// The wire tag this value encodes under.
    pub(super) const fn tag(&self) -> Tag {
        match self {
            Self::Nil => Tag::Nil,
            Self::Bool(false) => Tag::False,
            Self::Bool(true) => Tag::True,
            Self::I64(_) => Tag::I64,
            Self::I32(_) => Tag::I32,
            Self::U32(_) => Tag::U32,
            Self::U64(_) => Tag::U64,
            Self::F64(_) => Tag::F64,
            Self::Raw(_) => Tag::Raw,
            Self::Array(_) => Tag::Array,
            Self::Map(_) => Tag::Map,
        }
    }

    /// Builds the canonical, smallest-lossless-type integer `Value` for
    /// `n`. Prefer this over constructing `U32`/`I32`/`U64`/`I64` directly
    /// so that two equal integers always encode identically regardless of
    /// the Rust integer type the caller happened to have on hand.
    #[must_use]
    pub fn from_i64(n: i64) -> Self {
        if let Ok(small) = u32::try_from(n) {
            Self::U32(small)
        } else if let Ok(small) = i32::try_from(n) {
            Self::I32(small)
        } else {
            Self::I64(n)
        }
    }

    /// Builds the canonical integer `Value` for a non-negative `n`.
    #[must_use]
    pub fn from_u64(n: u64) -> Self {
        if let Ok(small) = u32::try_from(n) {
            Self::U32(small)
        } else {
            Self::U64(n)
        }
    }

    /// Returns the `Raw` payload, if this is a `Raw` value.
    #[must_use]
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Self::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the `Array` elements, if this is an `Array` value.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Raw(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Raw(s.into_bytes())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::F64(f)
    }
}
