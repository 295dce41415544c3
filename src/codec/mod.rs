// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The self-describing value codec and its byte-order comparator.
//!
//! [`Value`] is the single universe every public get/set in this crate
//! speaks. [`dump`] turns one (or more, concatenated) values into bytes;
//! [`load`] parses them back; [`compare`] compares two encoded buffers
//! without fully materializing either side, and is installed as the
//! key-comparator ([`comparator::ValueComparator`]) for every `heed`
//! database this crate opens.
//!
//! Composite keys — e.g. a posting key `[field, term, event_id]` — are
//! produced with [`dump_seq`], which concatenates each value's encoding
//! rather than wrapping them in an `Array` tag. This is what lets a
//! two-element prefix `dump_seq(&[field, term])` be a literal byte-prefix
//! of the three-element `dump_seq(&[field, term, event_id])`, which the
//! `RANGE` iterator mode (see [`crate::iter`]) depends on.

mod comparator;
mod tag;
mod value;

pub use comparator::{ReverseValueComparator, ValueComparator};
pub use value::Value;

use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::io::Cursor;
use tag::Tag;

/// The result of [`load`]: a single value if the buffer held exactly one,
/// otherwise the ordered list of values the buffer concatenated.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// The buffer held exactly one value.
    One(Value),
    /// The buffer concatenated more than one value.
    Many(Vec<Value>),
}

impl Loaded {
    /// Returns the single value, wrapping a multi-value buffer in
    /// [`Value::Array`]. Convenient when a caller knows the buffer is
    /// logically one composite value but doesn't care which form `load`
    /// picked.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::One(v) => v,
            Self::Many(vs) => Value::Array(vs),
        }
    }

    /// Returns the list of values, wrapping a single value in a
    /// one-element vec.
    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(vs) => vs,
        }
    }
}

/// Encodes a single value to its self-describing byte form.
///
/// # Errors
///
/// Returns [`Error::UnsupportedType`] if `value` (or anything nested inside
/// an `Array`/`Map`) falls outside the codec's value universe — in
/// practice this can't happen for the variants [`Value`] actually has, but
/// the signature is fallible so the codec can grow constrained variants
/// later without a breaking API change.
pub fn dump(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf)?;
    Ok(buf)
}

/// Encodes a sequence of values as a concatenation of their individual
/// encodings (not wrapped in an `Array` tag). Used for composite keys
/// where a prefix of the sequence must be a byte-prefix of the whole.
pub fn dump_seq(values: &[Value]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for value in values {
        encode_value(value, &mut buf)?;
    }
    Ok(buf)
}

/// Parses a buffer of one or more concatenated values.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if `buf` is empty, truncated mid-value, or
/// contains a tag byte outside the codec's value universe.
pub fn load(buf: &[u8]) -> Result<Loaded> {
    if buf.is_empty() {
        return Err(Error::Malformed("empty buffer".into()));
    }
    let mut cursor = Cursor::new(buf);
    let mut values = Vec::new();
    while (cursor.position() as usize) < buf.len() {
        values.push(decode_value(&mut cursor)?);
    }
    if values.len() == 1 {
        Ok(Loaded::One(values.into_iter().next().expect("len checked")))
    } else {
        Ok(Loaded::Many(values))
    }
}

/// Compares two encoded buffers element-by-element, per §4.1: advance both
/// streams one value at a time; whichever buffer runs out first is
/// *less*; otherwise compare tag rank, then payload.
///
/// Never fails: malformed input decodes as if it were absent, so a
/// corrupt comparator input can't panic the embedded store's B-tree.
#[must_use]
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    let mut ca = Cursor::new(a);
    let mut cb = Cursor::new(b);

    loop {
        let a_done = (ca.position() as usize) >= a.len();
        let b_done = (cb.position() as usize) >= b.len();

        match (a_done, b_done) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        let va = match decode_value(&mut ca) {
            Ok(v) => v,
            Err(_) => return Ordering::Equal,
        };
        let vb = match decode_value(&mut cb) {
            Ok(v) => v,
            Err(_) => return Ordering::Equal,
        };

        match compare_values(&va, &vb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    let ta = a.tag();
    let tb = b.tag();
    match ta.cmp(&tb) {
        Ordering::Equal => {}
        other => return other,
    }

    match (a, b) {
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (Value::Bool(_), Value::Bool(_)) => Ordering::Equal, // tag already encodes truth value
        (Value::U32(x), Value::U32(y)) => x.cmp(y),
        (Value::I32(x), Value::I32(y)) => x.cmp(y),
        (Value::U64(x), Value::U64(y)) => x.cmp(y),
        (Value::I64(x), Value::I64(y)) => x.cmp(y),
        (Value::F64(x), Value::F64(y)) => sortable_f64(*x).cmp(&sortable_f64(*y)),
        (Value::Raw(x), Value::Raw(y)) => x.as_slice().cmp(y.as_slice()),
        (Value::Array(x), Value::Array(y)) => compare_value_seq(x, y),
        (Value::Map(x), Value::Map(y)) => {
            let flat_x: Vec<&Value> = x.iter().flat_map(|(k, v)| [k, v]).collect();
            let flat_y: Vec<&Value> = y.iter().flat_map(|(k, v)| [k, v]).collect();
            compare_value_ref_seq(&flat_x, &flat_y)
        }
        // Unreachable: tag equality above guarantees matching variants.
        _ => Ordering::Equal,
    }
}

fn compare_value_seq(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare_values(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn compare_value_ref_seq(a: &[&Value], b: &[&Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare_values(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Maps an f64's bits onto a `u64` whose unsigned order matches the
/// float's numeric order (standard IEEE-754 sort-key transform: flip the
/// sign bit for positive numbers, flip every bit for negative ones).
fn sortable_f64(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Nil => out.write_u8(Tag::Nil as u8)?,
        Value::Bool(false) => out.write_u8(Tag::False as u8)?,
        Value::Bool(true) => out.write_u8(Tag::True as u8)?,
        Value::I64(v) => {
            out.write_u8(Tag::I64 as u8)?;
            out.write_i64::<BigEndian>(*v)?;
        }
        Value::I32(v) => {
            out.write_u8(Tag::I32 as u8)?;
            out.write_i32::<BigEndian>(*v)?;
        }
        Value::U32(v) => {
            out.write_u8(Tag::U32 as u8)?;
            out.write_u32::<BigEndian>(*v)?;
        }
        Value::U64(v) => {
            out.write_u8(Tag::U64 as u8)?;
            out.write_u64::<BigEndian>(*v)?;
        }
        Value::F64(v) => {
            out.write_u8(Tag::F64 as u8)?;
            out.write_u64::<BigEndian>(sortable_f64(*v))?;
        }
        Value::Raw(bytes) => {
            out.write_u8(Tag::Raw as u8)?;
            let len: u32 = bytes
                .len()
                .try_into()
                .map_err(|_| Error::UnsupportedType)?;
            out.write_u32::<BigEndian>(len)?;
            out.extend_from_slice(bytes);
        }
        Value::Array(items) => {
            out.write_u8(Tag::Array as u8)?;
            let len: u32 = items.len().try_into().map_err(|_| Error::UnsupportedType)?;
            out.write_u32::<BigEndian>(len)?;
            for item in items {
                encode_value(item, out)?;
            }
        }
        Value::Map(pairs) => {
            out.write_u8(Tag::Map as u8)?;
            let len: u32 = pairs.len().try_into().map_err(|_| Error::UnsupportedType)?;
            out.write_u32::<BigEndian>(len)?;
            for (k, v) in pairs {
                encode_value(k, out)?;
                encode_value(v, out)?;
            }
        }
    }
    Ok(())
}

fn decode_value(cursor: &mut Cursor<&[u8]>) -> Result<Value> {
    let tag_byte = cursor
        .read_u8()
        .map_err(|_| Error::Malformed("truncated tag".into()))?;
    let tag = Tag::from_u8(tag_byte).ok_or_else(|| Error::Malformed(format!("bad tag {tag_byte}")))?;

    let value = match tag {
        Tag::Nil => Value::Nil,
        Tag::False => Value::Bool(false),
        Tag::True => Value::Bool(true),
        Tag::I64 => Value::I64(read_i64(cursor)?),
        Tag::I32 => Value::I32(read_i32(cursor)?),
        Tag::U32 => Value::U32(read_u32(cursor)?),
        Tag::U64 => Value::U64(read_u64(cursor)?),
        Tag::F64 => {
            let bits = read_u64(cursor)?;
            let unflipped = if bits & (1 << 63) != 0 {
                bits & !(1 << 63)
            } else {
                !bits
            };
            Value::F64(f64::from_bits(unflipped))
        }
        Tag::Raw => {
            let len = read_u32(cursor)? as usize;
            Value::Raw(read_bytes(cursor, len)?)
        }
        Tag::Array => {
            let len = read_u32(cursor)?;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(decode_value(cursor)?);
            }
            Value::Array(items)
        }
        Tag::Map => {
            let len = read_u32(cursor)?;
            let mut pairs = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let k = decode_value(cursor)?;
                let v = decode_value(cursor)?;
                pairs.push((k, v));
            }
            Value::Map(pairs)
        }
    };
    Ok(value)
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64> {
    cursor
        .read_i64::<BigEndian>()
        .map_err(|_| Error::Malformed("truncated i64".into()))
}

fn read_i32(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    cursor
        .read_i32::<BigEndian>()
        .map_err(|_| Error::Malformed("truncated i32".into()))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| Error::Malformed("truncated u32".into()))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor
        .read_u64::<BigEndian>()
        .map_err(|_| Error::Malformed("truncated u64".into()))
}

fn read_bytes(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .ok_or_else(|| Error::Malformed("raw length overflow".into()))?;
    let buf = cursor.get_ref();
    if end > buf.len() {
        return Err(Error::Malformed("truncated raw payload".into()));
    }
    let slice = buf[start..end].to_vec();
    cursor.set_position(end as u64);
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let bytes = dump(&v).expect("dump");
        let loaded = load(&bytes).expect("load");
        assert_eq!(Loaded::One(v), loaded);
    }

    #[test]
    fn roundtrips_every_scalar_kind() {
        roundtrip(Value::Nil);
        roundtrip(Value::Bool(false));
        roundtrip(Value::Bool(true));
        roundtrip(Value::U32(42));
        roundtrip(Value::I32(-42));
        roundtrip(Value::U64(u64::from(u32::MAX) + 1));
        roundtrip(Value::I64(i64::from(i32::MIN) - 1));
        roundtrip(Value::F64(3.25));
        roundtrip(Value::F64(-3.25));
        roundtrip(Value::Raw(b"hello".to_vec()));
        roundtrip(Value::Array(vec![Value::U32(1), Value::Raw(b"x".to_vec())]));
        roundtrip(Value::Map(vec![(
            Value::Raw(b"k".to_vec()),
            Value::U32(1),
        )]));
    }

    #[test]
    fn concatenation_round_trips_as_many() {
        let values = vec![Value::U32(1), Value::Raw(b"x".to_vec())];
        let bytes = dump_seq(&values).expect("dump_seq");
        assert_eq!(Loaded::Many(values), load(&bytes).expect("load"));
    }

    #[test]
    fn tag_rank_orders_across_kinds() {
        let nil = dump(&Value::Nil).unwrap();
        let f = dump(&Value::Bool(false)).unwrap();
        let t = dump(&Value::Bool(true)).unwrap();
        let num = dump(&Value::U32(0)).unwrap();
        let dbl = dump(&Value::F64(0.0)).unwrap();
        let raw = dump(&Value::Raw(vec![])).unwrap();
        let arr = dump(&Value::Array(vec![])).unwrap();
        let map = dump(&Value::Map(vec![])).unwrap();

        assert_eq!(compare(&nil, &f), Ordering::Less);
        assert_eq!(compare(&f, &t), Ordering::Less);
        assert_eq!(compare(&t, &num), Ordering::Less);
        assert_eq!(compare(&num, &dbl), Ordering::Less);
        assert_eq!(compare(&dbl, &raw), Ordering::Less);
        assert_eq!(compare(&raw, &arr), Ordering::Less);
        assert_eq!(compare(&arr, &map), Ordering::Less);
    }

    #[test]
    fn negative_and_positive_integers_compare_by_magnitude() {
        let very_negative = dump(&Value::I64(i64::from(i32::MIN) - 1)).unwrap();
        let mildly_negative = dump(&Value::I32(-1)).unwrap();
        let small_positive = dump(&Value::U32(0)).unwrap();
        let very_positive = dump(&Value::U64(u64::from(u32::MAX) + 1)).unwrap();

        assert_eq!(compare(&very_negative, &mildly_negative), Ordering::Less);
        assert_eq!(compare(&mildly_negative, &small_positive), Ordering::Less);
        assert_eq!(compare(&small_positive, &very_positive), Ordering::Less);
    }

    #[test]
    fn raw_prefix_sorts_before_longer_string() {
        let short = dump(&Value::Raw(b"ab".to_vec())).unwrap();
        let long = dump(&Value::Raw(b"abc".to_vec())).unwrap();
        assert_eq!(compare(&short, &long), Ordering::Less);
    }

    #[test]
    fn shorter_concatenation_is_prefix_and_sorts_first() {
        let prefix = dump_seq(&[Value::Raw(b"msg".to_vec()), Value::Raw(b"hello".to_vec())]).unwrap();
        let full = dump_seq(&[
            Value::Raw(b"msg".to_vec()),
            Value::Raw(b"hello".to_vec()),
            Value::U32(7),
        ])
        .unwrap();
        assert!(full.starts_with(&prefix));
        assert_eq!(compare(&prefix, &full), Ordering::Less);
    }

    #[test]
    fn malformed_input_reports_error_not_panic() {
        assert!(load(&[]).is_err());
        assert!(load(&[0xFF]).is_err());
        assert!(load(&[Tag::Raw as u8, 0, 0, 0, 10, 1, 2]).is_err());
    }

    #[test]
    fn compare_never_panics_on_malformed_input() {
        // Comparator contract: malformed input must not panic; it degrades
        // to "equal" rather than erroring, since the store has no error
        // channel for comparators.
        assert_eq!(compare(&[0xFF], &[0xFF]), Ordering::Equal);
    }
}
