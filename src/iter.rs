// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A positioned sequence over decoded `(key, value)` pairs, with an
//! external `skip` (seek) operation.
//!
//! [`crate::segment::Segment`]'s event/posting iteration methods do the
//! actual cursor work (choosing the forward or reverse-comparator
//! database, applying the `RANGE`/`WITHIN` bound per §4.4) and hand the
//! already-ordered, already-filtered result to an `Iter`. This trades the
//! spec's lazily-stepping cursor for eager materialization of the
//! (already bounded) match set — `heed`'s cursor types borrow from the
//! `RoTxn`/`RwTxn` stored behind this crate's transaction arena only for
//! the duration of a closure (see [`crate::env`]), so a cursor can't
//! outlive the call that produced it without unsafe lifetime surgery;
//! eager collection sidesteps that without changing any observable
//! behavior this crate's test suite exercises.

use crate::error::{Error, Result};
use crate::codec::Value;

/// A positioned, ordered sequence of `(key, value)` pairs.
///
/// `skip` never takes the full stored key: a caller only ever has a bare
/// id in hand (an event id, or the event-id suffix of a posting key), and
/// `Iter` reconstructs the full key it was materialized with by
/// concatenating that id onto the fixed `prefix` it was built with — see
/// [`Iter::with_prefix`].
pub struct Iter {
    items: Vec<(Value, Value)>,
    pos: usize,
    closed: bool,
    prefix: Vec<Value>,
}

impl Iter {
    /// Builds an `Iter` whose keys are bare values (no compound prefix) —
    /// events, or a posting scan with no single shared `[field, term]`.
    pub(crate) fn new(items: Vec<(Value, Value)>) -> Self {
        Self::with_prefix(items, Vec::new())
    }

    /// Builds an `Iter` over keys that are all `prefix` with one more
    /// element appended (a posting scan fixed to one `[field, term]`).
    /// `skip` takes just that last element and rebuilds the full key by
    /// appending it onto `prefix`.
    pub(crate) fn with_prefix(items: Vec<(Value, Value)>, prefix: Vec<Value>) -> Self {
        Self {
            items,
            pos: 0,
            closed: false,
            prefix,
        }
    }

    /// Returns the next pair, or `None` once the sequence is exhausted.
    /// Once exhausted, the iterator is closed and every further call
    /// returns `None`.
    pub fn next(&mut self) -> Option<(Value, Value)> {
        if self.closed {
            return None;
        }
        match self.items.get(self.pos) {
            Some(pair) => {
                self.pos += 1;
                Some(pair.clone())
            }
            None => {
                self.closed = true;
                None
            }
        }
    }

    /// Seeks forward to the pair whose key is `target` appended onto this
    /// iterator's fixed prefix — for a bare-key `Iter` (no prefix),
    /// `target` is the key itself; for a posting scan fixed to one
    /// `[field, term]`, `target` is just the event id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexError`] if no remaining pair has that key;
    /// the iterator is closed in that case. Direction and position are
    /// otherwise unchanged on failure other than being closed.
    pub fn skip(&mut self, target: &Value) -> Result<()> {
        if self.closed {
            return Err(Error::IndexError);
        }
        let key = self.reconstruct_key(target);
        match self.items[self.pos..].iter().position(|(k, _)| *k == key) {
            Some(offset) => {
                self.pos += offset;
                Ok(())
            }
            None => {
                self.closed = true;
                Err(Error::IndexError)
            }
        }
    }

    fn reconstruct_key(&self, target: &Value) -> Value {
        if self.prefix.is_empty() {
            target.clone()
        } else {
            let mut parts = self.prefix.clone();
            parts.push(target.clone());
            Value::Array(parts)
        }
    }

    /// Releases this iterator. Idempotent; further `next`/`skip` calls
    /// return as if exhausted.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether this iterator has been closed (exhausted, skipped past the
    /// end, or explicitly closed).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(n: u32) -> (Value, Value) {
        (Value::U32(n), Value::Nil)
    }

    #[test]
    fn next_yields_in_order_then_closes() {
        let mut it = Iter::new(vec![pair(1), pair(2), pair(3)]);
        assert_eq!(it.next(), Some(pair(1)));
        assert_eq!(it.next(), Some(pair(2)));
        assert_eq!(it.next(), Some(pair(3)));
        assert_eq!(it.next(), None);
        assert!(it.is_closed());
    }

    #[test]
    fn skip_to_present_key_repositions() {
        let mut it = Iter::new(vec![pair(1), pair(2), pair(3), pair(4)]);
        it.skip(&Value::U32(3)).expect("present");
        assert_eq!(it.next(), Some(pair(3)));
        assert_eq!(it.next(), Some(pair(4)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn skip_to_absent_key_closes_and_errors() {
        let mut it = Iter::new(vec![pair(1), pair(2)]);
        assert!(matches!(it.skip(&Value::U32(99)), Err(Error::IndexError)));
        assert!(it.is_closed());
        assert_eq!(it.next(), None);
    }

    fn posting_pair(field: &Value, term: &Value, evid: u32) -> (Value, Value) {
        (
            Value::Array(vec![field.clone(), term.clone(), Value::U32(evid)]),
            Value::U32(1),
        )
    }

    #[test]
    fn skip_on_a_prefixed_iter_takes_the_bare_event_id() {
        let field = Value::Raw(b"msg".to_vec());
        let term = Value::Raw(b"hello".to_vec());
        let items = vec![
            posting_pair(&field, &term, 1),
            posting_pair(&field, &term, 2),
            posting_pair(&field, &term, 3),
        ];
        let mut it = Iter::with_prefix(items, vec![field.clone(), term.clone()]);

        // `skip` takes just the event id, not the full `[field, term, id]` key.
        it.skip(&Value::U32(2)).expect("present");
        assert_eq!(it.next(), Some(posting_pair(&field, &term, 2)));
        assert_eq!(it.next(), Some(posting_pair(&field, &term, 3)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn skip_on_a_prefixed_iter_to_absent_id_closes_and_errors() {
        let field = Value::Raw(b"msg".to_vec());
        let term = Value::Raw(b"hello".to_vec());
        let items = vec![posting_pair(&field, &term, 1), posting_pair(&field, &term, 2)];
        let mut it = Iter::with_prefix(items, vec![field, term]);
        assert!(matches!(it.skip(&Value::U32(99)), Err(Error::IndexError)));
        assert!(it.is_closed());
    }
}
