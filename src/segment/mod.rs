// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A segment: one immutable-ish unit of events, postings, and per-field
//! metadata within an [`crate::index::Index`].
//!
//! A segment owns five databases (`documents`, `postings` forward,
//! `postings` reverse, `terms`, and its own `metadata`) plus any number of
//! lazily-created per-field databases. The forward and reverse postings
//! databases hold byte-identical entries under two different comparators
//! ([`ValueComparator`] and [`ReverseValueComparator`]); scanning in
//! reverse means picking the reverse database and scanning it forward,
//! rather than reversing a cursor, per SPEC_FULL §4.6.

use crate::codec::{dump, dump_seq, load, Value, ValueComparator, ReverseValueComparator};
use crate::env::EnvInner;
use crate::error::{Error, Result};
use crate::iter::Iter;
use crate::log_pipe::{log_debug, log_info};
use crate::txn::{Txn, TxnFlags};
use heed::types::Bytes;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

type Db = heed::Database<Bytes, Bytes, ValueComparator>;
type RevDb = heed::Database<Bytes, Bytes, ReverseValueComparator>;

/// Arity of a full posting key `[field, term, event_id]`. A `start` bound
/// shorter than this is a prefix (`RANGE` mode), not a resume point
/// (`FROM` mode).
const POSTING_KEY_ARITY: usize = 3;

struct SegmentInner {
    env: Arc<EnvInner>,
    index_name: String,
    sid: u32,
    metadata: Db,
    documents: Db,
    postings_fwd: Db,
    postings_rev: RevDb,
    terms: Db,
    fields: Mutex<Arc<BTreeMap<String, Db>>>,
    deleted: AtomicBool,
}

/// A segment within an index.
///
/// Cheap to clone (an `Arc` around the shared databases); every clone
/// refers to the same underlying segment.
#[derive(Clone)]
pub struct Segment(Arc<SegmentInner>);

impl Segment {
    pub(crate) fn open(env: Arc<EnvInner>, txn: &mut Txn, index_name: &str, sid: u32) -> Result<Self> {
        let base = format!("{index_name}.{sid}");

        let metadata: Db = create_db(&env, txn, &format!("{base}.metadata"))?;
        let documents: Db = create_db(&env, txn, &format!("{base}.documents"))?;
        let postings_fwd: Db = create_db(&env, txn, &format!("{base}.postings"))?;
        let postings_rev: RevDb = create_rev_db(&env, txn, &format!("{base}.postings_rev"))?;
        let terms: Db = create_db(&env, txn, &format!("{base}.terms"))?;

        log_debug!(target: "ixstore::segment", "opened segment {base}");

        Ok(Self(Arc::new(SegmentInner {
            env,
            index_name: index_name.to_owned(),
            sid,
            metadata,
            documents,
            postings_fwd,
            postings_rev,
            terms,
            fields: Mutex::new(Arc::new(BTreeMap::new())),
            deleted: AtomicBool::new(false),
        })))
    }

    /// This segment's numeric id within its index.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0.sid
    }

    // ---- segment-local metadata -------------------------------------

    /// Reads an arbitrary segment-local metadata key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if `key` is absent.
    pub fn get_metadata(&self, txn: &Txn, key: &Value) -> Result<Value> {
        let key_bytes = dump(key)?;
        self.0.env.with_ro(txn.id(), |ro| {
            match self.0.metadata.get(ro, &key_bytes).map_err(Error::from)? {
                Some(bytes) => Ok(load(bytes)?.into_value()),
                None => Err(Error::KeyError),
            }
        })
    }

    /// Writes an arbitrary segment-local metadata key.
    pub fn set_metadata(&self, txn: &mut Txn, key: &Value, value: &Value) -> Result<()> {
        let key_bytes = dump(key)?;
        let value_bytes = dump(value)?;
        self.0.env.with_rw(txn.id(), |rw| {
            self.0
                .metadata
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)
        })
    }

    // ---- events -------------------------------------------------------

    /// Inserts a new event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocExists`] if `evid` is already present.
    pub fn new_event(&self, txn: &mut Txn, evid: &Value, body: &Value) -> Result<()> {
        let key_bytes = dump(evid)?;
        let value_bytes = dump(body)?;
        let inserted = self.0.env.with_rw(txn.id(), |rw| {
            if self.0.documents.get(rw, &key_bytes).map_err(Error::from)?.is_some() {
                return Ok(false);
            }
            self.0
                .documents
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)?;
            Ok(true)
        })?;
        if inserted {
            Ok(())
        } else {
            Err(Error::DocExists)
        }
    }

    /// Reads an event's body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if `evid` is absent.
    pub fn get_event(&self, txn: &Txn, evid: &Value) -> Result<Value> {
        let key_bytes = dump(evid)?;
        self.0.env.with_ro(txn.id(), |ro| {
            match self.0.documents.get(ro, &key_bytes).map_err(Error::from)? {
                Some(bytes) => Ok(load(bytes)?.into_value()),
                None => Err(Error::KeyError),
            }
        })
    }

    /// Returns whether `evid` is present.
    pub fn contains_event(&self, txn: &Txn, evid: &Value) -> Result<bool> {
        let key_bytes = dump(evid)?;
        self.0.env.with_ro(txn.id(), |ro| {
            Ok(self.0.documents.get(ro, &key_bytes).map_err(Error::from)?.is_some())
        })
    }

    /// Overwrites (or inserts) an event's body, unconditionally.
    pub fn set_event(&self, txn: &mut Txn, evid: &Value, body: &Value) -> Result<()> {
        let key_bytes = dump(evid)?;
        let value_bytes = dump(body)?;
        self.0.env.with_rw(txn.id(), |rw| {
            self.0
                .documents
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)
        })
    }

    /// Removes an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if `evid` was absent.
    pub fn delete_event(&self, txn: &mut Txn, evid: &Value) -> Result<()> {
        let key_bytes = dump(evid)?;
        let existed = self.0.env.with_rw(txn.id(), |rw| {
            self.0.documents.delete(rw, &key_bytes).map_err(Error::from)
        })?;
        if existed {
            Ok(())
        } else {
            Err(Error::KeyError)
        }
    }

    /// Estimates the fraction (in `[0.0, 1.0]`) of events whose id falls
    /// within `[start, end]` (bounds are swapped automatically if given in
    /// descending order).
    ///
    /// This counts matching keys directly rather than using a cheap
    /// logarithmic estimator (`heed`/LMDB doesn't expose one) — an
    /// O(n) approximation of the same quantity. Any failure (codec or
    /// store) resolves to `0.0` rather than propagating, matching the
    /// "a broken estimator still lets iteration proceed" resolution in
    /// DESIGN.md.
    pub fn estimate_events(&self, txn: &Txn, start: &Value, end: &Value) -> Result<f64> {
        Ok(self.try_estimate_events(txn, start, end).unwrap_or(0.0))
    }

    fn try_estimate_events(&self, txn: &Txn, start: &Value, end: &Value) -> Result<f64> {
        let start_bytes = dump(start)?;
        let end_bytes = dump(end)?;
        let (lo, hi) = if crate::codec::compare(&start_bytes, &end_bytes) == Ordering::Greater {
            (end_bytes, start_bytes)
        } else {
            (start_bytes, end_bytes)
        };
        self.0.env.with_ro(txn.id(), |ro| {
            let total = self.0.documents.len(ro).map_err(Error::from)?;
            if total == 0 {
                return Ok(0.0);
            }
            let in_range = self
                .0
                .documents
                .range(ro, &(lo.as_slice()..=hi.as_slice()))
                .map_err(Error::from)?
                .count();
            #[allow(clippy::cast_precision_loss)]
            Ok(in_range as f64 / total as f64)
        })
    }

    /// Iterates events within `[start, end]` in event-id order. Direction
    /// is inferred: if `start` sorts after `end`, the scan runs in
    /// reverse.
    pub fn iter_events(&self, txn: &Txn, start: &Value, end: &Value) -> Result<Iter> {
        let start_bytes = dump(start)?;
        let end_bytes = dump(end)?;
        let reverse = crate::codec::compare(&start_bytes, &end_bytes) == Ordering::Greater;
        let (lo, hi) = if reverse {
            (end_bytes, start_bytes)
        } else {
            (start_bytes, end_bytes)
        };

        let mut items = self.0.env.with_ro(txn.id(), |ro| {
            let mut items = Vec::new();
            for entry in self
                .0
                .documents
                .range(ro, &(lo.as_slice()..=hi.as_slice()))
                .map_err(Error::from)?
            {
                let (key_bytes, value_bytes) = entry.map_err(Error::from)?;
                items.push((load(key_bytes)?.into_value(), load(value_bytes)?.into_value()));
            }
            Ok(items)
        })?;
        if reverse {
            items.reverse();
        }
        Ok(Iter::new(items))
    }

    // ---- postings -------------------------------------------------------

    /// Inserts a new posting `[field, term, event_id] -> occurrences`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocExists`] if the posting already exists.
    pub fn new_posting(
        &self,
        txn: &mut Txn,
        field: &Value,
        term: &Value,
        evid: &Value,
        occurrences: &Value,
    ) -> Result<()> {
        let key_bytes = dump_seq(&[field.clone(), term.clone(), evid.clone()])?;
        let value_bytes = dump(occurrences)?;
        let inserted = self.0.env.with_rw(txn.id(), |rw| {
            if self
                .0
                .postings_fwd
                .get(rw, &key_bytes)
                .map_err(Error::from)?
                .is_some()
            {
                return Ok(false);
            }
            self.0
                .postings_fwd
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)?;
            self.0
                .postings_rev
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)?;
            Ok(true)
        })?;
        if inserted {
            Ok(())
        } else {
            Err(Error::DocExists)
        }
    }

    /// Reads a posting's occurrence count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if the posting is absent.
    pub fn get_posting(&self, txn: &Txn, field: &Value, term: &Value, evid: &Value) -> Result<Value> {
        let key_bytes = dump_seq(&[field.clone(), term.clone(), evid.clone()])?;
        self.0.env.with_ro(txn.id(), |ro| {
            match self.0.postings_fwd.get(ro, &key_bytes).map_err(Error::from)? {
                Some(bytes) => Ok(load(bytes)?.into_value()),
                None => Err(Error::KeyError),
            }
        })
    }

    /// Overwrites (or inserts) a posting's occurrence count.
    pub fn set_posting(
        &self,
        txn: &mut Txn,
        field: &Value,
        term: &Value,
        evid: &Value,
        occurrences: &Value,
    ) -> Result<()> {
        let key_bytes = dump_seq(&[field.clone(), term.clone(), evid.clone()])?;
        let value_bytes = dump(occurrences)?;
        self.0.env.with_rw(txn.id(), |rw| {
            self.0
                .postings_fwd
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)?;
            self.0
                .postings_rev
                .put(rw, &key_bytes, &value_bytes)
                .map_err(Error::from)
        })
    }

    /// Removes a posting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if it was absent.
    pub fn delete_posting(&self, txn: &mut Txn, field: &Value, term: &Value, evid: &Value) -> Result<()> {
        let key_bytes = dump_seq(&[field.clone(), term.clone(), evid.clone()])?;
        let existed = self.0.env.with_rw(txn.id(), |rw| {
            let existed = self.0.postings_fwd.delete(rw, &key_bytes).map_err(Error::from)?;
            self.0.postings_rev.delete(rw, &key_bytes).map_err(Error::from)?;
            Ok(existed)
        })?;
        if existed {
            Ok(())
        } else {
            Err(Error::KeyError)
        }
    }

    /// Iterates postings per SPEC_FULL §4.6's four bound patterns:
    ///
    /// - both `start`/`end` absent: every posting, in `reverse`'s direction.
    /// - `start` only, shorter than a full `[field, term, event_id]` key:
    ///   `RANGE` — every posting whose key has `start` as a byte-prefix.
    /// - `start` only, full arity: `FROM` — resume scanning at `start`.
    /// - `end` only: `UNTIL` — `FROM(end)` run in reverse.
    /// - both present: `WITHIN` the closed range (bound order is swapped
    ///   automatically when `reverse` is set, since the reverse database's
    ///   own order visits the larger bound first).
    ///
    /// `reverse` always picks which physical database (forward- or
    /// reverse-comparator) is scanned; both hold byte-identical entries.
    pub fn iter_postings(
        &self,
        txn: &Txn,
        start: Option<&[Value]>,
        end: Option<&[Value]>,
        reverse: bool,
    ) -> Result<Iter> {
        if let (Some(prefix), None) = (start, end) {
            if prefix.len() < POSTING_KEY_ARITY {
                return self.iter_postings_prefix(txn, prefix, reverse);
            }
        }

        let start_bytes = start.map(dump_seq).transpose()?;
        let end_bytes = end.map(dump_seq).transpose()?;

        // A bound at full `[field, term, event_id]` arity fixes every
        // matched key to the same `[field, term]` prefix, which lets
        // `Iter::skip` take a bare event id instead of the full key (see
        // `Iter::with_prefix`). `ALL` mode (no bounds) has no such common
        // prefix.
        let skip_prefix = match (start, end) {
            (Some(anchor), _) | (_, Some(anchor)) if anchor.len() == POSTING_KEY_ARITY => {
                anchor[..POSTING_KEY_ARITY - 1].to_vec()
            }
            _ => Vec::new(),
        };

        let items = self.0.env.with_ro(txn.id(), |ro| {
            let mut items = Vec::new();
            match (&start_bytes, &end_bytes) {
                (None, None) => {
                    if reverse {
                        for entry in self.0.postings_rev.iter(ro).map_err(Error::from)? {
                            push_pair(entry, &mut items)?;
                        }
                    } else {
                        for entry in self.0.postings_fwd.iter(ro).map_err(Error::from)? {
                            push_pair(entry, &mut items)?;
                        }
                    }
                }
                (Some(anchor), None) | (None, Some(anchor)) => {
                    if reverse {
                        for entry in self
                            .0
                            .postings_rev
                            .range(ro, &(anchor.as_slice()..))
                            .map_err(Error::from)?
                        {
                            push_pair(entry, &mut items)?;
                        }
                    } else {
                        for entry in self
                            .0
                            .postings_fwd
                            .range(ro, &(anchor.as_slice()..))
                            .map_err(Error::from)?
                        {
                            push_pair(entry, &mut items)?;
                        }
                    }
                }
                (Some(s), Some(e)) => {
                    let (lo, hi) = if reverse { (e, s) } else { (s, e) };
                    if reverse {
                        for entry in self
                            .0
                            .postings_rev
                            .range(ro, &(lo.as_slice()..=hi.as_slice()))
                            .map_err(Error::from)?
                        {
                            push_pair(entry, &mut items)?;
                        }
                    } else {
                        for entry in self
                            .0
                            .postings_fwd
                            .range(ro, &(lo.as_slice()..=hi.as_slice()))
                            .map_err(Error::from)?
                        {
                            push_pair(entry, &mut items)?;
                        }
                    }
                }
            }
            Ok(items)
        })?;

        Ok(Iter::with_prefix(items, skip_prefix))
    }

    fn iter_postings_prefix(&self, txn: &Txn, prefix: &[Value], reverse: bool) -> Result<Iter> {
        let prefix_bytes = dump_seq(prefix)?;
        let items = self.0.env.with_ro(txn.id(), |ro| {
            let mut items = Vec::new();
            if reverse {
                for entry in self
                    .0
                    .postings_rev
                    .range(ro, &(prefix_bytes.as_slice()..))
                    .map_err(Error::from)?
                {
                    let (key_bytes, value_bytes) = entry.map_err(Error::from)?;
                    if !key_bytes.starts_with(prefix_bytes.as_slice()) {
                        break;
                    }
                    items.push((load(key_bytes)?.into_value(), load(value_bytes)?.into_value()));
                }
            } else {
                for entry in self
                    .0
                    .postings_fwd
                    .range(ro, &(prefix_bytes.as_slice()..))
                    .map_err(Error::from)?
                {
                    let (key_bytes, value_bytes) = entry.map_err(Error::from)?;
                    if !key_bytes.starts_with(prefix_bytes.as_slice()) {
                        break;
                    }
                    items.push((load(key_bytes)?.into_value(), load(value_bytes)?.into_value()));
                }
            }
            Ok(items)
        })?;
        Ok(Iter::with_prefix(items, prefix.to_vec()))
    }

    // ---- term statistics ------------------------------------------------

    /// Reads a `[field, term]` compound key's aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if absent.
    pub fn get_term_stats(&self, txn: &Txn, field: &Value, term: &Value) -> Result<Value> {
        let key_bytes = dump_seq(&[field.clone(), term.clone()])?;
        self.0.env.with_ro(txn.id(), |ro| {
            match self.0.terms.get(ro, &key_bytes).map_err(Error::from)? {
                Some(bytes) => Ok(load(bytes)?.into_value()),
                None => Err(Error::KeyError),
            }
        })
    }

    /// Writes a `[field, term]` compound key's aggregate statistics.
    pub fn set_term_stats(&self, txn: &mut Txn, field: &Value, term: &Value, stats: &Value) -> Result<()> {
        let key_bytes = dump_seq(&[field.clone(), term.clone()])?;
        let value_bytes = dump(stats)?;
        self.0.env.with_rw(txn.id(), |rw| {
            self.0.terms.put(rw, &key_bytes, &value_bytes).map_err(Error::from)
        })
    }

    // ---- per-field metadata ---------------------------------------------

    /// Reads a field's segment-local metadata (stored under the
    /// single-byte key `\0` in that field's own lazily-created database).
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyError`] if the field has no metadata recorded.
    pub fn get_field_metadata(&self, txn: &mut Txn, field: &str) -> Result<Value> {
        let db = self.field_db(txn, field)?;
        self.0.env.with_ro(txn.id(), |ro| {
            match db.get(ro, &[0u8]).map_err(Error::from)? {
                Some(bytes) => Ok(load(bytes)?.into_value()),
                None => Err(Error::KeyError),
            }
        })
    }

    /// Writes a field's segment-local metadata.
    pub fn set_field_metadata(&self, txn: &mut Txn, field: &str, value: &Value) -> Result<()> {
        let db = self.field_db(txn, field)?;
        let value_bytes = dump(value)?;
        self.0.env.with_rw(txn.id(), |rw| db.put(rw, &[0u8], &value_bytes).map_err(Error::from))
    }

    fn field_db(&self, txn: &mut Txn, field: &str) -> Result<Db> {
        {
            let cache = self.0.fields.lock().expect("field cache poisoned");
            if let Some(db) = cache.get(field) {
                return Ok(*db);
            }
        }
        let db_name = format!("{}.{}.field.{field}", self.0.index_name, self.0.sid);
        let db: Db = create_db(&self.0.env, txn, &db_name)?;

        let mut cache = self.0.fields.lock().expect("field cache poisoned");
        // Re-check: another thread may have created it first while we
        // didn't hold the lock (the database creation itself is safe to
        // repeat, `heed` returns the existing handle).
        if let Some(db) = cache.get(field) {
            return Ok(*db);
        }
        let mut next = (**cache).clone();
        next.insert(field.to_owned(), db);
        *cache = Arc::new(next);
        Ok(db)
    }

    // ---- deletion lifecycle ----------------------------------------------

    /// Soft-marks this segment for deletion. Does not touch any database;
    /// [`Segment::close`] performs the actual removal.
    pub fn delete(&self) {
        self.0.deleted.store(true, AtomicOrdering::SeqCst);
    }

    /// Whether [`Segment::delete`] has been called.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.0.deleted.load(AtomicOrdering::SeqCst)
    }

    /// Releases this segment. If it was marked deleted, clears every
    /// database it owns (the single-shared-environment design means
    /// "file removal" becomes "empty the segment's named databases" —
    /// `heed` doesn't expose dropping a named database slot from a live
    /// environment through its safe API). A no-op otherwise.
    pub fn close(&self) -> Result<()> {
        if !self.is_deleted() {
            return Ok(());
        }
        let mut txn = self.0.env.begin(None, TxnFlags::empty())?;
        let names = self.database_names();
        self.0.env.with_rw(txn.id(), |rw| {
            for name in &names {
                if let Some(db) = self
                    .0
                    .env
                    .heed_env()
                    .open_database::<Bytes, Bytes>(rw, Some(name))
                    .map_err(Error::from)?
                {
                    db.clear(rw).map_err(Error::from)?;
                }
            }
            Ok(())
        })?;
        txn.commit()?;
        log_info!(
            target: "ixstore::segment",
            "segment {}.{} cleared", self.0.index_name, self.0.sid
        );
        Ok(())
    }

    fn database_names(&self) -> Vec<String> {
        let base = format!("{}.{}", self.0.index_name, self.0.sid);
        let mut names = vec![
            format!("{base}.metadata"),
            format!("{base}.documents"),
            format!("{base}.postings"),
            format!("{base}.postings_rev"),
            format!("{base}.terms"),
        ];
        let fields = self.0.fields.lock().expect("field cache poisoned");
        for field in fields.keys() {
            names.push(format!("{base}.field.{field}"));
        }
        names
    }
}

fn push_pair(
    entry: heed::Result<(&[u8], &[u8])>,
    items: &mut Vec<(Value, Value)>,
) -> Result<()> {
    let (key_bytes, value_bytes) = entry.map_err(Error::from)?;
    items.push((load(key_bytes)?.into_value(), load(value_bytes)?.into_value()));
    Ok(())
}

fn create_db(env: &Arc<EnvInner>, txn: &mut Txn, name: &str) -> Result<Db> {
    env.with_rw(txn.id(), |rw| {
        env.heed_env().create_database(rw, Some(name)).map_err(Error::from)
    })
}

fn create_rev_db(env: &Arc<EnvInner>, txn: &mut Txn, name: &str) -> Result<RevDb> {
    env.with_rw(txn.id(), |rw| {
        env.heed_env().create_database(rw, Some(name)).map_err(Error::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Env, Options};
    use tempfile::tempdir;

    fn open_env() -> (tempfile::TempDir, Env) {
        let dir = tempdir().expect("tempdir");
        let env_dir = dir.path().join("env");
        let data_dir = dir.path().join("data");
        let tmp_dir = dir.path().join("tmp");
        let env = Env::open(&env_dir, &data_dir, &tmp_dir, Options::default()).expect("open env");
        (dir, env)
    }

    #[test]
    fn event_round_trip() {
        let (_dir, env) = open_env();
        let mut txn = env.begin(None, TxnFlags::empty()).expect("begin");
        let index = env.open_index(&mut txn, "logs").expect("open index");
        let sid = index.new_segment(&mut txn).expect("new segment");
        let segment = index.open_segment(&mut txn, sid).expect("open segment");

        let evid = Value::U32(1);
        let body = Value::Raw(b"hello".to_vec());
        segment.new_event(&mut txn, &evid, &body).expect("new event");
        assert!(matches!(
            segment.new_event(&mut txn, &evid, &body),
            Err(Error::DocExists)
        ));
        assert!(segment.contains_event(&txn, &evid).expect("contains"));
        assert_eq!(segment.get_event(&txn, &evid).expect("get"), body);
        txn.commit().expect("commit");
    }

    #[test]
    fn posting_prefix_iteration_matches_shared_prefix_only() {
        let (_dir, env) = open_env();
        let mut txn = env.begin(None, TxnFlags::empty()).expect("begin");
        let index = env.open_index(&mut txn, "logs").expect("open index");
        let sid = index.new_segment(&mut txn).expect("new segment");
        let segment = index.open_segment(&mut txn, sid).expect("open segment");

        let field = Value::Raw(b"msg".to_vec());
        let hello = Value::Raw(b"hello".to_vec());
        let help = Value::Raw(b"help".to_vec());

        segment
            .new_posting(&mut txn, &field, &hello, &Value::U32(1), &Value::U32(1))
            .expect("posting 1");
        segment
            .new_posting(&mut txn, &field, &hello, &Value::U32(2), &Value::U32(1))
            .expect("posting 2");
        segment
            .new_posting(&mut txn, &field, &help, &Value::U32(3), &Value::U32(1))
            .expect("posting 3");

        let mut it = segment
            .iter_postings(&txn, Some(&[field.clone(), hello.clone()]), None, false)
            .expect("iter_postings");

        let (k1, _) = it.next().expect("first match");
        let (k2, _) = it.next().expect("second match");
        assert!(it.next().is_none());

        assert_eq!(k1, Value::Array(vec![field.clone(), hello.clone(), Value::U32(1)]));
        assert_eq!(k2, Value::Array(vec![field, hello, Value::U32(2)]));

        txn.commit().expect("commit");
    }

    #[test]
    fn posting_iter_skip_takes_a_bare_event_id() {
        let (_dir, env) = open_env();
        let mut txn = env.begin(None, TxnFlags::empty()).expect("begin");
        let index = env.open_index(&mut txn, "logs").expect("open index");
        let sid = index.new_segment(&mut txn).expect("new segment");
        let segment = index.open_segment(&mut txn, sid).expect("open segment");

        let field = Value::Raw(b"msg".to_vec());
        let hello = Value::Raw(b"hello".to_vec());

        for evid in 1..=3u32 {
            segment
                .new_posting(&mut txn, &field, &hello, &Value::U32(evid), &Value::U32(1))
                .expect("new posting");
        }

        let mut it = segment
            .iter_postings(&txn, Some(&[field.clone(), hello.clone()]), None, false)
            .expect("iter_postings");

        // `skip` takes just the event id (2), not the full `[field, term, 2]` key.
        it.skip(&Value::U32(2)).expect("present");
        let (key, _) = it.next().expect("resumed match");
        assert_eq!(key, Value::Array(vec![field.clone(), hello.clone(), Value::U32(2)]));
        let (key, _) = it.next().expect("final match");
        assert_eq!(key, Value::Array(vec![field, hello, Value::U32(3)]));
        assert!(it.next().is_none());

        txn.commit().expect("commit");
    }

    #[test]
    fn delete_then_close_clears_documents() {
        let (_dir, env) = open_env();
        let mut txn = env.begin(None, TxnFlags::empty()).expect("begin");
        let index = env.open_index(&mut txn, "logs").expect("open index");
        let sid = index.new_segment(&mut txn).expect("new segment");
        let segment = index.open_segment(&mut txn, sid).expect("open segment");
        segment
            .new_event(&mut txn, &Value::U32(1), &Value::Nil)
            .expect("new event");
        txn.commit().expect("commit");

        segment.delete();
        segment.close().expect("close");

        let txn = env.begin(None, TxnFlags::empty()).expect("begin");
        assert!(!segment.contains_event(&txn, &Value::U32(1)).expect("contains"));
    }
}
