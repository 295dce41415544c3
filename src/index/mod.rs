// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The per-named-index catalog ("TOC"): schema, segment list, and
//! arbitrary metadata.

use crate::codec::{dump, load, Loaded, Value, ValueComparator};
use crate::env::EnvInner;
use crate::error::{Error, Result};
use crate::log_pipe::log_debug;
use crate::txn::Txn;
use heed::types::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Db = heed::Database<Bytes, Bytes, ValueComparator>;

struct IndexInner {
    env: Arc<EnvInner>,
    name: String,
    metadata: Db,
    schema: Db,
    segments: Db,
    nfields: AtomicU64,
    nsegments: AtomicU64,
}

/// A named index catalog: a schema of fields plus the list of segment ids
/// that belong to it.
///
/// Cheap to clone (an `Arc` around the shared databases and counters);
/// every clone refers to the same underlying catalog.
#[derive(Clone)]
pub struct Index(Arc<IndexInner>);

impl Index {
    pub(crate) fn open(env: Arc<EnvInner>, txn: &mut Txn, name: &str) -> Result<Self> {
        let metadata_name = format!("{name}.toc.metadata");
        let schema_name = format!("{name}.toc.schema");
        let segments_name = format!("{name}.toc.segments");

        let metadata: Db = env.with_rw(txn.id(), |rw| {
            env.heed_env()
                .create_database(rw, Some(&metadata_name))
                .map_err(Error::from)
        })?;
        let schema: Db = env.with_rw(txn.id(), |rw| {
            env.heed_env()
                .create_database(rw, Some(&schema_name))
                .map_err(Error::from)
        })?;
        let segments: Db = env.with_rw(txn.id(), |rw| {
            env.heed_env()
                .create_database(rw, Some(&segments_name))
                .map_err(Error::from)
        })?;

        let (nfields, nsegments) = env.with_ro(txn.id(), |ro| {
            let nfields = schema.len(ro).map_err(Error::from)?;
            let nsegments = segments.len(ro).map_err(Error::from)?;
            Ok((nfields, nsegments))
        })?;

        log_debug!(target: "ixstore::index", "opened index {name} ({nfields} fields, {nsegments} segments)");

        Ok(Self(Arc::new(IndexInner {
            env,
            name: name.to_owned(),
            metadata,
            schema,
            segments,
            nfields: AtomicU64::new(nfields),
            nsegments: AtomicU64::new(nsegments),
        })))
    }

    /// This index's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Reads an arbitrary metadata key.
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

    /// Writes an arbitrary metadata key.
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

    /// Adds a field to the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldExists`] if `name` is already in the schema.
    pub fn add_field(&self, txn: &mut Txn, name: &str, spec: &Value) -> Result<()> {
        let key_bytes = dump(&Value::from(name))?;
        let spec_bytes = dump(spec)?;

        let exists = self.0.env.with_ro(txn.id(), |ro| {
            Ok(self.0.schema.get(ro, &key_bytes).map_err(Error::from)?.is_some())
        })?;
        if exists {
            return Err(Error::FieldExists);
        }

        self.0.env.with_rw(txn.id(), |rw| {
            self.0
                .schema
                .put(rw, &key_bytes, &spec_bytes)
                .map_err(Error::from)
        })?;
        self.0.nfields.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Returns a field's spec, if present.
    pub fn get_field(&self, txn: &Txn, name: &str) -> Result<Option<Value>> {
        let key_bytes = dump(&Value::from(name))?;
        self.0.env.with_ro(txn.id(), |ro| {
            match self.0.schema.get(ro, &key_bytes).map_err(Error::from)? {
                Some(bytes) => Ok(Some(load(bytes)?.into_value())),
                None => Ok(None),
            }
        })
    }

    /// Returns whether `name` is a field in the schema.
    pub fn contains_field(&self, txn: &Txn, name: &str) -> Result<bool> {
        Ok(self.get_field(txn, name)?.is_some())
    }

    /// Iterates every `(name, spec)` pair in the schema, in field-name
    /// order.
    pub fn iter_fields(&self, txn: &Txn) -> Result<Vec<(String, Value)>> {
        self.0.env.with_ro(txn.id(), |ro| {
            let mut out = Vec::new();
            for entry in self.0.schema.iter(ro).map_err(Error::from)? {
                let (key_bytes, value_bytes) = entry.map_err(Error::from)?;
                let name = match load(key_bytes)?.into_value() {
                    Value::Raw(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    _ => continue,
                };
                out.push((name, load(value_bytes)?.into_value()));
            }
            Ok(out)
        })
    }

    /// The cached field count. O(1); kept in sync by [`Index::add_field`].
    #[must_use]
    pub fn count_fields(&self) -> u64 {
        self.0.nfields.load(Ordering::SeqCst)
    }

    /// Allocates a new segment id and records it in the segment list.
    /// Returns the allocated id.
    pub fn new_segment(&self, txn: &mut Txn) -> Result<u32> {
        let hint = u32::try_from(self.0.nsegments.load(Ordering::SeqCst))
            .map_err(|_| Error::Store("segment id space exhausted".into()))?;
        let sid = self.allocate_segment_id(txn, hint)?;
        self.0.nsegments.fetch_add(1, Ordering::SeqCst);
        Ok(sid)
    }

    fn allocate_segment_id(&self, txn: &mut Txn, hint: u32) -> Result<u32> {
        // `hint` is a reasonable starting point (current segment count);
        // walk forward past any gap left by a prior `delete_segment` so two
        // live segments never share an id.
        let mut candidate = hint;
        self.0.env.with_rw(txn.id(), |rw| {
            loop {
                let key_bytes = dump(&Value::U32(candidate))?;
                if self.0.segments.get(rw, &key_bytes).map_err(Error::from)?.is_none() {
                    self.0
                        .segments
                        .put(rw, &key_bytes, &dump(&Value::Nil)?)
                        .map_err(Error::from)?;
                    return Ok(candidate);
                }
                candidate = candidate.checked_add(1).ok_or(Error::Store(
                    "segment id space exhausted".into(),
                ))?;
            }
        })
    }

    /// Removes `sid` from the segment list.
    pub fn delete_segment(&self, txn: &mut Txn, sid: u32) -> Result<()> {
        let key_bytes = dump(&Value::U32(sid))?;
        self.0.env.with_rw(txn.id(), |rw| {
            self.0.segments.delete(rw, &key_bytes).map_err(Error::from)
        })?;
        self.0.nsegments.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    /// Lists every currently-recorded segment id, in ascending order.
    pub fn iter_segments(&self, txn: &Txn) -> Result<Vec<u32>> {
        self.0.env.with_ro(txn.id(), |ro| {
            let mut out = Vec::new();
            for entry in self.0.segments.iter(ro).map_err(Error::from)? {
                let (key_bytes, _) = entry.map_err(Error::from)?;
                if let Loaded::One(Value::U32(sid)) = load(key_bytes)? {
                    out.push(sid);
                }
            }
            Ok(out)
        })
    }

    /// The cached segment count. O(1); kept in sync by
    /// [`Index::new_segment`]/[`Index::delete_segment`].
    #[must_use]
    pub fn count_segments(&self) -> u64 {
        self.0.nsegments.load(Ordering::SeqCst)
    }

    /// Opens the segment `sid`, which must already be recorded (via
    /// [`Index::new_segment`]).
    pub fn open_segment(&self, txn: &mut Txn, sid: u32) -> Result<crate::segment::Segment> {
        crate::segment::Segment::open(Arc::clone(&self.0.env), txn, &self.0.name, sid)
    }
}
