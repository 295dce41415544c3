// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The storage engine of a log/event search system.
//!
//! ##### NOTE
//!
//! > This crate is the segmented, transactional inverted-index store: it
//! > persists events, schema and postings, and lets you iterate them back
//! > out in typed, ordered form.
//! > It does not implement a query language, a planner, or analyzers —
//! > those are the job of a layer built on top of this one.
//!
//! ##### About
//!
//! An [`Env`] owns an embedded ordered key-value store (backed by
//! [`heed`], i.e. LMDB) rooted at a directory. Inside an `Env` you open
//! named [`Index`](index::Index) catalogs ("TOCs"), which track a schema of
//! [`Value`]-typed fields and a list of [`Segment`](segment::Segment) ids.
//! Each segment is itself a handful of ordered key-value databases: events
//! (documents), postings (`field, term, event-id -> occurrences`), and
//! per-field metadata.
//!
//! All keys and values that cross this crate's public API are the
//! self-describing [`Value`] variant from [`codec`]; the byte encoding
//! [`codec::dump`] produces is also installed as the comparator for every
//! database, so ranged scans over typed keys sort the way the typed values
//! themselves compare.
//!
//! # Example usage
//!
//! ```
//! use ixstore::{codec::Value, env::{Env, Options}, txn::TxnFlags};
//!
//! # let dir = tempfile::tempdir()?;
//! # let env_dir = dir.path().join("env");
//! # let data_dir = dir.path().join("data");
//! # let tmp_dir = dir.path().join("tmp");
//! let env = Env::open(&env_dir, &data_dir, &tmp_dir, Options::default())?;
//!
//! let mut txn = env.begin(None, TxnFlags::empty())?;
//! let index = env.open_index(&mut txn, "logs")?;
//! index.add_field(&mut txn, "msg", &Value::Raw(b"text".to_vec()))?;
//! let sid = index.new_segment(&mut txn)?;
//! txn.commit()?;
//!
//! let mut txn = env.begin(None, TxnFlags::empty())?;
//! let segment = index.open_segment(&mut txn, sid)?;
//! segment.new_event(&mut txn, &Value::U32(1), &Value::Raw(b"hello".to_vec()))?;
//! txn.commit()?;
//!
//! let txn = env.begin(None, TxnFlags::empty())?;
//! assert!(segment.contains_event(&txn, &Value::U32(1))?);
//! #
//! # Ok::<(), ixstore::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod codec;
mod error;
pub mod env;
pub mod index;
pub mod log_pipe;
pub mod segment;
pub mod txn;
pub mod iter;

pub use codec::Value;
pub use env::Env;
pub use error::{Error, Result};
pub use index::Index;
pub use log_pipe::log_fd;
pub use segment::Segment;
pub use txn::Txn;
