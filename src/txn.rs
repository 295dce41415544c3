// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Nestable transaction handles.
//!
//! `heed`/LMDB only exposes a single level of real nested write
//! transactions tied to the lifetime of their parent, which doesn't match
//! the arbitrarily-deep parent/child tree this crate's callers are allowed
//! to build. Instead every [`Txn`] in a tree is an index into an arena
//! (`EnvInner::txns`) owned by the [`crate::Env`]; only the tree's root
//! drives a real `heed::RwTxn`/`RoTxn`. A child's `abort` taints the root
//! so the root's eventual `commit` is forced to abort instead — see
//! SPEC_FULL §4.3/§9(c) for the rationale.

use crate::env::EnvInner;
use crate::error::{Error, Result};
use std::sync::Arc;

bitflags::bitflags! {
    /// Flags recognized by [`crate::Env::begin`].
    ///
    /// These mirror the distilled spec's BDB-flavored flag names; since
    /// the adopted embedded store is `heed`/LMDB (SPEC_FULL §2.1), most of
    /// them map onto LMDB's coarser isolation model rather than a literal
    /// BDB equivalent:
    ///
    /// | Flag | LMDB/heed mapping |
    /// |---|---|
    /// | `READ_COMMITTED` | no-op: LMDB readers already see only committed data |
    /// | `READ_UNCOMMITTED` | rejected at `begin` with [`Error::UnsupportedType`]: LMDB has no dirty-read mode |
    /// | `TXN_NOSYNC` | environment already opened with `NO_SYNC`; flag is accepted and ignored per-txn |
    /// | `TXN_WRITE_NOSYNC` | same as `TXN_NOSYNC`, finer BDB distinction collapses under LMDB |
    /// | `TXN_NOWAIT` | `begin` fails fast with [`Error::LockTimeout`] instead of blocking if another root transaction is already open, rather than waiting on LMDB's single-writer mutex |
    /// | `TXN_SNAPSHOT` | no-op: every `heed::RoTxn` is already a consistent MVCC snapshot |
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxnFlags: u32 {
        /// Caller only ever observes committed data (LMDB's default; accepted as a no-op).
        const READ_COMMITTED = 1 << 0;
        /// Caller may observe uncommitted data. Not supported; `begin` rejects it.
        const READ_UNCOMMITTED = 1 << 1;
        /// Don't force a disk sync on commit.
        const TXN_NOSYNC = 1 << 2;
        /// Fail immediately rather than block waiting for a lock.
        const TXN_NOWAIT = 1 << 3;
        /// Pin the transaction to a consistent MVCC snapshot.
        const TXN_SNAPSHOT = 1 << 4;
        /// Like `TXN_NOSYNC` but only for the final write-back, not the log.
        const TXN_WRITE_NOSYNC = 1 << 5;
    }
}

/// An index into [`EnvInner`]'s transaction arena.
pub(crate) type TxnId = usize;

/// Whether a [`Txn`]'s root transaction reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnKind {
    Read,
    Write,
}

/// One node of the transaction tree, owned by [`EnvInner`]'s arena.
pub(crate) struct TxnNode {
    pub(crate) parent: Option<TxnId>,
    pub(crate) children: Vec<TxnId>,
    pub(crate) kind: TxnKind,
    pub(crate) flags: TxnFlags,
    /// `None` once this node (or an ancestor) has been committed/aborted.
    pub(crate) live: bool,
    /// Set when a descendant aborts; forces the root's `commit` to abort
    /// instead when the caller eventually calls it.
    pub(crate) tainted: bool,
    /// Only present on the root node of a tree: the real store transaction.
    pub(crate) root_rw: Option<heed::RwTxn<'static>>,
    pub(crate) root_ro: Option<heed::RoTxn<'static>>,
}

/// A transaction handle.
///
/// Created by [`crate::Env::begin`], terminated by exactly one of
/// [`Txn::commit`] or [`Txn::abort`]. Every operation on a terminated
/// handle (or a handle whose ancestor has terminated) fails with
/// [`Error::InvalidTxn`]. `Txn` is intentionally `!Sync`: a transaction
/// handle belongs to exactly one thread at a time.
pub struct Txn {
    pub(crate) env: Arc<EnvInner>,
    pub(crate) id: TxnId,
    pub(crate) kind: TxnKind,
    terminated: bool,
    // Deliberately `!Sync` (while staying `Send`): a transaction handle may
    // move to another thread but must never be shared across threads
    // concurrently, matching `heed::RwTxn`/`RoTxn`'s own non-`Sync`-ness.
    _not_sync: std::marker::PhantomData<std::cell::Cell<()>>,
}

impl Txn {
    pub(crate) fn new(env: Arc<EnvInner>, id: TxnId, kind: TxnKind) -> Self {
        Self {
            env,
            id,
            kind,
            terminated: false,
            _not_sync: std::marker::PhantomData,
        }
    }

    /// Returns this handle's arena id, for code (e.g. [`crate::index::Index`],
    /// [`crate::segment::Segment`]) that needs to resolve the backing
    /// `heed` transaction on every call rather than holding it directly.
    pub(crate) fn id(&self) -> TxnId {
        self.id
    }

    pub(crate) fn kind(&self) -> TxnKind {
        self.kind
    }

    fn check_live(&self) -> Result<()> {
        if self.terminated {
            return Err(Error::InvalidTxn);
        }
        if !self.env.txn_is_live(self.id) {
            return Err(Error::InvalidTxn);
        }
        Ok(())
    }

    /// Commits this transaction and every descendant handle.
    ///
    /// If this handle is the root of its tree, commits the real store
    /// transaction — unless a descendant already tainted it, in which case
    /// the root is silently aborted instead (the caller asked to commit,
    /// but a descendant already forced the whole tree's fate). If this
    /// handle is not the root, commit is a bookkeeping no-op: only the
    /// eventual root commit is durable, per §4.3/§9(c).
    pub fn commit(mut self) -> Result<()> {
        self.check_live()?;
        self.terminated = true;
        self.env.commit_subtree(self.id)
    }

    /// Aborts this transaction and every descendant handle. If this is not
    /// the root of its tree, the root is tainted so its eventual `commit`
    /// is forced to abort too.
    pub fn abort(mut self) -> Result<()> {
        self.check_live()?;
        self.terminated = true;
        self.env.abort_subtree(self.id)
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if !self.terminated {
            // A handle dropped without an explicit commit/abort is treated
            // as an abort, mirroring RAII scoped-exit semantics from §4.3.
            let _ = self.env.abort_subtree(self.id);
        }
    }
}
