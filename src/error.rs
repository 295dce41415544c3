// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The store aborted this transaction to break a deadlock cycle.
    ///
    /// The caller must retry the whole transaction from `begin`; partial
    /// retry within the aborted [`crate::Txn`] is not meaningful since the
    /// handle (and all its descendants) are already invalidated.
    Deadlock,

    /// A lock wait exceeded the configured limit.
    LockTimeout,

    /// A unique-insert was violated (e.g. [`crate::Segment::new_event`] on
    /// an event id that already exists).
    DocExists,

    /// `add_field` was called with a name that already exists in the
    /// schema.
    FieldExists,

    /// A requested key was absent.
    KeyError,

    /// A positional target (e.g. an `Iter::skip` target) was absent.
    IndexError,

    /// An operation was attempted on a [`crate::Txn`] whose handle has
    /// already been terminated (committed, aborted, or invalidated by an
    /// ancestor's termination).
    InvalidTxn,

    /// The codec failed to parse a byte buffer into a [`crate::Value`].
    Malformed(String),

    /// The codec was asked to serialize a value outside its supported
    /// universe.
    UnsupportedType,

    /// Any other failure surfaced by the embedded store or the filesystem.
    Store(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadlock => write!(f, "deadlock: transaction aborted to break a cycle"),
            Self::LockTimeout => write!(f, "lock wait exceeded the configured timeout"),
            Self::DocExists => write!(f, "event already exists"),
            Self::FieldExists => write!(f, "field already exists"),
            Self::KeyError => write!(f, "key not found"),
            Self::IndexError => write!(f, "positional target not found"),
            Self::InvalidTxn => write!(f, "operation on a terminated transaction"),
            Self::Malformed(msg) => write!(f, "malformed codec input: {msg}"),
            Self::UnsupportedType => write!(f, "value outside the codec's supported universe"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<heed::Error> for Error {
    fn from(value: heed::Error) -> Self {
        match &value {
            heed::Error::Mdb(heed::MdbError::MapFull | heed::MdbError::TlsFull) => {
                Self::Store(value.to_string())
            }
            heed::Error::Mdb(heed::MdbError::Other(code)) if is_deadlock_errno(*code) => {
                Self::Deadlock
            }
            _ => Self::Store(value.to_string()),
        }
    }
}

/// `EDEADLK`/`EDEADLOCK` on the platforms LMDB ships for; the embedded
/// store maps internal lock-cycle rejection onto this errno.
const fn is_deadlock_errno(code: i32) -> bool {
    code == 35 || code == 11
}

/// The result type returned by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;
