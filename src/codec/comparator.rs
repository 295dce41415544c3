// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::cmp::Ordering;

/// Installs [`super::compare`] as the sort order for a `heed` database.
///
/// Every database this crate opens is declared `Database<Bytes, Bytes,
/// ValueComparator>` (or with a second `ValueComparator` for
/// `DUP_SORT` databases), so range scans over dumped [`super::Value`]
/// keys come back in the same order the values themselves compare in,
/// rather than raw lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueComparator;

impl heed::Comparator for ValueComparator {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        super::compare(a, b)
    }
}

/// The mirror image of [`ValueComparator`], installed on a segment's
/// reverse postings database so a plain forward cursor over it visits
/// entries in the same order a reverse cursor over the forward postings
/// database would, without paying the cost of flipping cursor direction on
/// every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseValueComparator;

impl heed::Comparator for ReverseValueComparator {
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        super::compare(a, b).reverse()
    }
}
