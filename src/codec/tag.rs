// Copyright (c) 2024-present, ixstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// The wire tag for each [`crate::codec::Value`] kind.
///
/// Numeric order of the discriminants IS the sort order: `Nil < False <
/// True < {I64, I32, U32, U64} < F64 < Raw < Array < Map`. Within the
/// integer group the order is `I64 < I32 < U32 < U64`, which only produces
/// a correct total order across differently-tagged numbers because
/// [`crate::codec::dump`] always picks the smallest type that losslessly
/// represents a value: `I64` is only ever used for magnitudes `I32` can't
/// hold (so it's always more negative than any `I32`), and `U64` only for
/// magnitudes `U32` can't hold (so it's always larger than any `U32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    Nil = 0,
    False = 1,
    True = 2,
    I64 = 3,
    I32 = 4,
    U32 = 5,
    U64 = 6,
    F64 = 7,
    Raw = 8,
    Array = 9,
    Map = 10,
}

impl Tag {
    pub(super) const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Nil,
            1 => Self::False,
            2 => Self::True,
            3 => Self::I64,
            4 => Self::I32,
            5 => Self::U32,
            6 => Self::U64,
            7 => Self::F64,
            8 => Self::Raw,
            9 => Self::Array,
            10 => Self::Map,
            _ => return None,
        })
    }
}
