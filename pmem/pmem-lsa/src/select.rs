//! Choice of the current index block.
//!
//! Sequence numbers cycle `1 → 2 → 3 → 1`. Of two valid sequences the newer one
//! is the successor of the other; equal sequences resolve to block B.

use crate::error::CorruptionKind;
use crate::layout::SEQUENCE_MAX;

/// One of the two index blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSlot {
    A,
    B,
}

impl IndexSlot {
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Successor of `sequence` in the cycle `1 → 2 → 3 → 1`.
#[must_use]
pub const fn next_sequence(sequence: u32) -> u32 {
    sequence % SEQUENCE_MAX + 1
}

const fn valid(sequence: Option<u32>) -> Option<u32> {
    match sequence {
        Some(s) if s != 0 && s <= SEQUENCE_MAX => Some(s),
        _ => None,
    }
}

/// Pick the current block from the sequence numbers of the valid blocks.
///
/// `None` marks a block that failed validation. Sequences outside `1..=3` are
/// treated the same way.
///
/// # Errors
/// [`CorruptionKind::NoValidIndex`] if neither block is usable.
pub const fn select_current(a: Option<u32>, b: Option<u32>) -> Result<IndexSlot, CorruptionKind> {
    match (valid(a), valid(b)) {
        (None, None) => Err(CorruptionKind::NoValidIndex),
        (Some(_), None) => Ok(IndexSlot::A),
        (None, Some(_)) => Ok(IndexSlot::B),
        (Some(x), Some(y)) => {
            if x == y || y == next_sequence(x) {
                Ok(IndexSlot::B)
            } else {
                Ok(IndexSlot::A)
            }
        }
    }
}
