//! Assembled namespaces.

use crate::topology::InterleaveSetId;
use alloc::vec::Vec;
use core::fmt;
use pmem_lsa::guid::{BTT_ABSTRACTION, PFN_ABSTRACTION};
use pmem_lsa::{Guid, LabelFlags, LabelName, LabelVersion};
use pmem_range::{ModuleId, RangeKind};

/// `(region << 8) | n` with `n` the 1-based ordinal within the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NamespaceId(pub u16);

impl NamespaceId {
    /// `None` if `region` does not fit into the upper byte.
    #[must_use]
    pub fn new(region: InterleaveSetId, ordinal: u8) -> Option<Self> {
        let region = u8::try_from(region.0).ok()?;
        Some(Self(u16::from_be_bytes([region, ordinal])))
    }

    /// Region part; zero for namespaces outside any interleave set.
    #[must_use]
    pub const fn region(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self.0.to_be_bytes()[1]
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceType {
    Block,
    AppDirect,
}

impl NamespaceType {
    #[must_use]
    pub const fn range_kind(self) -> RangeKind {
        match self {
            Self::Block => RangeKind::NamespaceBlock,
            Self::AppDirect => RangeKind::NamespaceAppDirect,
        }
    }
}

/// Namespace health. Ordered by severity; see [`Health::escalate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Health {
    #[default]
    Unknown = 0,
    Ok = 1,
    Warning = 2,
    Critical = 3,
    Unsupported = 4,
    Locked = 5,
}

impl Health {
    /// Raise to `to` unless already at least as severe.
    pub fn escalate(&mut self, to: Self) {
        if to > *self {
            *self = to;
        }
    }
}

/// Address abstraction a namespace's labels announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abstraction {
    Raw,
    Btt,
    Pfn,
    Unknown,
}

impl Abstraction {
    #[must_use]
    pub fn from_guid(guid: &Guid) -> Self {
        if guid.is_zero() {
            Self::Raw
        } else if *guid == BTT_ABSTRACTION {
            Self::Btt
        } else if *guid == PFN_ABSTRACTION {
            Self::Pfn
        } else {
            Self::Unknown
        }
    }
}

/// One module extent of a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceRange {
    pub module: ModuleId,
    pub dpa: u64,
    pub size: u64,
}

/// A namespace reassembled from its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub id: NamespaceId,
    pub uuid: Guid,
    pub name: LabelName,
    pub kind: NamespaceType,
    /// App Direct ranges are in label position order, block ranges in DPA order.
    pub ranges: Vec<NamespaceRange>,
    pub parent: Option<InterleaveSetId>,
    pub block_size: u64,
    pub block_count: u64,
    /// Normalized LBA size of the labels.
    pub lba_size: u64,
    pub health: Health,
    pub flags: LabelFlags,
    pub cookie: u64,
    pub label_version: LabelVersion,
    pub abstraction: Abstraction,
    pub labels_found: u16,
    pub nlabel: u16,
}

impl Namespace {
    /// Sum of all range sizes.
    #[must_use]
    pub fn raw_capacity(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.size))
    }

    /// Region id the namespace surfaces under.
    #[must_use]
    pub fn region(&self) -> InterleaveSetId {
        self.parent.unwrap_or_default()
    }

    pub fn ranges_on(&self, module: ModuleId) -> impl Iterator<Item = &NamespaceRange> + '_ {
        self.ranges.iter().filter(move |r| r.module == module)
    }
}
