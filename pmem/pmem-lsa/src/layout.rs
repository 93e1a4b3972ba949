//! On-media constants and the geometry derived from them.
//!
//! The label storage area starts with two index blocks of equal size, followed by
//! the label array:
//!
//! ```text
//! 0            IndexSize      2·IndexSize                      2·IndexSize + nslot·label_len
//! ├─ index A ──┼─ index B ────┼─ slot 0 ─┼─ slot 1 ─┼─ ... ─┤
//! ```

/// Signature at the start of every index block.
pub const INDEX_SIGNATURE: [u8; 16] = *b"NAMESPACE_INDEX\0";

/// Number of index blocks in a label storage area.
pub const INDEX_COUNT: usize = 2;

/// Fixed index header length; the free bitmap follows immediately.
pub const INDEX_HEADER_LEN: usize = 72;

/// Index blocks are padded to this alignment.
pub const INDEX_ALIGN: u64 = 256;

pub const MIN_INDEX_SIZE: u64 = 256;

/// The free bitmap covers a multiple of this many slots.
pub const FREE_BITMAP_ALIGN: u32 = 8;

pub const INDEX_MAJOR: u16 = 1;

/// Valid sequence numbers cycle through `1..=3`; zero marks an unused index.
pub const SEQUENCE_MAX: u32 = 3;

pub const LABEL_NAME_LEN: usize = 64;

/// Field offsets within an index block.
pub mod index {
    pub const SIGNATURE: usize = 0;
    pub const FLAGS: usize = 16;
    pub const LABEL_SIZE: usize = 19;
    pub const SEQUENCE: usize = 20;
    pub const MY_OFFSET: usize = 24;
    pub const MY_SIZE: usize = 32;
    pub const OTHER_OFFSET: usize = 40;
    pub const LABEL_OFFSET: usize = 48;
    pub const NSLOT: usize = 56;
    pub const MAJOR: usize = 60;
    pub const MINOR: usize = 62;
    pub const CHECKSUM: usize = 64;
    pub const FREE: usize = super::INDEX_HEADER_LEN;
}

/// Field offsets within a namespace label.
pub mod label {
    pub const UUID: usize = 0;
    pub const NAME: usize = 16;
    pub const FLAGS: usize = 80;
    pub const NLABEL: usize = 84;
    pub const POSITION: usize = 86;
    pub const SET_COOKIE: usize = 88;
    pub const LBA_SIZE: usize = 96;
    pub const DPA: usize = 104;
    pub const RAW_SIZE: usize = 112;
    pub const SLOT: usize = 120;
    pub const ALIGNMENT: usize = 124;
    pub const TYPE_GUID: usize = 128;
    pub const ABSTRACTION_GUID: usize = 144;
    pub const RESERVED: usize = 160;
    pub const CHECKSUM: usize = 248;
}

const _: () = {
    assert!(INDEX_SIGNATURE.len() == 16);
    assert!(index::CHECKSUM + 8 == INDEX_HEADER_LEN);
    assert!(label::NAME + LABEL_NAME_LEN == label::FLAGS);
    assert!(label::CHECKSUM + 8 == LabelVersion::V1_2.label_len());
    assert!(label::SLOT + 8 == LabelVersion::V1_1.label_len());
    assert!(MIN_INDEX_SIZE.is_multiple_of(INDEX_ALIGN));
};

/// Label format revision, identified by the index minor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabelVersion {
    /// 128-byte labels without checksum.
    V1_1,
    /// 256-byte labels with type GUIDs and checksum.
    V1_2,
}

impl LabelVersion {
    #[must_use]
    pub const fn minor(self) -> u16 {
        match self {
            Self::V1_1 => 1,
            Self::V1_2 => 2,
        }
    }

    #[must_use]
    pub const fn from_minor(minor: u16) -> Option<Self> {
        match minor {
            1 => Some(Self::V1_1),
            2 => Some(Self::V1_2),
            _ => None,
        }
    }

    /// Bytes per label slot.
    #[must_use]
    pub const fn label_len(self) -> usize {
        match self {
            Self::V1_1 => 128,
            Self::V1_2 => 256,
        }
    }

    /// Label size code stored in the index header (`bytes = 128 << code`).
    #[must_use]
    pub const fn size_code(self) -> u8 {
        match self {
            Self::V1_1 => 0,
            Self::V1_2 => 1,
        }
    }

    #[must_use]
    pub const fn has_checksum(self) -> bool {
        matches!(self, Self::V1_2)
    }
}

/// Label length for an index label-size code, if it is one this format supports.
#[must_use]
pub const fn label_len_for_code(code: u8) -> Option<usize> {
    match code {
        0 => Some(LabelVersion::V1_1.label_len()),
        1 => Some(LabelVersion::V1_2.label_len()),
        _ => None,
    }
}

/// Bytes of free bitmap for `nslot` slots.
#[must_use]
pub const fn free_bitmap_len(nslot: u32) -> usize {
    nslot.div_ceil(FREE_BITMAP_ALIGN) as usize
}

/// Size of one index block for `nslot` slots.
#[must_use]
pub const fn index_size(nslot: u32) -> u64 {
    let raw = (INDEX_HEADER_LEN + free_bitmap_len(nslot)) as u64;
    raw.div_ceil(INDEX_ALIGN) * INDEX_ALIGN
}

/// Placement of index blocks and label slots in one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub version: LabelVersion,
    pub index_size: u64,
    pub nslot: u32,
}

impl Geometry {
    /// Geometry of a freshly initialized partition of `partition_size` bytes.
    ///
    /// Returns `None` if the partition cannot hold both index blocks and at least
    /// one label slot.
    #[must_use]
    pub fn for_partition(partition_size: u64, version: LabelVersion) -> Option<Self> {
        let label_len = version.label_len() as u64;
        let total_slots = partition_size / label_len;
        let free_bytes = total_slots / u64::from(FREE_BITMAP_ALIGN);

        let index_size = (INDEX_HEADER_LEN as u64)
            .checked_add(free_bytes)?
            .div_ceil(INDEX_ALIGN)
            .checked_mul(INDEX_ALIGN)?
            .max(MIN_INDEX_SIZE);

        let index_slots = (INDEX_COUNT as u64 * index_size) / label_len;
        let nslot = (free_bytes * u64::from(FREE_BITMAP_ALIGN)).checked_sub(index_slots)?;
        let nslot = u32::try_from(nslot).ok().filter(|&n| n > 0)?;

        // Shed slots may shrink the bitmap below an alignment boundary; readers
        // derive the block size from nslot, so store that one.
        let index_size = self::index_size(nslot);

        Some(Self {
            version,
            index_size,
            nslot,
        })
    }

    #[must_use]
    pub const fn label_len(&self) -> usize {
        self.version.label_len()
    }

    /// Partition offset of index block `which` (0 or 1).
    #[must_use]
    pub const fn index_offset(&self, which: usize) -> u64 {
        which as u64 * self.index_size
    }

    /// Start of the label array.
    #[must_use]
    pub const fn labels_offset(&self) -> u64 {
        INDEX_COUNT as u64 * self.index_size
    }

    /// Partition offset of label `slot`.
    #[must_use]
    pub const fn slot_offset(&self, slot: u32) -> u64 {
        self.labels_offset() + slot as u64 * self.label_len() as u64
    }

    /// Bytes covered by both index blocks and all label slots.
    #[must_use]
    pub const fn total_len(&self) -> u64 {
        self.slot_offset(self.nslot)
    }
}
