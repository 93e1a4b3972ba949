use crate::bitmap::FreeBitmap;
use crate::bytes::{array, le16, le32, le64, put16, put32, put64};
use crate::checksum::fletcher64_excluding;
use crate::error::IndexDefect;
use crate::layout::{
    Geometry, INDEX_HEADER_LEN, INDEX_MAJOR, INDEX_SIGNATURE, LabelVersion, SEQUENCE_MAX,
    index as off, label_len_for_code,
};
use crate::select::IndexSlot;
use crate::LsaError;
use alloc::vec;
use alloc::vec::Vec;

/// Decoded index block header and free bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBlock {
    pub flags: [u8; 3],
    pub label_size_code: u8,
    pub sequence: u32,
    pub my_offset: u64,
    pub my_size: u64,
    pub other_offset: u64,
    pub label_offset: u64,
    pub nslot: u32,
    pub major: u16,
    pub minor: u16,
    pub checksum: u64,
    pub free: FreeBitmap,
}

impl IndexBlock {
    /// An empty block for position `slot` of `geometry`, with every label slot free.
    #[must_use]
    pub fn fresh(geometry: &Geometry, slot: IndexSlot, sequence: u32) -> Self {
        let mut block = Self {
            flags: [0; 3],
            label_size_code: geometry.version.size_code(),
            sequence,
            my_offset: 0,
            my_size: geometry.index_size,
            other_offset: 0,
            label_offset: geometry.labels_offset(),
            nslot: geometry.nslot,
            major: INDEX_MAJOR,
            minor: geometry.version.minor(),
            checksum: 0,
            free: FreeBitmap::all_free(geometry.nslot),
        };
        block.place(slot);
        block
    }

    /// Set the self and peer offsets for position `slot`.
    pub const fn place(&mut self, slot: IndexSlot) {
        match slot {
            IndexSlot::A => {
                self.my_offset = 0;
                self.other_offset = self.my_size;
            }
            IndexSlot::B => {
                self.my_offset = self.my_size;
                self.other_offset = 0;
            }
        }
    }

    /// Read the `my_size`, `nslot` and label size code fields without validation.
    ///
    /// Returns `None` if `raw` is shorter than the index header.
    #[must_use]
    pub fn peek_sizing(raw: &[u8]) -> Option<(u64, u32, u8)> {
        if raw.len() < INDEX_HEADER_LEN {
            return None;
        }
        Some((
            le64(raw, off::MY_SIZE),
            le32(raw, off::NSLOT),
            raw[off::LABEL_SIZE],
        ))
    }

    /// Decode the block at position `slot` and run the per-block checks in order.
    ///
    /// `raw` must hold at least `my_size` bytes; the caller has already checked
    /// that `my_size` agrees with the slot count.
    ///
    /// # Errors
    /// The first failing check as an [`IndexDefect`].
    pub fn validate(raw: &[u8], slot: IndexSlot) -> Result<Self, IndexDefect> {
        if raw.len() < INDEX_HEADER_LEN || raw[off::SIGNATURE..off::SIGNATURE + 16] != INDEX_SIGNATURE
        {
            return Err(IndexDefect::Signature);
        }

        let my_size = le64(raw, off::MY_SIZE);
        let covered = usize::try_from(my_size)
            .ok()
            .and_then(|n| raw.get(..n))
            .filter(|c| c.len() >= INDEX_HEADER_LEN)
            .ok_or(IndexDefect::Checksum)?;
        let checksum = le64(raw, off::CHECKSUM);
        if fletcher64_excluding(covered, off::CHECKSUM) != checksum {
            return Err(IndexDefect::Checksum);
        }

        let my_offset = le64(raw, off::MY_OFFSET);
        let other_offset = le64(raw, off::OTHER_OFFSET);
        let (want_mine, want_other) = match slot {
            IndexSlot::A => (0, my_size),
            IndexSlot::B => (my_size, 0),
        };
        if my_offset != want_mine || other_offset != want_other {
            return Err(IndexDefect::Offsets);
        }

        let sequence = le32(raw, off::SEQUENCE);
        if sequence == 0 || sequence > SEQUENCE_MAX {
            return Err(IndexDefect::Sequence(sequence));
        }

        let major = le16(raw, off::MAJOR);
        if major != INDEX_MAJOR {
            return Err(IndexDefect::Major(major));
        }

        let minor = le16(raw, off::MINOR);
        let Some(version) = LabelVersion::from_minor(minor) else {
            return Err(IndexDefect::Minor(minor));
        };

        let label_size_code = raw[off::LABEL_SIZE];
        if version == LabelVersion::V1_2 && label_size_code != LabelVersion::V1_2.size_code() {
            return Err(IndexDefect::LabelSize(label_size_code));
        }

        let nslot = le32(raw, off::NSLOT);
        let free = FreeBitmap::from_bytes(&covered[off::FREE..], nslot)
            .map_err(|_| IndexDefect::Checksum)?;

        Ok(Self {
            flags: array(raw, off::FLAGS),
            label_size_code,
            sequence,
            my_offset,
            my_size,
            other_offset,
            label_offset: le64(raw, off::LABEL_OFFSET),
            nslot,
            major,
            minor,
            checksum,
            free,
        })
    }

    /// Label format of the block, if its minor version is a known one.
    #[must_use]
    pub const fn version(&self) -> Option<LabelVersion> {
        LabelVersion::from_minor(self.minor)
    }

    /// Label slot length announced by the header.
    #[must_use]
    pub const fn label_len(&self) -> Option<usize> {
        label_len_for_code(self.label_size_code)
    }

    /// The block that replaces this one: next sequence, placed at `target`.
    #[must_use]
    pub fn successor(&self, target: IndexSlot) -> Self {
        let mut next = self.clone();
        next.sequence = crate::select::next_sequence(self.sequence);
        next.place(target);
        next
    }

    /// Encode to exactly `my_size` bytes with a freshly computed checksum.
    ///
    /// # Errors
    /// [`LsaError::InvalidParameter`] if `my_size` cannot hold the header and bitmap.
    pub fn encode(&mut self) -> Result<Vec<u8>, LsaError> {
        let len = usize::try_from(self.my_size)
            .map_err(|_| LsaError::InvalidParameter("index size exceeds address space"))?;
        let bitmap = self.free.as_bytes();
        if len < INDEX_HEADER_LEN + bitmap.len() {
            return Err(LsaError::InvalidParameter("index size too small for bitmap"));
        }

        let mut out = vec![0u8; len];
        out[off::SIGNATURE..off::SIGNATURE + 16].copy_from_slice(&INDEX_SIGNATURE);
        out[off::FLAGS..off::FLAGS + 3].copy_from_slice(&self.flags);
        out[off::LABEL_SIZE] = self.label_size_code;
        put32(&mut out, off::SEQUENCE, self.sequence);
        put64(&mut out, off::MY_OFFSET, self.my_offset);
        put64(&mut out, off::MY_SIZE, self.my_size);
        put64(&mut out, off::OTHER_OFFSET, self.other_offset);
        put64(&mut out, off::LABEL_OFFSET, self.label_offset);
        put32(&mut out, off::NSLOT, self.nslot);
        put16(&mut out, off::MAJOR, self.major);
        put16(&mut out, off::MINOR, self.minor);
        out[off::FREE..off::FREE + bitmap.len()].copy_from_slice(bitmap);

        self.checksum = fletcher64_excluding(&out, off::CHECKSUM);
        put64(&mut out, off::CHECKSUM, self.checksum);
        Ok(out)
    }
}
