//! Namespace label codec.
//!
//! A label describes the contribution of one module to one namespace. Version 1.2
//! labels are 256 bytes and carry a Fletcher-64 checksum; version 1.1 labels are
//! the first 128 bytes of that layout without type GUIDs or checksum.

use crate::bytes::{array, le16, le32, le64, put16, put32, put64};
use crate::checksum::fletcher64_excluding;
use crate::guid::{Guid, SPA_RANGE_PM_REGION};
use crate::layout::{LABEL_NAME_LEN, LabelVersion, label as off};
use crate::LsaError;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// Label flags.
///
/// - bit 0: read-only
/// - bit 1: local (single-module namespace)
/// - bit 2: reserved
/// - bit 3: update in progress
/// - bits 4..31: reserved
#[bitfield_struct::bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct LabelFlags {
    #[bits(1)]
    pub read_only: bool,
    #[bits(1)]
    pub local: bool,
    #[bits(1)]
    __: u8,
    #[bits(1)]
    pub updating: bool,
    #[bits(28)]
    __: u32,
}

/// NUL-padded namespace name of at most 63 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelName([u8; LABEL_NAME_LEN]);

impl LabelName {
    pub const EMPTY: Self = Self([0; LABEL_NAME_LEN]);

    /// # Errors
    /// [`LsaError::InvalidParameter`] if `name` does not fit with its NUL terminator.
    pub fn new(name: &str) -> Result<Self, LsaError> {
        let bytes = name.as_bytes();
        if bytes.len() >= LABEL_NAME_LEN {
            return Err(LsaError::InvalidParameter("namespace name longer than 63 bytes"));
        }
        let mut raw = [0u8; LABEL_NAME_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    #[must_use]
    pub const fn from_bytes(raw: [u8; LABEL_NAME_LEN]) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; LABEL_NAME_LEN] {
        &self.0
    }

    /// The name up to its first NUL, if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(LABEL_NAME_LEN);
        core::str::from_utf8(&self.0[..len]).ok()
    }
}

impl Default for LabelName {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for LabelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "{s:?}"),
            None => write!(f, "{:?}", &self.0[..]),
        }
    }
}

/// One decoded namespace label.
///
/// Reserved bytes are not kept; they are written as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamespaceLabel {
    pub uuid: Guid,
    pub name: LabelName,
    pub flags: LabelFlags,
    /// Number of labels forming the namespace; zero for block namespaces.
    pub nlabel: u16,
    /// Position of this label within the namespace's label set.
    pub position: u16,
    /// Interleave set cookie this label is bound to.
    pub set_cookie: u64,
    pub lba_size: u64,
    /// Module-local start address of the extent.
    pub dpa: u64,
    /// Extent length in bytes.
    pub raw_size: u64,
    /// Slot this label occupies.
    pub slot: u32,
    pub alignment: u8,
    pub type_guid: Guid,
    pub abstraction_guid: Guid,
    pub checksum: u64,
}

impl NamespaceLabel {
    /// Decode a label from its on-media slot.
    ///
    /// # Errors
    /// [`LsaError::InvalidParameter`] if `raw` is shorter than a `version` label.
    pub fn decode(raw: &[u8], version: LabelVersion) -> Result<Self, LsaError> {
        if raw.len() < version.label_len() {
            return Err(LsaError::InvalidParameter("label buffer too short"));
        }

        let mut label = Self {
            uuid: Guid::from_bytes(array(raw, off::UUID)),
            name: LabelName::from_bytes(array(raw, off::NAME)),
            flags: LabelFlags::from_bits(le32(raw, off::FLAGS)),
            nlabel: le16(raw, off::NLABEL),
            position: le16(raw, off::POSITION),
            set_cookie: le64(raw, off::SET_COOKIE),
            lba_size: le64(raw, off::LBA_SIZE),
            dpa: le64(raw, off::DPA),
            raw_size: le64(raw, off::RAW_SIZE),
            slot: le32(raw, off::SLOT),
            ..Self::default()
        };

        if version == LabelVersion::V1_2 {
            label.alignment = raw[off::ALIGNMENT];
            label.type_guid = Guid::from_bytes(array(raw, off::TYPE_GUID));
            label.abstraction_guid = Guid::from_bytes(array(raw, off::ABSTRACTION_GUID));
            label.checksum = le64(raw, off::CHECKSUM);
        }
        Ok(label)
    }

    /// Encode into `out`, which must be exactly one `version` label long.
    ///
    /// # Errors
    /// [`LsaError::InvalidParameter`] on a buffer length mismatch.
    pub fn encode_into(&self, version: LabelVersion, out: &mut [u8]) -> Result<(), LsaError> {
        if out.len() != version.label_len() {
            return Err(LsaError::InvalidParameter("label buffer length mismatch"));
        }
        out.fill(0);

        out[off::UUID..off::UUID + 16].copy_from_slice(self.uuid.as_bytes());
        out[off::NAME..off::NAME + LABEL_NAME_LEN].copy_from_slice(self.name.as_bytes());
        put32(out, off::FLAGS, self.flags.into_bits());
        put16(out, off::NLABEL, self.nlabel);
        put16(out, off::POSITION, self.position);
        put64(out, off::SET_COOKIE, self.set_cookie);
        put64(out, off::LBA_SIZE, self.lba_size);
        put64(out, off::DPA, self.dpa);
        put64(out, off::RAW_SIZE, self.raw_size);
        put32(out, off::SLOT, self.slot);

        if version == LabelVersion::V1_2 {
            out[off::ALIGNMENT] = self.alignment;
            out[off::TYPE_GUID..off::TYPE_GUID + 16].copy_from_slice(self.type_guid.as_bytes());
            out[off::ABSTRACTION_GUID..off::ABSTRACTION_GUID + 16]
                .copy_from_slice(self.abstraction_guid.as_bytes());
            put64(out, off::CHECKSUM, self.checksum);
        }
        Ok(())
    }

    #[must_use]
    pub fn encode(&self, version: LabelVersion) -> Vec<u8> {
        let mut out = vec![0u8; version.label_len()];
        // Length matches by construction.
        let _ = self.encode_into(version, &mut out);
        out
    }

    /// Fletcher-64 of the v1.2 encoding with the checksum field as zero.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        let raw = self.encode(LabelVersion::V1_2);
        fletcher64_excluding(&raw, off::CHECKSUM)
    }

    /// Store the current checksum in the label.
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    #[must_use]
    pub fn checksum_matches(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Whether this label belongs to an App Direct namespace.
    ///
    /// Version 1.2 labels say so through their type GUID, version 1.1 labels by
    /// not being local.
    #[must_use]
    pub fn is_app_direct(&self, version: LabelVersion) -> bool {
        match version {
            LabelVersion::V1_2 => self.type_guid == SPA_RANGE_PM_REGION,
            LabelVersion::V1_1 => !self.flags.local(),
        }
    }

    /// Exclusive end of the extent, if it fits into `u64`.
    #[must_use]
    pub const fn dpa_end(&self) -> Option<u64> {
        self.dpa.checked_add(self.raw_size)
    }
}

/// Field overrides applied by a label modification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelChanges {
    pub flags: Option<LabelFlags>,
    pub name: Option<LabelName>,
    pub nlabel: Option<u16>,
    pub position: Option<u16>,
    pub raw_size: Option<u64>,
}

impl LabelChanges {
    #[must_use]
    pub fn rename(name: LabelName) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, label: &mut NamespaceLabel) {
        if let Some(flags) = self.flags {
            label.flags = flags;
        }
        if let Some(name) = self.name {
            label.name = name;
        }
        if let Some(nlabel) = self.nlabel {
            label.nlabel = nlabel;
        }
        if let Some(position) = self.position {
            label.position = position;
        }
        if let Some(raw_size) = self.raw_size {
            label.raw_size = raw_size;
        }
    }
}
