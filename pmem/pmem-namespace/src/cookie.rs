//! Interleave-set cookies.
//!
//! A cookie binds namespace labels to the exact module population of an
//! interleave set. Every region contributes one record; the records are ordered
//! by SPA offset and run through Fletcher-64:
//!
//! ```text
//! v1.2 record (48 bytes)                       v1.1 record (16 bytes)
//! ┌────────────┬────────┬──────┬──────┬───┬──────────┐   ┌────────────┬────────┬──────────┐
//! │ spa_offset │ serial │ vend │ date │loc│ reserved │   │ spa_offset │ serial │ reserved │
//! │ u64        │ u32    │ u16  │ u16  │u8 │ [u8; 31] │   │ u64        │ u32    │ u32      │
//! └────────────┴────────┴──────┴──────┴───┴──────────┘   └────────────┴────────┴──────────┘
//! ```

use crate::NamespaceError;
use crate::topology::{InterleaveSet, Module, ModuleIdentity};
use alloc::vec::Vec;
use pmem_lsa::LabelVersion;
use pmem_lsa::checksum::fletcher64;

const V1_2_RECORD_LEN: usize = 48;
const V1_1_RECORD_LEN: usize = 16;

const _: () = {
    assert!(V1_2_RECORD_LEN % 4 == 0);
    assert!(V1_1_RECORD_LEN % 4 == 0);
    assert!(8 + 4 + 2 + 2 + 1 <= V1_2_RECORD_LEN);
};

/// One region's contribution to a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieRecord {
    pub spa_offset: u64,
    pub identity: ModuleIdentity,
}

impl CookieRecord {
    fn write(&self, version: LabelVersion, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.spa_offset.to_le_bytes());
        out.extend_from_slice(&self.identity.serial.to_le_bytes());
        match version {
            LabelVersion::V1_1 => out.extend_from_slice(&[0; V1_1_RECORD_LEN - 12]),
            LabelVersion::V1_2 => {
                out.extend_from_slice(&self.identity.vendor.to_le_bytes());
                out.extend_from_slice(&self.identity.manufacturing_date.to_le_bytes());
                out.push(self.identity.manufacturing_location);
                out.extend_from_slice(&[0; V1_2_RECORD_LEN - 17]);
            }
        }
    }
}

/// Cookie over `records` in the record layout of `version`.
///
/// The records are ordered by SPA offset first; equal offsets keep their order.
#[must_use]
pub fn compute(records: &[CookieRecord], version: LabelVersion) -> u64 {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| r.spa_offset);

    let record_len = match version {
        LabelVersion::V1_1 => V1_1_RECORD_LEN,
        LabelVersion::V1_2 => V1_2_RECORD_LEN,
    };
    let mut raw = Vec::with_capacity(sorted.len() * record_len);
    for record in &sorted {
        record.write(version, &mut raw);
    }
    fletcher64(&raw)
}

/// Records of every region of `set`, resolved against `modules`.
///
/// # Errors
/// [`NamespaceError::UnknownModule`] if a region names a module that is not listed.
pub fn records(set: &InterleaveSet, modules: &[Module]) -> Result<Vec<CookieRecord>, NamespaceError> {
    set.regions
        .iter()
        .map(|region| {
            modules
                .iter()
                .find(|m| m.id == region.module)
                .map(|m| CookieRecord {
                    spa_offset: region.spa_region_offset,
                    identity: m.identity,
                })
                .ok_or(NamespaceError::UnknownModule(region.module))
        })
        .collect()
}

/// Both cookie flavours of one interleave set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetCookies {
    pub v1_1: u64,
    pub v1_2: u64,
}

impl SetCookies {
    /// # Errors
    /// See [`records`].
    pub fn derive(set: &InterleaveSet, modules: &[Module]) -> Result<Self, NamespaceError> {
        let records = records(set, modules)?;
        Ok(Self {
            v1_1: compute(&records, LabelVersion::V1_1),
            v1_2: compute(&records, LabelVersion::V1_2),
        })
    }

    #[must_use]
    pub const fn for_version(&self, version: LabelVersion) -> u64 {
        match version {
            LabelVersion::V1_1 => self.v1_1,
            LabelVersion::V1_2 => self.v1_2,
        }
    }
}
