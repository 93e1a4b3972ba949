//! Capacity alignment tiers, block sizes and runtime namespace settings.

use pmem_lsa::LabelVersion;

pub const KIB: u64 = 1 << 10;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

/// Per-member alignment for requests below [`SMALL_TIER_LIMIT`].
pub const SMALL_ALIGNMENT: u64 = 4 * KIB;
/// Per-member alignment for requests below [`MEDIUM_TIER_LIMIT`].
pub const MEDIUM_ALIGNMENT: u64 = 64 * KIB;
pub const LARGE_ALIGNMENT: u64 = 32 * GIB;

pub const SMALL_TIER_LIMIT: u64 = TIB;
pub const MEDIUM_TIER_LIMIT: u64 = 256 * TIB;

pub const LBA_SIZE_512: u64 = 512;
pub const LBA_SIZE_4K: u64 = 4096;

/// Smallest App Direct namespace offered per member module.
pub const PM_NAMESPACE_MIN_SIZE: u64 = GIB;

/// Namespace ordinals within one region are `1..=MAX_NAMESPACES_PER_REGION`.
pub const MAX_NAMESPACES_PER_REGION: u8 = 0xFF;

const _: () = {
    assert!(SMALL_ALIGNMENT.is_power_of_two());
    assert!(MEDIUM_ALIGNMENT.is_power_of_two());
    assert!(LARGE_ALIGNMENT.is_power_of_two());
    assert!(SMALL_TIER_LIMIT < MEDIUM_TIER_LIMIT);
    assert!(PM_NAMESPACE_MIN_SIZE % SMALL_ALIGNMENT == 0);
};

/// Per-member alignment for a namespace of `total` bytes.
#[must_use]
pub const fn alignment_for(total: u64) -> u64 {
    if total < SMALL_TIER_LIMIT {
        SMALL_ALIGNMENT
    } else if total < MEDIUM_TIER_LIMIT {
        MEDIUM_ALIGNMENT
    } else {
        LARGE_ALIGNMENT
    }
}

/// Block size an App Direct namespace exposes for the label's `lba_size`.
///
/// Returns the block size and whether `lba_size` was one the namespace supports.
#[must_use]
pub const fn normalize_lba(lba_size: u64) -> (u64, bool) {
    match lba_size {
        0 | LBA_SIZE_512 => (LBA_SIZE_512, true),
        LBA_SIZE_4K => (LBA_SIZE_4K, true),
        _ => (LBA_SIZE_512, false),
    }
}

/// Runtime settings of a [`Context`](crate::Context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Version used to initialize label storage that has never been written.
    pub default_label_version: LabelVersion,
    pub pm_namespace_min_size: u64,
    /// Mark new App Direct labels with the BTT abstraction GUID.
    pub btt_abstraction: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            default_label_version: LabelVersion::V1_2,
            pm_namespace_min_size: PM_NAMESPACE_MIN_SIZE,
            btt_abstraction: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers() {
        assert_eq!(alignment_for(0), 4 * KIB);
        assert_eq!(alignment_for(TIB - 1), 4 * KIB);
        assert_eq!(alignment_for(TIB), 64 * KIB);
        assert_eq!(alignment_for(256 * TIB - 1), 64 * KIB);
        assert_eq!(alignment_for(256 * TIB), 32 * GIB);
    }

    #[test]
    fn lba_normalization() {
        assert_eq!(normalize_lba(0), (512, true));
        assert_eq!(normalize_lba(512), (512, true));
        assert_eq!(normalize_lba(4096), (4096, true));
        assert_eq!(normalize_lba(520), (512, false));
    }
}
