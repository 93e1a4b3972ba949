use core::fmt;

/// A 128-bit identifier in the mixed-endian on-media GUID layout.
///
/// The first three groups are stored little-endian, the last eight bytes as-is.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub const ZERO: Self = Self([0; 16]);

    /// Build a GUID from its textual groups `d1-d2-d3-d4`.
    #[must_use]
    pub const fn from_fields(d1: u32, d2: u16, d3: u16, d4: [u8; 8]) -> Self {
        let a = d1.to_le_bytes();
        let b = d2.to_le_bytes();
        let c = d3.to_le_bytes();
        Self([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], d4[0], d4[1], d4[2], d4[3], d4[4],
            d4[5], d4[6], d4[7],
        ])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9],
            b[10],
            b[11],
            b[12],
            b[13],
            b[14],
            b[15]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

/// Address range type of persistent memory regions; marks App Direct labels.
pub const SPA_RANGE_PM_REGION: Guid = Guid::from_fields(
    0x66F0_D379,
    0xB4F3,
    0x4074,
    [0xAC, 0x43, 0x0D, 0x33, 0x18, 0xB7, 0x8C, 0xDB],
);

pub const SPA_RANGE_VOLATILE_REGION: Guid = Guid::from_fields(
    0x7305_944F,
    0xFDDA,
    0x44E3,
    [0xB1, 0x6C, 0x3F, 0x22, 0xD2, 0x52, 0xE5, 0xD0],
);

pub const SPA_RANGE_RAW_VOLATILE: Guid = Guid::from_fields(
    0x77AB_535A,
    0x45FC,
    0x624B,
    [0x55, 0x60, 0xF7, 0xB2, 0x81, 0xD1, 0xF9, 0x6E],
);

pub const SPA_RANGE_ISO_VOLATILE: Guid = Guid::from_fields(
    0x3D5A_BD30,
    0x4175,
    0x87CE,
    [0x6D, 0x64, 0xD2, 0xAD, 0xE5, 0x23, 0xC4, 0xBB],
);

pub const SPA_RANGE_RAW_PM: Guid = Guid::from_fields(
    0x5CEA_02C9,
    0x4D07,
    0x69D3,
    [0x26, 0x9F, 0x44, 0x96, 0xFB, 0xE0, 0x96, 0xF9],
);

pub const SPA_RANGE_ISO_PM: Guid = Guid::from_fields(
    0x0801_8188,
    0x42CD,
    0xBB48,
    [0x10, 0x0F, 0x53, 0x87, 0xD5, 0x3D, 0xED, 0x3D],
);

/// Every address range type GUID an App Direct label may carry.
pub const SPA_RANGE_TYPES: [Guid; 6] = [
    SPA_RANGE_PM_REGION,
    SPA_RANGE_VOLATILE_REGION,
    SPA_RANGE_RAW_VOLATILE,
    SPA_RANGE_ISO_VOLATILE,
    SPA_RANGE_RAW_PM,
    SPA_RANGE_ISO_PM,
];

/// Whether `guid` names one of the system address range types.
#[must_use]
pub fn is_spa_range_type(guid: &Guid) -> bool {
    SPA_RANGE_TYPES.contains(guid)
}

/// Block translation table address abstraction.
pub const BTT_ABSTRACTION: Guid = Guid::from_fields(
    0x1863_3BFC,
    0x1735,
    0x4217,
    [0x8A, 0xC9, 0x17, 0x23, 0x92, 0x82, 0xD3, 0xF8],
);

/// Page frame number address abstraction.
pub const PFN_ABSTRACTION: Guid = Guid::from_fields(
    0x2664_00BA,
    0xFB9F,
    0x4677,
    [0xBC, 0xB0, 0x96, 0x8F, 0x11, 0xD0, 0xD2, 0x25],
);
