/// Failure reported by a [`LabelStorage`](crate::LabelStorage) transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("transfer of {len} bytes at offset {offset:#x} is outside the partition")]
    OutOfBounds { offset: u64, len: usize },
    #[error("the module has no label storage partition")]
    NoMedia,
    #[error("device error")]
    Device,
}

/// Why a label storage area is considered corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CorruptionKind {
    #[error("neither index block is valid")]
    NoValidIndex,
    #[error("index size {found} does not match the size {expected} computed from its slot count")]
    IndexSize { expected: u64, found: u64 },
    #[error("index blocks and label array do not fit into the partition")]
    ExceedsPartition,
    #[error("unsupported label size code {0}")]
    LabelSizeCode(u8),
}

/// Why a single index block was rejected.
///
/// Variants are listed in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IndexDefect {
    #[error("bad signature")]
    Signature,
    #[error("checksum mismatch")]
    Checksum,
    #[error("self or peer offset does not match its position")]
    Offsets,
    #[error("sequence number {0} outside 1..=3")]
    Sequence(u32),
    #[error("unsupported major version {0}")]
    Major(u16),
    #[error("unsupported minor version {0}")]
    Minor(u16),
    #[error("label size code {0} does not match the minor version")]
    LabelSize(u8),
    /// Checked against the peer block after decoding.
    #[error("index size {found} differs from the peer block's {expected}")]
    Size { expected: u64, found: u64 },
}

/// Errors of the label storage codec and lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LsaError {
    #[error("label storage area is not initialized")]
    NotFound,
    #[error("label storage area is corrupted: {which}")]
    VolumeCorrupted { which: CorruptionKind },
    #[error("not enough free label slots: {needed} needed, {available} available")]
    OutOfResources { needed: u32, available: u32 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("label storage transport failed: {0}")]
    Transport(#[from] StorageError),
}

impl From<CorruptionKind> for LsaError {
    fn from(which: CorruptionKind) -> Self {
        Self::VolumeCorrupted { which }
    }
}
