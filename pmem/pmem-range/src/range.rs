use core::fmt;

/// Identifies one persistent-memory module.
///
/// The value is opaque to this crate; higher layers use the platform's
/// physical module id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ModuleId(pub u16);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// What a range of module address space is used for.
///
/// The discriminants are the numeric codes used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RangeKind {
    Undefined = 1,
    Reserved = 2,
    Volatile = 3,
    Persistent = 4,
    /// Region of an interleave set spanning more than one module.
    InterleaveSet = 5,
    /// Region of an interleave set with a single member.
    InterleaveSetSingle = 6,
    /// Region of a mirrored interleave set.
    InterleaveSetMirrored = 7,
    /// Persistent space not covered by any interleave set.
    StorageOnly = 8,
    NamespaceBlock = 9,
    NamespaceAppDirect = 10,
    Free = 11,
    /// Zero-length marker at the end of the persistent partition.
    LastUsableBoundary = 12,
}

impl RangeKind {
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Any of the three interleave-set classifications.
    #[must_use]
    pub const fn is_interleave_set(self) -> bool {
        matches!(
            self,
            Self::InterleaveSet | Self::InterleaveSetSingle | Self::InterleaveSetMirrored
        )
    }

    #[must_use]
    pub const fn is_namespace(self) -> bool {
        matches!(self, Self::NamespaceBlock | Self::NamespaceAppDirect)
    }
}

/// A half-open span `[start, start + length)` of one module's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    pub owner: ModuleId,
    pub start: u64,
    pub length: u64,
    pub kind: RangeKind,
}

impl AddressRange {
    #[must_use]
    pub const fn new(owner: ModuleId, start: u64, length: u64, kind: RangeKind) -> Self {
        Self {
            owner,
            start,
            length,
            kind,
        }
    }

    /// Exclusive end address, or `None` if it does not fit into `u64`.
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.start.checked_add(self.length)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether `[start, start + length)` lies entirely inside this range.
    ///
    /// An empty span is contained if its start is inside the range or on its end.
    #[must_use]
    pub const fn contains_span(&self, start: u64, length: u64) -> bool {
        let (Some(end), Some(other_end)) = (self.end(), start.checked_add(length)) else {
            return false;
        };
        start >= self.start && other_end <= end
    }

    /// Whether the address `point` lies inside this range.
    #[must_use]
    pub const fn contains(&self, point: u64) -> bool {
        match self.end() {
            Some(end) => point >= self.start && point < end,
            None => false,
        }
    }

    /// The same span re-tagged as `kind`.
    #[must_use]
    pub const fn with_kind(self, kind: RangeKind) -> Self {
        Self { kind, ..self }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: [0x{:x}, +0x{:x}) {:?}",
            self.owner, self.start, self.length, self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: ModuleId = ModuleId(1);

    #[test]
    fn span_containment() {
        let r = AddressRange::new(M, 0x1000, 0x1000, RangeKind::Free);
        assert!(r.contains_span(0x1000, 0x1000));
        assert!(r.contains_span(0x1800, 0x800));
        assert!(!r.contains_span(0x1800, 0x801));
        assert!(!r.contains_span(0xfff, 0x10));
        assert!(r.contains_span(0x2000, 0));
    }

    #[test]
    fn overflowing_range_has_no_end() {
        let r = AddressRange::new(M, u64::MAX, 2, RangeKind::Persistent);
        assert_eq!(r.end(), None);
        assert!(!r.contains(u64::MAX));
        assert!(!r.contains_span(u64::MAX, 1));
    }

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(RangeKind::Undefined.code(), 1);
        assert_eq!(RangeKind::InterleaveSetMirrored.code(), 7);
        assert_eq!(RangeKind::LastUsableBoundary.code(), 12);
        assert!(RangeKind::InterleaveSetSingle.is_interleave_set());
        assert!(!RangeKind::StorageOnly.is_interleave_set());
    }
}
