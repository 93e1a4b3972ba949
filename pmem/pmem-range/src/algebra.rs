use crate::{AddressRange, RangeError, RangeKind};
use alloc::vec::Vec;

/// Result of a coalescing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coalesced {
    /// Non-overlapping ranges in ascending start order.
    pub ranges: Vec<AddressRange>,
    /// Number of input ranges dropped because their end overflowed `u64`.
    pub anomalies: usize,
}

impl Coalesced {
    /// Total number of bytes covered.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.ranges
            .iter()
            .fold(0u64, |acc, r| acc.saturating_add(r.length))
    }
}

/// Insert `range` into the start-ordered `list`.
///
/// Ranges with an equal start keep their insertion order: the new range goes
/// after all existing ranges starting at the same address. No merging is done.
pub fn insert_sorted(list: &mut Vec<AddressRange>, range: AddressRange) {
    let at = list.partition_point(|r| r.start <= range.start);
    list.insert(at, range);
}

/// Stable sort by start address.
pub fn sort_by_start(list: &mut [AddressRange]) {
    list.sort_by_key(|r| r.start);
}

#[must_use]
pub fn is_sorted(list: &[AddressRange]) -> bool {
    list.is_sorted_by_key(|r| r.start)
}

fn check_sorted(list: &[AddressRange]) -> Result<(), RangeError> {
    match list.windows(2).position(|w| w[1].start < w[0].start) {
        Some(i) => Err(RangeError::Unsorted { index: i + 1 }),
        None => Ok(()),
    }
}

/// Coalesce a start-ordered list into non-overlapping ranges.
///
/// Overlapping and touching ranges are joined. Merged output ranges carry
/// [`RangeKind::Undefined`] and the owner of the first range of each run.
/// Zero-length ranges cover no addresses and are not emitted.
///
/// # Errors
/// [`RangeError::Unsorted`] if `list` is not ordered by start address.
pub fn merge(list: &[AddressRange]) -> Result<Coalesced, RangeError> {
    check_sorted(list)?;

    let mut out = Coalesced::default();
    // (owner, start, exclusive end)
    let mut acc: Option<(crate::ModuleId, u64, u64)> = None;

    for range in list {
        let Some(end) = range.end() else {
            log::warn!("dropping range with overflowing end: {range}");
            out.anomalies += 1;
            continue;
        };
        if range.is_empty() {
            continue;
        }

        acc = match acc {
            Some((owner, start, acc_end)) if range.start <= acc_end => {
                Some((owner, start, acc_end.max(end)))
            }
            Some((owner, start, acc_end)) => {
                out.ranges.push(AddressRange::new(
                    owner,
                    start,
                    acc_end - start,
                    RangeKind::Undefined,
                ));
                Some((range.owner, range.start, end))
            }
            None => Some((range.owner, range.start, end)),
        };
    }

    if let Some((owner, start, end)) = acc {
        out.ranges.push(AddressRange::new(
            owner,
            start,
            end - start,
            RangeKind::Undefined,
        ));
    }
    Ok(out)
}

/// Compute `usable − occupied`.
///
/// Both inputs are merged first, so they may overlap internally. Every maximal gap
/// is emitted as a [`RangeKind::Free`] range owned by the usable range it came from.
/// Anomalies from both merges are summed.
///
/// # Errors
/// [`RangeError::Unsorted`] if either input is not ordered by start address.
pub fn subtract(
    usable: &[AddressRange],
    occupied: &[AddressRange],
) -> Result<Coalesced, RangeError> {
    let usable = merge(usable)?;
    let occupied = merge(occupied)?;

    let mut out = Coalesced {
        ranges: Vec::new(),
        anomalies: usable.anomalies + occupied.anomalies,
    };

    // Occupied ranges ending before the current usable range can never matter
    // again because both lists are sorted.
    let mut first = 0;

    for u in &usable.ranges {
        // merge() only emits ranges whose end fits.
        let u_end = u.start + u.length;
        let mut free_start = u.start;

        while first < occupied.ranges.len() {
            let o = &occupied.ranges[first];
            if o.start + o.length <= u.start {
                first += 1;
            } else {
                break;
            }
        }

        for o in &occupied.ranges[first..] {
            let o_end = o.start + o.length;
            if o.start >= u_end {
                break;
            }
            if o.start > free_start {
                out.ranges.push(AddressRange::new(
                    u.owner,
                    free_start,
                    o.start - free_start,
                    RangeKind::Free,
                ));
            }
            free_start = free_start.max(o_end);
            if free_start >= u_end {
                break;
            }
        }

        if free_start < u_end {
            out.ranges.push(AddressRange::new(
                u.owner,
                free_start,
                u_end - free_start,
                RangeKind::Free,
            ));
        }
    }

    Ok(out)
}
