//! App Direct capacity allocation.
//!
//! An App Direct namespace takes the same DPA window on every member of its
//! interleave set, so a candidate only counts if it is free and inside the set's
//! region on all members at once:
//!
//! ```text
//! member 0  ──┬──── free ─────────────┬──┬──── free ──────┬──
//! member 1  ──────┬──── free ───────────────┬─────────────────
//!                 ├── replicated ─────┤
//! ```
//!
//! Candidate starts are the starts of every member's free ranges, clipped to
//! that member's region.

use crate::NamespaceError;
use crate::memmap::{FreeCapacityKind, free_map};
use crate::namespace::Namespace;
use crate::policy::alignment_for;
use crate::topology::{InterleaveSet, InterleaveSetId, Module, Topology};
use alloc::vec::Vec;
use pmem_range::{AddressRange, ModuleId};

/// Requested namespace size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Total bytes over all members; rounded up per member.
    Bytes(u64),
    /// The largest replicated window available.
    Max,
}

/// The part of a new namespace placed on one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub module: ModuleId,
    pub dpa: u64,
    pub size: u64,
}

struct Member<'a> {
    module: &'a Module,
    window: (u64, u64),
    free: Vec<AddressRange>,
}

impl Member<'_> {
    /// End of the free window starting at `start`, clipped to the region.
    fn free_end(&self, start: u64) -> Option<u64> {
        let (window_start, window_end) = self.window;
        if start < window_start || start >= window_end {
            return None;
        }
        let range = self.free.iter().find(|r| r.contains(start))?;
        range.end().map(|end| end.min(window_end))
    }
}

/// Per-member share of a `total`-byte namespace over `members` modules.
///
/// The share is `ceil(total / members)`, rounded up to the alignment tier of `total`.
///
/// # Errors
/// - [`NamespaceError::InvalidTopology`] for zero members.
/// - [`NamespaceError::OutOfResources`] if rounding overflows.
pub fn aligned_share(total: u64, members: usize) -> Result<u64, NamespaceError> {
    let n = u64::try_from(members).map_err(|_| NamespaceError::OutOfResources)?;
    if n == 0 {
        return Err(NamespaceError::InvalidTopology("interleave set without regions"));
    }
    total
        .div_ceil(n)
        .checked_next_multiple_of(alignment_for(total))
        .ok_or(NamespaceError::OutOfResources)
}

fn members<'a>(
    topology: &'a Topology,
    namespaces: &[Namespace],
    set: &InterleaveSet,
) -> Result<Vec<Member<'a>>, NamespaceError> {
    let mut out = Vec::with_capacity(set.regions.len());
    for (module, window) in topology.windows(set)? {
        let free = free_map(
            module,
            topology.interleave_sets(),
            namespaces,
            FreeCapacityKind::AppDirect,
        )?;
        if free.is_empty() {
            log::debug!("module {}: no free App Direct capacity", module.id);
            return Err(NamespaceError::NotFound { set: set.id });
        }
        out.push(Member {
            module,
            window,
            free,
        });
    }
    if out.is_empty() {
        return Err(NamespaceError::InvalidTopology("interleave set without regions"));
    }
    Ok(out)
}

/// Candidate starts and the replicated window length behind each, in DPA order.
fn candidates(members: &[Member<'_>]) -> Vec<(u64, u64)> {
    let mut starts: Vec<u64> = members
        .iter()
        .flat_map(|m| m.free.iter().map(|r| r.start.max(m.window.0)))
        .collect();
    starts.sort_unstable();
    starts.dedup();

    starts
        .into_iter()
        .filter_map(|start| {
            let end = members
                .iter()
                .map(|m| m.free_end(start))
                .try_fold(u64::MAX, |acc, end| end.map(|e| acc.min(e)))?;
            (end > start).then_some((start, end - start))
        })
        .collect()
}

/// First candidate, in ascending DPA order, that fits `share` on every member.
fn fixed(members: &[Member<'_>], share: u64) -> Option<u64> {
    candidates(members)
        .into_iter()
        .find(|&(_, len)| len >= share)
        .map(|(start, _)| start)
}

/// Largest replicated window, aligned down to the tier of its total size.
fn largest(members: &[Member<'_>]) -> Option<(u64, u64)> {
    let n = u64::try_from(members.len()).ok()?;
    let (start, len) = candidates(members)
        .into_iter()
        .reduce(|best, c| if c.1 > best.1 { c } else { best })?;
    let align = alignment_for(len.saturating_mul(n));
    let size = len - len % align;
    (size > 0).then_some((start, size))
}

/// Place a new App Direct namespace in interleave set `set_id`.
///
/// `namespaces` are the currently registered namespaces; their ranges are occupied.
/// Returns one extent per member in region order, all with the same DPA and size.
///
/// # Errors
/// - [`NamespaceError::UnknownInterleaveSet`] if `set_id` is not in `topology`.
/// - [`NamespaceError::NotReady`] if the set is not healthy.
/// - [`NamespaceError::InvalidParameter`] for a zero-byte request.
/// - [`NamespaceError::NotFound`] if no replicated window is large enough.
/// - [`NamespaceError::OutOfResources`] if aligning the request overflows.
pub fn allocate(
    topology: &Topology,
    namespaces: &[Namespace],
    set_id: InterleaveSetId,
    capacity: Capacity,
) -> Result<Vec<Extent>, NamespaceError> {
    let set = topology
        .interleave_set(set_id)
        .ok_or(NamespaceError::UnknownInterleaveSet(set_id))?;
    if !set.is_healthy() {
        return Err(NamespaceError::NotReady {
            set: set_id,
            state: set.state,
        });
    }
    if capacity == Capacity::Bytes(0) {
        return Err(NamespaceError::InvalidParameter("requested capacity is zero"));
    }

    let members = members(topology, namespaces, set)?;
    let (dpa, size) = match capacity {
        Capacity::Bytes(total) => {
            let share = aligned_share(total, members.len())?;
            let allocated = u64::try_from(members.len())
                .ok()
                .and_then(|n| share.checked_mul(n));
            if allocated != Some(total) {
                log::warn!(
                    "{total} bytes rounded up to {share} bytes on each of {} modules",
                    members.len()
                );
            }
            let dpa = fixed(&members, share).ok_or(NamespaceError::NotFound { set: set_id })?;
            (dpa, share)
        }
        Capacity::Max => largest(&members).ok_or(NamespaceError::NotFound { set: set_id })?,
    };

    log::debug!(
        "interleave set {set_id}: {} x {size:#x} bytes at DPA {dpa:#x}",
        members.len()
    );
    Ok(members
        .iter()
        .map(|m| Extent {
            module: m.module.id,
            dpa,
            size,
        })
        .collect())
}

/// Smallest and largest App Direct namespace that set `set_id` can take right now.
///
/// Both are totals over all members; `(0, 0)` if not even `min_size` per member fits.
///
/// # Errors
/// As [`allocate`], except that missing capacity yields `(0, 0)`.
pub fn app_direct_bounds(
    topology: &Topology,
    namespaces: &[Namespace],
    set_id: InterleaveSetId,
    min_size: u64,
) -> Result<(u64, u64), NamespaceError> {
    let extents = match allocate(topology, namespaces, set_id, Capacity::Max) {
        Ok(extents) => extents,
        Err(NamespaceError::NotFound { .. }) => return Ok((0, 0)),
        Err(e) => return Err(e),
    };
    let n = u64::try_from(extents.len()).map_err(|_| NamespaceError::OutOfResources)?;
    let max = extents
        .first()
        .and_then(|e| e.size.checked_mul(n))
        .ok_or(NamespaceError::OutOfResources)?;
    let min = min_size
        .checked_mul(n)
        .ok_or(NamespaceError::OutOfResources)?;
    Ok(if min > max { (0, 0) } else { (min, max) })
}
