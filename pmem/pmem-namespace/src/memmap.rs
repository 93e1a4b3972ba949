//! Per-module memory maps and free-capacity maps.
//!
//! A memory map labels every part of one module's DPA space. It is rebuilt from
//! the topology snapshot and the registered namespaces on every query:
//!
//! ```text
//! 0      volatile_start       pm_start                          pm_end     raw
//! ├─ Reserved ─┼── Volatile ───┼──────────── Persistent ───────────┼─ Reserved ─┤
//!                              ├─ StorageOnly ─┼─ InterleaveSet ─┼─ StorageOnly ─┤
//!                                              ├─ Namespace ─┤                 ▲
//!                                                                   LastUsableBoundary
//! ```
//!
//! Ranges overlap on purpose; [`free_map`] resolves them with the range algebra.

use crate::NamespaceError;
use crate::namespace::Namespace;
use crate::topology::{InterleaveSet, Module};
use alloc::vec::Vec;
use pmem_range::{AddressRange, RangeKind, insert_sorted, subtract};

/// What a free-capacity query is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeCapacityKind {
    PersistentRegion,
    StMode,
    /// Persistent space outside every interleave set.
    StModeOnStOnly,
    MirrorRegion,
    AppDirect,
    StModeOnInterleaved,
    StModeOnNotInterleaved,
}

impl FreeCapacityKind {
    /// Range kinds that provide capacity and those that take it away again.
    ///
    /// Namespaces of either type are always occupied and not listed here.
    const fn classes(self) -> (&'static [RangeKind], &'static [RangeKind]) {
        use RangeKind::{InterleaveSet, InterleaveSetMirrored, InterleaveSetSingle, Persistent};
        match self {
            Self::PersistentRegion | Self::StMode => (&[Persistent], &[InterleaveSetMirrored]),
            Self::StModeOnStOnly => (
                &[Persistent],
                &[InterleaveSetMirrored, InterleaveSet, InterleaveSetSingle],
            ),
            Self::MirrorRegion => (&[InterleaveSetMirrored], &[]),
            Self::AppDirect => (
                &[InterleaveSetMirrored, InterleaveSet, InterleaveSetSingle],
                &[],
            ),
            Self::StModeOnInterleaved => (&[InterleaveSet], &[]),
            Self::StModeOnNotInterleaved => (&[InterleaveSetSingle], &[]),
        }
    }
}

/// Build the memory map of `module`.
///
/// # Errors
/// - [`NamespaceError::InvalidTopology`] if any interleave set has no regions or a
///   region window overflows.
pub fn module_memmap(
    module: &Module,
    sets: &[InterleaveSet],
    namespaces: &[Namespace],
) -> Result<Vec<AddressRange>, NamespaceError> {
    let id = module.id;
    let g = &module.geometry;
    let mut map = Vec::new();

    if g.volatile_start > 0 {
        insert_sorted(&mut map, AddressRange::new(id, 0, g.volatile_start, RangeKind::Reserved));
    }
    if g.volatile_capacity > 0 {
        insert_sorted(
            &mut map,
            AddressRange::new(id, g.volatile_start, g.volatile_capacity, RangeKind::Volatile),
        );
    }
    if g.pm_capacity > 0 {
        insert_sorted(
            &mut map,
            AddressRange::new(id, g.pm_start, g.pm_capacity, RangeKind::Persistent),
        );
    }

    let used = g
        .volatile_start
        .saturating_add(g.volatile_capacity)
        .saturating_add(g.pm_capacity);
    let tail = g.raw_capacity.saturating_sub(used);
    if tail > 0 {
        insert_sorted(&mut map, AddressRange::new(id, used, tail, RangeKind::Reserved));
    }

    let mut storage_only = Vec::new();
    if g.pm_capacity > 0 {
        storage_only.push(AddressRange::new(
            id,
            g.pm_start,
            g.pm_capacity,
            RangeKind::StorageOnly,
        ));
    }

    for set in sets {
        if set.regions.is_empty() {
            log::warn!("interleave set {} has no regions", set.id);
            return Err(NamespaceError::InvalidTopology("interleave set without regions"));
        }
        let kind = set.range_kind();
        for region in set.regions.iter().filter(|r| r.module == id) {
            let (start, end) = region
                .window(module)
                .ok_or(NamespaceError::InvalidTopology("region window overflows"))?;
            insert_sorted(
                &mut map,
                AddressRange::new(id, start, region.partition_size, kind),
            );
            if !carve(&mut storage_only, start, end) {
                log::warn!(
                    "module {id}: region [{start:#x}, {end:#x}) of interleave set {} \
                     does not fit into a storage-only range",
                    set.id
                );
            }
        }
    }

    for range in storage_only {
        insert_sorted(&mut map, range);
    }

    for ns in namespaces {
        let kind = ns.kind.range_kind();
        for r in ns.ranges_on(id) {
            insert_sorted(&mut map, AddressRange::new(id, r.dpa, r.size, kind));
        }
    }

    let pm_end = g.pm_start.saturating_add(g.pm_capacity);
    insert_sorted(
        &mut map,
        AddressRange::new(id, pm_end, 0, RangeKind::LastUsableBoundary),
    );

    Ok(map)
}

/// Remove `[start, end)` from the first range of `list` that fully contains it.
///
/// Returns `false`, leaving `list` untouched, if no single range contains it.
fn carve(list: &mut Vec<AddressRange>, start: u64, end: u64) -> bool {
    let found = list.iter().enumerate().find_map(|(i, r)| {
        let r_end = r.end()?;
        (start >= r.start && end <= r_end).then_some((i, *r, r_end))
    });
    let Some((i, r, r_end)) = found else {
        return false;
    };

    match (start == r.start, end == r_end) {
        (true, true) => {
            list.remove(i);
        }
        (true, false) => {
            list[i] = AddressRange::new(r.owner, end, r_end - end, r.kind);
        }
        (false, true) => {
            list[i].length = start - r.start;
        }
        (false, false) => {
            list[i].length = start - r.start;
            list.insert(i + 1, AddressRange::new(r.owner, end, r_end - end, r.kind));
        }
    }
    true
}

/// Free capacity of `module` for `kind`, in ascending DPA order.
///
/// # Errors
/// See [`module_memmap`]; range algebra errors are passed through.
pub fn free_map(
    module: &Module,
    sets: &[InterleaveSet],
    namespaces: &[Namespace],
    kind: FreeCapacityKind,
) -> Result<Vec<AddressRange>, NamespaceError> {
    let map = module_memmap(module, sets, namespaces)?;
    let (usable_kinds, occupied_kinds) = kind.classes();

    let usable: Vec<AddressRange> = map
        .iter()
        .filter(|r| usable_kinds.contains(&r.kind))
        .copied()
        .collect();
    let occupied: Vec<AddressRange> = map
        .iter()
        .filter(|r| r.kind.is_namespace() || occupied_kinds.contains(&r.kind))
        .copied()
        .collect();

    let free = subtract(&usable, &occupied)?;
    if free.anomalies > 0 {
        log::warn!(
            "module {}: {} malformed range(s) ignored in {kind:?} free map",
            module.id,
            free.anomalies
        );
    }
    Ok(free.ranges)
}
