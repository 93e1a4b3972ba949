//! Label insert, modify and remove.
//!
//! Every operation reads the area afresh, stages its changes against the next
//! index block and writes back last. Validation failures never touch the media.

use crate::area::Lsa;
use crate::guid::Guid;
use crate::label::{LabelChanges, NamespaceLabel};
use crate::layout::LabelVersion;
use crate::storage::LabelStorage;
use crate::LsaError;
use alloc::vec::Vec;

/// Insert `labels`, each into the lowest free slot, and return their slots.
///
/// A blank area is first initialized with `fresh_version`. At least one slot
/// must stay free after the insert.
///
/// # Errors
/// - [`LsaError::OutOfResources`] if fewer than `labels.len() + 1` slots are free.
/// - Anything [`Lsa::read`] or [`Lsa::commit`] reports.
pub fn insert<S: LabelStorage + ?Sized>(
    storage: &mut S,
    labels: &[NamespaceLabel],
    fresh_version: LabelVersion,
) -> Result<Vec<u32>, LsaError> {
    let mut lsa = Lsa::read_or_initialize(storage, fresh_version)?;

    let available = lsa.free_slot_count();
    let needed = u32::try_from(labels.len())
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or(LsaError::InvalidParameter("too many labels"))?;
    if available < needed {
        log::debug!("too few free label slots: {available} free, {needed} needed");
        return Err(LsaError::OutOfResources { needed, available });
    }

    let mut update = lsa.begin();
    let slots = labels
        .iter()
        .map(|label| update.place(*label))
        .collect::<Result<Vec<_>, _>>()?;
    lsa.commit(storage, update)?;

    log::info!("inserted {} label(s) into slots {slots:?}", slots.len());
    Ok(slots)
}

/// Move the label at `slot` to the first free slot, applying `changes`.
///
/// Returns the new slot.
///
/// # Errors
/// - [`LsaError::InvalidParameter`] if `slot` holds no label.
/// - [`LsaError::OutOfResources`] if no slot is free.
/// - Anything [`Lsa::read`] or [`Lsa::commit`] reports.
pub fn modify<S: LabelStorage + ?Sized>(
    storage: &mut S,
    slot: u32,
    changes: &LabelChanges,
) -> Result<u32, LsaError> {
    let mut lsa = Lsa::read(storage)?;
    let mut label = *lsa
        .label(slot)
        .ok_or(LsaError::InvalidParameter("label slot is not in use"))?;
    if lsa.free_slot_count() == 0 {
        return Err(LsaError::OutOfResources {
            needed: 1,
            available: 0,
        });
    }

    changes.apply_to(&mut label);
    let mut update = lsa.begin();
    let moved = update.place(label)?;
    update.release(slot)?;
    lsa.commit(storage, update)?;

    log::info!("modified label {}: slot {slot} -> {moved}", label.uuid);
    Ok(moved)
}

/// Apply `changes` to every label of namespace `uuid`, moving each to a free slot.
///
/// Returns the number of labels changed.
///
/// # Errors
/// - [`LsaError::OutOfResources`] if there are fewer free slots than labels to move.
/// - Anything [`Lsa::read`] or [`Lsa::commit`] reports.
pub fn modify_by_uuid<S: LabelStorage + ?Sized>(
    storage: &mut S,
    uuid: &Guid,
    changes: &LabelChanges,
) -> Result<usize, LsaError> {
    let mut lsa = Lsa::read(storage)?;
    let matching: Vec<(u32, NamespaceLabel)> = lsa
        .labels()
        .iter()
        .filter(|(_, label)| label.uuid == *uuid)
        .map(|(slot, label)| (slot, *label))
        .collect();
    if matching.is_empty() {
        return Ok(0);
    }

    let available = lsa.free_slot_count();
    let needed = u32::try_from(matching.len()).unwrap_or(u32::MAX);
    if available < needed {
        return Err(LsaError::OutOfResources { needed, available });
    }

    let mut update = lsa.begin();
    for (slot, mut label) in matching.iter().copied() {
        changes.apply_to(&mut label);
        update.place(label)?;
        update.release(slot)?;
    }
    lsa.commit(storage, update)?;

    log::info!("modified {} label(s) of namespace {uuid}", matching.len());
    Ok(matching.len())
}

/// Free every label of namespace `uuid`, optionally only the one at `dpa`.
///
/// Returns the number of labels removed; nothing is written if none match.
///
/// # Errors
/// Anything [`Lsa::read`] or [`Lsa::commit`] reports.
pub fn remove<S: LabelStorage + ?Sized>(
    storage: &mut S,
    uuid: &Guid,
    dpa: Option<u64>,
) -> Result<usize, LsaError> {
    let mut lsa = Lsa::read(storage)?;
    let slots: Vec<u32> = lsa
        .labels()
        .iter()
        .filter(|(_, label)| label.uuid == *uuid && dpa.is_none_or(|d| d == label.dpa))
        .map(|(slot, _)| slot)
        .collect();
    if slots.is_empty() {
        log::debug!("no label of namespace {uuid} to remove");
        return Ok(0);
    }

    let mut update = lsa.begin();
    for &slot in &slots {
        update.release(slot)?;
    }
    lsa.commit(storage, update)?;

    log::info!("removed label(s) of namespace {uuid} from slots {slots:?}");
    Ok(slots.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::SPA_RANGE_PM_REGION;
    use crate::label::LabelName;
    use crate::storage::MemStorage;
    use alloc::vec;

    fn label(uuid: u8, dpa: u64) -> NamespaceLabel {
        NamespaceLabel {
            uuid: Guid::from_bytes([uuid; 16]),
            name: LabelName::new("ns").unwrap(),
            nlabel: 1,
            lba_size: 512,
            dpa,
            raw_size: 1 << 30,
            type_guid: SPA_RANGE_PM_REGION,
            ..NamespaceLabel::default()
        }
    }

    #[test]
    fn insert_initializes_blank_storage() {
        let mut mem = MemStorage::new(16 * 1024);
        let slots = insert(&mut mem, &[label(1, 0), label(2, 1 << 30)], LabelVersion::V1_2).unwrap();
        assert_eq!(slots, vec![0, 1]);

        let lsa = Lsa::read(&mut mem).unwrap();
        let stored = lsa.label(1).unwrap();
        assert_eq!(stored.slot, 1);
        assert!(stored.checksum_matches());
        assert_eq!(stored.uuid, Guid::from_bytes([2; 16]));
    }

    #[test]
    fn insert_keeps_one_slot_in_reserve() {
        // 16 KiB of 256-byte labels: 62 slots
        let mut mem = MemStorage::new(16 * 1024);
        let lsa = Lsa::initialize(&mut mem, LabelVersion::V1_2).unwrap();
        let free = lsa.free_slot_count();

        let many = vec![label(9, 0); free as usize];
        assert_eq!(
            insert(&mut mem, &many, LabelVersion::V1_2),
            Err(LsaError::OutOfResources {
                needed: free + 1,
                available: free
            })
        );
        assert!(insert(&mut mem, &many[1..], LabelVersion::V1_2).is_ok());
    }

    #[test]
    fn modify_moves_and_reseals() {
        let mut mem = MemStorage::new(16 * 1024);
        insert(&mut mem, &[label(1, 0)], LabelVersion::V1_2).unwrap();

        let changes = LabelChanges::rename(LabelName::new("renamed").unwrap());
        let moved = modify(&mut mem, 0, &changes).unwrap();
        assert_eq!(moved, 1);

        let lsa = Lsa::read(&mut mem).unwrap();
        assert!(lsa.label(0).is_none());
        let stored = lsa.label(1).unwrap();
        assert_eq!(stored.name.as_str(), Some("renamed"));
        assert!(stored.checksum_matches());
        let old = usize::try_from(lsa.geometry().slot_offset(0)).unwrap();
        assert!(mem.bytes()[old..old + 256].iter().all(|&b| b == 0));
    }

    #[test]
    fn modify_of_free_slot_is_rejected() {
        let mut mem = MemStorage::new(16 * 1024);
        Lsa::initialize(&mut mem, LabelVersion::V1_2).unwrap();
        assert_eq!(
            modify(&mut mem, 3, &LabelChanges::default()),
            Err(LsaError::InvalidParameter("label slot is not in use"))
        );
    }

    #[test]
    fn modify_by_uuid_touches_only_matching_labels() {
        let mut mem = MemStorage::new(16 * 1024);
        insert(
            &mut mem,
            &[label(1, 0), label(2, 0), label(1, 1 << 30)],
            LabelVersion::V1_2,
        )
        .unwrap();

        let changes = LabelChanges {
            nlabel: Some(2),
            ..LabelChanges::default()
        };
        let uuid = Guid::from_bytes([1; 16]);
        assert_eq!(modify_by_uuid(&mut mem, &uuid, &changes).unwrap(), 2);

        let lsa = Lsa::read(&mut mem).unwrap();
        for (_, l) in lsa.labels().iter() {
            let want = if l.uuid == uuid { 2 } else { 1 };
            assert_eq!(l.nlabel, want);
        }
        assert_eq!(lsa.labels().len(), 3);
    }

    #[test]
    fn remove_filters_by_dpa() {
        let mut mem = MemStorage::new(16 * 1024);
        insert(&mut mem, &[label(1, 0), label(1, 1 << 30)], LabelVersion::V1_2).unwrap();
        let uuid = Guid::from_bytes([1; 16]);

        assert_eq!(remove(&mut mem, &uuid, Some(1 << 30)).unwrap(), 1);
        let lsa = Lsa::read(&mut mem).unwrap();
        assert_eq!(lsa.used_slots().collect::<Vec<_>>(), vec![0]);

        assert_eq!(remove(&mut mem, &uuid, None).unwrap(), 1);
        assert_eq!(remove(&mut mem, &uuid, None).unwrap(), 0);
        assert!(Lsa::read(&mut mem).unwrap().labels().is_empty());
    }

    #[test]
    fn v1_1_labels_are_not_sealed() {
        let mut mem = MemStorage::new(16 * 1024);
        insert(&mut mem, &[label(1, 0)], LabelVersion::V1_1).unwrap();
        let lsa = Lsa::read(&mut mem).unwrap();
        assert_eq!(lsa.version(), LabelVersion::V1_1);
        assert_eq!(lsa.label(0).unwrap().checksum, 0);
    }
}
