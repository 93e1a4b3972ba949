//! Reassembly of namespaces from the labels of all modules.
//!
//! Labels are visited module by module in slot order. The first valid label of
//! each UUID starts a namespace:
//!
//! * an App Direct namespace collects the matching label of every module,
//!   resolves its parent interleave set through the cookie and checks that its
//!   ranges lie in free App Direct space,
//! * a block namespace consists of the labels of its UUID on that one module.
//!
//! Namespaces assembled earlier in the pass are registered before the next one
//! is resolved; a second namespace over the same capacity finds no parent.

use crate::NamespaceError;
use crate::memmap::{FreeCapacityKind, free_map};
use crate::namespace::{
    Abstraction, Health, Namespace, NamespaceId, NamespaceRange, NamespaceType,
};
use crate::policy::{MAX_NAMESPACES_PER_REGION, normalize_lba};
use crate::topology::{InterleaveSetId, Topology};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use pmem_lsa::guid::is_spa_range_type;
use pmem_lsa::{LabelArea, LabelVersion, Lsa, NamespaceLabel};
use pmem_range::ModuleId;

/// The used labels of one module's label storage area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLabels {
    pub module: ModuleId,
    pub version: LabelVersion,
    /// In slot order.
    pub labels: Vec<NamespaceLabel>,
    pub locked: bool,
}

impl ModuleLabels {
    #[must_use]
    pub fn from_lsa(module: ModuleId, lsa: &Lsa, locked: bool) -> Self {
        Self::from_area(module, lsa.version(), lsa.labels(), locked)
    }

    #[must_use]
    pub fn from_area(module: ModuleId, version: LabelVersion, area: &LabelArea, locked: bool) -> Self {
        Self {
            module,
            version,
            labels: area.iter().map(|(_, label)| *label).collect(),
            locked,
        }
    }
}

/// Structural checks every label must pass before it is considered.
fn is_valid(label: &NamespaceLabel, version: LabelVersion) -> bool {
    if label.raw_size == 0 || label.dpa_end().is_none() {
        return false;
    }
    if label.is_app_direct(version) {
        label.position <= label.nlabel
    } else {
        label.lba_size != 0 && label.position == 0 && label.nlabel == 0
    }
}

enum Parent {
    /// Cookie, member count and containment all match.
    Full(InterleaveSetId),
    /// Cookie matches but the member count does not.
    Partial(InterleaveSetId),
    None,
}

/// Rebuild all namespaces from `stores`.
///
/// Namespace ids take the lowest free ordinal of their region in assembly order.
///
/// # Errors
/// Failures building the free maps used for the containment check.
pub fn assemble(topology: &Topology, stores: &[ModuleLabels]) -> Result<Vec<Namespace>, NamespaceError> {
    reassemble(topology, stores, &[])
}

/// Rebuild all namespaces from `stores`, keeping the ids of `previous`.
///
/// A namespace whose UUID and region match an entry of `previous` keeps that
/// entry's id. The others take the lowest ordinal not in use in their region.
///
/// # Errors
/// See [`assemble`].
pub fn reassemble(
    topology: &Topology,
    stores: &[ModuleLabels],
    previous: &[Namespace],
) -> Result<Vec<Namespace>, NamespaceError> {
    let mut namespaces: Vec<Namespace> = Vec::new();

    for store in stores {
        for label in &store.labels {
            if namespaces.iter().any(|ns| ns.uuid == label.uuid) {
                continue;
            }
            if !is_valid(label, store.version) {
                log::warn!(
                    "module {}: skipping invalid label of namespace {}",
                    store.module,
                    label.uuid
                );
                continue;
            }

            let ns = if label.is_app_direct(store.version) {
                app_direct(topology, stores, &namespaces, store.version, label)?
            } else {
                Some(block(store, label))
            };
            if let Some(ns) = ns {
                namespaces.push(ns);
            }
        }
    }

    assign_ids(&mut namespaces, previous);
    Ok(namespaces)
}

fn app_direct(
    topology: &Topology,
    stores: &[ModuleLabels],
    registered: &[Namespace],
    version: LabelVersion,
    first: &NamespaceLabel,
) -> Result<Option<Namespace>, NamespaceError> {
    let uuid = first.uuid;
    let mut health = Health::Ok;
    let (lba_size, lba_supported) = normalize_lba(first.lba_size);
    if !lba_supported {
        log::warn!("namespace {uuid}: unsupported LBA size {}", first.lba_size);
        health.escalate(Health::Warning);
    }

    let mut members: Vec<(ModuleId, &NamespaceLabel)> = Vec::new();
    for store in stores {
        let mut matching = store
            .labels
            .iter()
            .filter(|l| l.uuid == uuid && l.is_app_direct(store.version));
        let Some(label) = matching.next() else {
            continue;
        };
        if matching.next().is_some() {
            log::warn!("module {}: more than one label of namespace {uuid}", store.module);
            health.escalate(Health::Critical);
            continue;
        }
        if label.flags != first.flags
            || label.lba_size != first.lba_size
            || label.name != first.name
            || label.set_cookie != first.set_cookie
        {
            log::warn!("module {}: label of namespace {uuid} is inconsistent", store.module);
            continue;
        }
        if !is_valid(label, store.version) {
            log::warn!("module {}: label of namespace {uuid} is invalid", store.module);
            continue;
        }
        if store.version.has_checksum() {
            if !label.checksum_matches() {
                log::warn!("module {}: label of namespace {uuid} fails its checksum", store.module);
                health.escalate(Health::Critical);
                continue;
            }
            if !is_spa_range_type(&label.type_guid) {
                log::warn!("module {}: label of namespace {uuid} has an unexpected type", store.module);
                continue;
            }
        }
        if store.locked {
            log::debug!("namespace {uuid} spans locked module {}", store.module);
            health.escalate(Health::Locked);
        }
        members.push((store.module, label));
    }

    if members.is_empty() {
        log::warn!("namespace {uuid}: no usable labels");
        return Ok(None);
    }
    members.sort_by_key(|(_, label)| label.position);
    if members
        .iter()
        .enumerate()
        .any(|(i, (_, label))| usize::from(label.position) != i)
    {
        log::warn!("namespace {uuid}: label positions are duplicated or missing");
        health.escalate(Health::Critical);
    }

    let ranges: Vec<NamespaceRange> = members
        .iter()
        .map(|(module, label)| NamespaceRange {
            module: *module,
            dpa: label.dpa,
            size: label.raw_size,
        })
        .collect();
    let raw = ranges.iter().fold(0u64, |acc, r| acc.saturating_add(r.size));
    let labels_found = u16::try_from(members.len()).unwrap_or(u16::MAX);

    let parent = match find_parent(topology, registered, version, first.set_cookie, &ranges)? {
        Parent::Full(id) => Some(id),
        Parent::Partial(id) => {
            log::warn!("namespace {uuid}: member count does not match interleave set {id}");
            health.escalate(Health::Critical);
            Some(id)
        }
        Parent::None => {
            log::warn!("namespace {uuid}: no interleave set matches its labels");
            health.escalate(Health::Critical);
            None
        }
    };

    if let Some(set) = parent.and_then(|id| topology.interleave_set(id))
        && !set.is_healthy()
    {
        let to = if set.mirrored {
            Health::Warning
        } else {
            Health::Critical
        };
        log::warn!("namespace {uuid}: interleave set {} is {:?}", set.id, set.state);
        health.escalate(to);
    }

    if labels_found != first.nlabel {
        log::warn!(
            "namespace {uuid}: {labels_found} of {} labels found",
            first.nlabel
        );
        health.escalate(Health::Critical);
    }

    log::debug!(
        "assembled App Direct namespace {uuid}: {} range(s), {raw:#x} bytes, {health:?}",
        ranges.len()
    );

    Ok(Some(Namespace {
        id: NamespaceId(0),
        uuid,
        name: first.name,
        kind: NamespaceType::AppDirect,
        ranges,
        parent,
        block_size: 1,
        block_count: raw,
        lba_size,
        health,
        flags: first.flags,
        cookie: first.set_cookie,
        label_version: version,
        abstraction: if version.has_checksum() {
            Abstraction::from_guid(&first.abstraction_guid)
        } else {
            Abstraction::Raw
        },
        labels_found,
        nlabel: first.nlabel,
    }))
}

/// Find the interleave set a namespace with `cookie` and `ranges` belongs to.
fn find_parent(
    topology: &Topology,
    registered: &[Namespace],
    version: LabelVersion,
    cookie: u64,
    ranges: &[NamespaceRange],
) -> Result<Parent, NamespaceError> {
    let mut partial = None;

    for set in topology.interleave_sets() {
        if topology.cookie(set.id, version) != Some(cookie) {
            continue;
        }
        if set.regions.len() != ranges.len() {
            partial.get_or_insert(set.id);
            continue;
        }

        let mut contained = true;
        for region in &set.regions {
            let module = topology
                .module(region.module)
                .ok_or(NamespaceError::UnknownModule(region.module))?;
            let free = free_map(
                module,
                topology.interleave_sets(),
                registered,
                FreeCapacityKind::AppDirect,
            )?;
            let fits = ranges
                .iter()
                .filter(|r| r.module == region.module)
                .any(|r| free.iter().any(|f| f.contains_span(r.dpa, r.size)));
            if !fits {
                log::debug!(
                    "interleave set {}: no free App Direct range on module {} holds the namespace",
                    set.id,
                    region.module
                );
                contained = false;
                break;
            }
        }
        if contained {
            return Ok(Parent::Full(set.id));
        }
    }

    Ok(partial.map_or(Parent::None, Parent::Partial))
}

fn block(store: &ModuleLabels, first: &NamespaceLabel) -> Namespace {
    let mut labels: Vec<&NamespaceLabel> = store
        .labels
        .iter()
        .filter(|l| {
            l.uuid == first.uuid && !l.is_app_direct(store.version) && is_valid(l, store.version)
        })
        .collect();
    labels.sort_by_key(|l| l.dpa);

    let ranges: Vec<NamespaceRange> = labels
        .iter()
        .map(|l| NamespaceRange {
            module: store.module,
            dpa: l.dpa,
            size: l.raw_size,
        })
        .collect();
    let raw = ranges.iter().fold(0u64, |acc, r| acc.saturating_add(r.size));

    let mut health = Health::Ok;
    if store.locked {
        health.escalate(Health::Locked);
    }

    log::debug!(
        "assembled block namespace {} on module {}: {} range(s)",
        first.uuid,
        store.module,
        ranges.len()
    );

    Namespace {
        id: NamespaceId(0),
        uuid: first.uuid,
        name: first.name,
        kind: NamespaceType::Block,
        ranges,
        parent: None,
        block_size: first.lba_size,
        block_count: raw / first.lba_size,
        lba_size: first.lba_size,
        health,
        flags: first.flags,
        cookie: first.set_cookie,
        label_version: store.version,
        abstraction: Abstraction::Raw,
        labels_found: u16::try_from(labels.len()).unwrap_or(u16::MAX),
        nlabel: first.nlabel,
    }
}

/// Give every namespace an id unique within its region.
fn assign_ids(namespaces: &mut Vec<Namespace>, previous: &[Namespace]) {
    let mut used: BTreeMap<InterleaveSetId, BTreeSet<u8>> = BTreeMap::new();
    for ns in namespaces.iter_mut() {
        let region = ns.region();
        let kept = previous
            .iter()
            .find(|p| p.uuid == ns.uuid && p.region() == region)
            .map(|p| p.id)
            .filter(|id| id.ordinal() != 0);
        ns.id = match kept {
            Some(id) if used.entry(region).or_default().insert(id.ordinal()) => id,
            _ => NamespaceId(0),
        };
    }

    namespaces.retain_mut(|ns| {
        if ns.id != NamespaceId(0) {
            return true;
        }
        let region = ns.region();
        let taken = used.entry(region).or_default();
        let id = (1..=MAX_NAMESPACES_PER_REGION)
            .find(|n| !taken.contains(n))
            .and_then(|n| NamespaceId::new(region, n));
        match id {
            Some(id) => {
                taken.insert(id.ordinal());
                ns.id = id;
                true
            }
            None => {
                log::warn!("region {region}: no namespace id left for {}", ns.uuid);
                false
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{
        DimmRegion, InterleaveSet, IsState, Module, ModuleGeometry, ModuleIdentity,
    };
    use alloc::vec;
    use pmem_lsa::guid::{BTT_ABSTRACTION, SPA_RANGE_PM_REGION, SPA_RANGE_VOLATILE_REGION};
    use pmem_lsa::{Guid, LabelFlags, LabelName};

    const G: u64 = 1 << 30;
    const SET: InterleaveSetId = InterleaveSetId(2);

    fn topology(members: u16, mirrored: bool, state: IsState) -> Topology {
        let modules: Vec<Module> = (1..=members)
            .map(|i| Module {
                id: ModuleId(i),
                geometry: ModuleGeometry {
                    raw_capacity: 100 * G,
                    pm_capacity: 100 * G,
                    ..ModuleGeometry::default()
                },
                identity: ModuleIdentity {
                    serial: 0x1000 + u32::from(i),
                    ..ModuleIdentity::default()
                },
                ..Module::default()
            })
            .collect();
        let regions = modules
            .iter()
            .enumerate()
            .map(|(i, m)| DimmRegion {
                module: m.id,
                partition_offset: 0,
                partition_size: 100 * G,
                spa_region_offset: u64::try_from(i).unwrap() * 0x1000,
            })
            .collect();
        let set = InterleaveSet {
            id: SET,
            mirrored,
            state,
            regions,
        };
        Topology::new(modules, vec![set]).unwrap()
    }

    fn ad_label(topo: &Topology, uuid: u8, position: u16, nlabel: u16) -> NamespaceLabel {
        let mut label = NamespaceLabel {
            uuid: Guid::from_bytes([uuid; 16]),
            name: LabelName::new("ad").unwrap(),
            nlabel,
            position,
            set_cookie: topo.cookie(SET, LabelVersion::V1_2).unwrap(),
            lba_size: 4096,
            dpa: 10 * G,
            raw_size: 20 * G,
            type_guid: SPA_RANGE_PM_REGION,
            abstraction_guid: BTT_ABSTRACTION,
            ..NamespaceLabel::default()
        };
        label.seal();
        label
    }

    fn store(module: u16, labels: Vec<NamespaceLabel>) -> ModuleLabels {
        ModuleLabels {
            module: ModuleId(module),
            version: LabelVersion::V1_2,
            labels,
            locked: false,
        }
    }

    #[test]
    fn complete_app_direct_namespace() {
        let topo = topology(2, false, IsState::Healthy);
        let stores = [
            store(1, vec![ad_label(&topo, 1, 0, 2)]),
            store(2, vec![ad_label(&topo, 1, 1, 2)]),
        ];
        let ns = assemble(&topo, &stores).unwrap();
        assert_eq!(ns.len(), 1);
        let ns = &ns[0];
        assert_eq!(ns.id, NamespaceId(0x0201));
        assert_eq!(ns.parent, Some(SET));
        assert_eq!(ns.health, Health::Ok);
        assert_eq!(ns.ranges.len(), 2);
        assert_eq!(ns.block_size, 1);
        assert_eq!(ns.block_count, 40 * G);
        assert_eq!(ns.lba_size, 4096);
        assert_eq!(ns.abstraction, Abstraction::Btt);
        assert_eq!(ns.labels_found, 2);
    }

    #[test]
    fn missing_member_is_critical() {
        let topo = topology(2, false, IsState::Healthy);
        let stores = [store(1, vec![ad_label(&topo, 1, 0, 2)]), store(2, vec![])];
        let ns = assemble(&topo, &stores).unwrap();
        // the member count no longer matches the set: partial parent
        assert_eq!(ns[0].parent, Some(SET));
        assert_eq!(ns[0].health, Health::Critical);
        assert_eq!(ns[0].labels_found, 1);
    }

    #[test]
    fn unknown_cookie_surfaces_under_region_zero() {
        let topo = topology(1, false, IsState::Healthy);
        let mut label = ad_label(&topo, 1, 0, 1);
        label.set_cookie ^= 1;
        label.seal();
        let ns = assemble(&topo, &[store(1, vec![label])]).unwrap();
        assert_eq!(ns[0].parent, None);
        assert_eq!(ns[0].id, NamespaceId(0x0001));
        assert_eq!(ns[0].health, Health::Critical);
    }

    #[test]
    fn overlapping_namespaces_do_not_share_a_parent() {
        let topo = topology(1, false, IsState::Healthy);
        let stores = [store(
            1,
            vec![ad_label(&topo, 1, 0, 1), ad_label(&topo, 2, 0, 1)],
        )];
        let ns = assemble(&topo, &stores).unwrap();
        assert_eq!(ns[0].parent, Some(SET));
        assert_eq!(ns[0].health, Health::Ok);
        // same extent again: containment fails, so no parent
        assert_eq!(ns[1].parent, None);
        assert_eq!(ns[1].health, Health::Critical);
    }

    #[test]
    fn corrupted_member_is_dropped_and_critical() {
        let topo = topology(2, false, IsState::Healthy);
        let mut bad = ad_label(&topo, 1, 1, 2);
        bad.checksum ^= 1;
        let stores = [
            store(1, vec![ad_label(&topo, 1, 0, 2)]),
            store(2, vec![bad]),
        ];
        let ns = assemble(&topo, &stores).unwrap();
        assert_eq!(ns[0].ranges.len(), 1);
        assert_eq!(ns[0].health, Health::Critical);
    }

    #[test]
    fn inconsistent_member_is_skipped() {
        let topo = topology(2, false, IsState::Healthy);
        let mut other = ad_label(&topo, 1, 1, 2);
        other.name = LabelName::new("other").unwrap();
        other.seal();
        let stores = [store(1, vec![ad_label(&topo, 1, 0, 2)]), store(2, vec![other])];
        let ns = assemble(&topo, &stores).unwrap();
        assert_eq!(ns[0].labels_found, 1);
        assert_eq!(ns[0].health, Health::Critical);
    }

    #[test]
    fn duplicate_labels_on_one_module() {
        let topo = topology(2, false, IsState::Healthy);
        let stores = [
            store(1, vec![ad_label(&topo, 1, 0, 2)]),
            store(2, vec![ad_label(&topo, 1, 1, 2), ad_label(&topo, 1, 1, 2)]),
        ];
        let ns = assemble(&topo, &stores).unwrap();
        assert_eq!(ns[0].ranges.len(), 1);
        assert_eq!(ns[0].health, Health::Critical);
    }

    #[test]
    fn positions_must_cover_every_member() {
        let topo = topology(2, false, IsState::Healthy);
        for second in [0, 2] {
            let stores = [
                store(1, vec![ad_label(&topo, 1, 0, 2)]),
                store(2, vec![ad_label(&topo, 1, second, 2)]),
            ];
            let ns = assemble(&topo, &stores).unwrap();
            assert_eq!(ns[0].labels_found, 2);
            assert_eq!(ns[0].parent, Some(SET));
            assert_eq!(ns[0].health, Health::Critical, "second label at {second}");
        }
    }

    #[test]
    fn degraded_parent() {
        let topo = topology(1, true, IsState::DimmMissing);
        let ns = assemble(&topo, &[store(1, vec![ad_label(&topo, 1, 0, 1)])]).unwrap();
        assert_eq!(ns[0].health, Health::Warning);

        let topo = topology(1, false, IsState::DimmMissing);
        let ns = assemble(&topo, &[store(1, vec![ad_label(&topo, 1, 0, 1)])]).unwrap();
        assert_eq!(ns[0].health, Health::Critical);
    }

    #[test]
    fn locked_module_and_odd_lba() {
        let topo = topology(1, false, IsState::Healthy);
        let mut label = ad_label(&topo, 1, 0, 1);
        label.lba_size = 520;
        label.seal();
        let mut s = store(1, vec![label]);
        let ns = assemble(&topo, &[s.clone()]).unwrap();
        assert_eq!(ns[0].health, Health::Warning);
        assert_eq!(ns[0].lba_size, 512);

        s.locked = true;
        let ns = assemble(&topo, &[s]).unwrap();
        assert_eq!(ns[0].health, Health::Locked);
    }

    #[test]
    fn block_namespace_stays_on_its_module() {
        let topo = topology(1, false, IsState::Healthy);
        let block_label = |dpa| {
            let mut l = NamespaceLabel {
                uuid: Guid::from_bytes([7; 16]),
                lba_size: 512,
                dpa,
                raw_size: G,
                type_guid: SPA_RANGE_VOLATILE_REGION,
                ..NamespaceLabel::default()
            };
            l.seal();
            l
        };
        let stores = [store(1, vec![block_label(3 * G), block_label(G)])];
        let ns = assemble(&topo, &stores).unwrap();
        assert_eq!(ns.len(), 1);
        assert_eq!(ns[0].kind, NamespaceType::Block);
        assert_eq!(ns[0].id, NamespaceId(0x0001));
        assert_eq!(ns[0].ranges[0].dpa, G);
        assert_eq!(ns[0].block_count, 2 * G / 512);
    }

    #[test]
    fn invalid_labels_are_ignored() {
        let topo = topology(1, false, IsState::Healthy);
        let mut empty = ad_label(&topo, 1, 0, 1);
        empty.raw_size = 0;
        empty.seal();
        let mut v1_1_local = ad_label(&topo, 2, 0, 1);
        v1_1_local.flags = LabelFlags::new().with_local(true);
        let stores = [
            store(1, vec![empty]),
            ModuleLabels {
                module: ModuleId(1),
                version: LabelVersion::V1_1,
                labels: vec![v1_1_local],
                locked: false,
            },
        ];
        // the local v1.1 label is a block label with nlabel != 0
        assert!(assemble(&topo, &stores).unwrap().is_empty());
    }

    #[test]
    fn ids_are_numbered_per_region() {
        let mut list: Vec<Namespace> = Vec::new();
        let topo = topology(1, false, IsState::Healthy);
        let stores = [store(1, vec![ad_label(&topo, 1, 0, 1)])];
        let template = assemble(&topo, &stores).unwrap().remove(0);
        for (i, parent) in [Some(SET), None, Some(SET)].into_iter().enumerate() {
            list.push(Namespace {
                uuid: Guid::from_bytes([u8::try_from(i).unwrap(); 16]),
                parent,
                ..template.clone()
            });
        }
        assign_ids(&mut list, &[]);
        let ids: Vec<u16> = list.iter().map(|ns| ns.id.0).collect();
        assert_eq!(ids, vec![0x0201, 0x0001, 0x0202]);
    }

    #[test]
    fn surviving_namespaces_keep_their_ids() {
        let topo = topology(1, false, IsState::Healthy);
        let stores = [store(1, vec![ad_label(&topo, 1, 0, 1)])];
        let template = assemble(&topo, &stores).unwrap().remove(0);
        let named = |tag: u8| Namespace {
            uuid: Guid::from_bytes([tag; 16]),
            ..template.clone()
        };

        let mut before = vec![named(1), named(2), named(3)];
        assign_ids(&mut before, &[]);
        assert_eq!(before[1].id, NamespaceId(0x0202));

        // the first namespace is gone, a new one shows up ahead of the others
        let mut after = vec![named(4), named(2), named(3)];
        assign_ids(&mut after, &before);
        let ids: Vec<u16> = after.iter().map(|ns| ns.id.0).collect();
        assert_eq!(ids, vec![0x0201, 0x0202, 0x0203]);

        let mut deleted = vec![named(2), named(3)];
        assign_ids(&mut deleted, &before);
        let ids: Vec<u16> = deleted.iter().map(|ns| ns.id.0).collect();
        assert_eq!(ids, vec![0x0202, 0x0203]);
    }

    #[test]
    fn region_runs_out_of_ids() {
        let topo = topology(1, false, IsState::Healthy);
        let stores = [store(1, vec![ad_label(&topo, 1, 0, 1)])];
        let template = assemble(&topo, &stores).unwrap().remove(0);
        let mut list: Vec<Namespace> = (0..=u16::from(MAX_NAMESPACES_PER_REGION))
            .map(|i| {
                let mut uuid = [0u8; 16];
                uuid[..2].copy_from_slice(&i.to_le_bytes());
                Namespace {
                    uuid: Guid::from_bytes(uuid),
                    ..template.clone()
                }
            })
            .collect();
        assign_ids(&mut list, &[]);
        assert_eq!(list.len(), usize::from(MAX_NAMESPACES_PER_REGION));
        assert_eq!(list.last().map(|ns| ns.id), Some(NamespaceId(0x02FF)));
    }
}
