use pmem_lsa::{Guid, LabelStorage, LabelVersion, Lsa, MemStorage, NamespaceLabel, StorageError};
use pmem_namespace::policy::GIB;
use pmem_namespace::{
    Abstraction, Capacity, Context, CreateOptions, DimmRegion, Health, InterleaveSet,
    InterleaveSetId, Module, ModuleGeometry, ModuleIdentity, NamespaceConfig, NamespaceError,
    NamespaceType, StaticTopology,
};
use pmem_range::ModuleId;

const SET: InterleaveSetId = InterleaveSetId(1);
const PART: usize = 64 * 1024;

fn provider() -> StaticTopology {
    let modules: Vec<Module> = (1..=2u16)
        .map(|id| Module {
            id: ModuleId(id),
            geometry: ModuleGeometry {
                raw_capacity: 100 * GIB,
                pm_capacity: 100 * GIB,
                ..ModuleGeometry::default()
            },
            identity: ModuleIdentity {
                serial: 0x1000 + u32::from(id),
                vendor: 0x8089,
                ..ModuleIdentity::default()
            },
            ..Module::default()
        })
        .collect();
    let regions = modules
        .iter()
        .zip([0, 4096])
        .map(|(m, spa)| DimmRegion {
            module: m.id,
            partition_offset: 0,
            partition_size: 100 * GIB,
            spa_region_offset: spa,
        })
        .collect();
    StaticTopology {
        modules,
        sets: vec![InterleaveSet {
            id: SET,
            regions,
            ..InterleaveSet::default()
        }],
    }
}

fn stores() -> Vec<(ModuleId, MemStorage)> {
    vec![
        (ModuleId(1), MemStorage::new(PART)),
        (ModuleId(2), MemStorage::new(PART)),
    ]
}

fn context(stores: Vec<(ModuleId, MemStorage)>, config: NamespaceConfig) -> Context<MemStorage> {
    Context::new(&provider(), stores, config).unwrap()
}

fn labels_on(ctx: &Context<MemStorage>, module: u16) -> Vec<NamespaceLabel> {
    let mut storage = ctx.storage(ModuleId(module)).unwrap().clone();
    match Lsa::read(&mut storage) {
        Ok(lsa) => lsa.labels().iter().map(|(_, label)| *label).collect(),
        Err(_) => Vec::new(),
    }
}

fn uuid(tag: u8) -> CreateOptions {
    CreateOptions::new(Guid::from_bytes([tag; 16]))
}

#[test]
fn create_spreads_one_label_per_member() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    assert!(ctx.namespaces().is_empty());

    let id = ctx
        .create_app_direct(SET, Capacity::Bytes(150 * GIB), "data", uuid(7))
        .unwrap();
    assert_eq!(id.0, 0x0101);

    let cookie = ctx.topology().cookie(SET, LabelVersion::V1_2).unwrap();
    let mut positions = Vec::new();
    for module in 1..=2 {
        let labels = labels_on(&ctx, module);
        assert_eq!(labels.len(), 1);
        let label = labels[0];
        assert_eq!(label.nlabel, 2);
        assert_eq!(label.set_cookie, cookie);
        assert_eq!(label.dpa, 0);
        assert_eq!(label.raw_size, 75 * GIB);
        assert!(label.checksum_matches());
        positions.push(label.position);
    }
    positions.sort_unstable();
    assert_eq!(positions, [0, 1]);

    let ns = ctx.namespace(id).unwrap();
    assert_eq!(ns.kind, NamespaceType::AppDirect);
    assert_eq!(ns.health, Health::Ok);
    assert_eq!(ns.parent, Some(SET));
    assert_eq!(ns.ranges.len(), 2);
    assert_eq!(ns.raw_capacity(), 150 * GIB);
    assert_eq!(ns.name.as_str(), Some("data"));
    assert_eq!(ns.abstraction, Abstraction::Raw);
}

#[test]
fn oversized_request_writes_nothing() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let err = ctx
        .create_app_direct(SET, Capacity::Bytes(201 * GIB), "big", uuid(7))
        .unwrap_err();
    assert_eq!(err, NamespaceError::NotFound { set: SET });
    assert_eq!(ctx.storage(ModuleId(1)).unwrap().writes(), 0);
    assert_eq!(ctx.storage(ModuleId(2)).unwrap().writes(), 0);
}

#[test]
fn second_namespace_takes_the_remaining_capacity() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    ctx.create_app_direct(SET, Capacity::Bytes(150 * GIB), "a", uuid(1))
        .unwrap();
    assert_eq!(ctx.app_direct_size_bounds(SET).unwrap(), (2 * GIB, 50 * GIB));

    let id = ctx
        .create_app_direct(SET, Capacity::Max, "b", uuid(2))
        .unwrap();
    assert_eq!(id.0, 0x0102);
    let ns = ctx.namespace(id).unwrap();
    assert!(ns.ranges.iter().all(|r| r.dpa == 75 * GIB && r.size == 25 * GIB));
    assert_eq!(ctx.app_direct_size_bounds(SET).unwrap(), (0, 0));
}

#[test]
fn namespaces_survive_a_fresh_context() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let id = ctx
        .create_app_direct(SET, Capacity::Bytes(10 * GIB), "keep", uuid(3))
        .unwrap();
    let before = ctx.namespaces().to_vec();

    let reopened = context(ctx.into_stores().into_iter().collect(), NamespaceConfig::default());
    assert_eq!(reopened.namespaces(), before.as_slice());
    assert!(reopened.namespace(id).is_some());
}

#[test]
fn failed_write_rolls_back_written_labels() {
    let mut stores = stores();
    stores[1].1.fail_after_writes(0);
    let mut ctx = context(stores, NamespaceConfig::default());

    let err = ctx
        .create_app_direct(SET, Capacity::Bytes(20 * GIB), "doomed", uuid(4))
        .unwrap_err();
    assert!(matches!(err, NamespaceError::Label { module: ModuleId(2), .. }));
    assert!(labels_on(&ctx, 1).is_empty());
    assert!(labels_on(&ctx, 2).is_empty());
    assert!(ctx.namespaces().is_empty());
}

/// Acknowledges writes below `lost_below` without storing them.
struct LossyStorage {
    inner: MemStorage,
    lost_below: u64,
}

impl LabelStorage for LossyStorage {
    fn partition_size(&self) -> u64 {
        self.inner.partition_size()
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.inner.read(offset, buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StorageError> {
        if offset < self.lost_below {
            return Ok(());
        }
        self.inner.write(offset, data)
    }
}

#[test]
fn incomplete_namespace_after_writing_is_rolled_back() {
    let stores = stores().into_iter().map(|(id, mut inner)| {
        let lsa = Lsa::initialize(&mut inner, LabelVersion::V1_2).unwrap();
        // module 2 loses its index updates, so its label never becomes visible
        let lost_below = if id == ModuleId(2) {
            lsa.geometry().labels_offset()
        } else {
            0
        };
        (id, LossyStorage { inner, lost_below })
    });
    let mut ctx = Context::new(&provider(), stores, NamespaceConfig::default()).unwrap();

    let err = ctx
        .create_app_direct(SET, Capacity::Bytes(20 * GIB), "torn", uuid(10))
        .unwrap_err();
    assert_eq!(err, NamespaceError::DeviceError("created namespace did not assemble"));
    assert!(ctx.namespaces().is_empty());

    let mut module1 = ctx.storage(ModuleId(1)).unwrap().inner.clone();
    assert!(Lsa::read(&mut module1).unwrap().labels().is_empty());
}

#[test]
fn uuid_must_be_fresh_and_non_zero() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    assert_eq!(
        ctx.create_app_direct(SET, Capacity::Max, "z", CreateOptions::new(Guid::ZERO)),
        Err(NamespaceError::InvalidParameter("namespace uuid is zero"))
    );
    ctx.create_app_direct(SET, Capacity::Bytes(GIB * 2), "a", uuid(5))
        .unwrap();
    assert_eq!(
        ctx.create_app_direct(SET, Capacity::Bytes(GIB * 2), "b", uuid(5)),
        Err(NamespaceError::InvalidParameter("namespace uuid already in use"))
    );
}

#[test]
fn long_names_are_rejected() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let name = "n".repeat(64);
    assert!(matches!(
        ctx.create_app_direct(SET, Capacity::Max, &name, uuid(6)),
        Err(NamespaceError::Lsa(_))
    ));
}

#[test]
fn delete_releases_labels_and_capacity() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let id = ctx
        .create_app_direct(SET, Capacity::Bytes(100 * GIB), "gone", uuid(8))
        .unwrap();
    ctx.delete(id).unwrap();

    assert!(ctx.namespaces().is_empty());
    assert!(labels_on(&ctx, 1).is_empty());
    assert!(labels_on(&ctx, 2).is_empty());
    assert_eq!(ctx.app_direct_size_bounds(SET).unwrap(), (2 * GIB, 200 * GIB));
    assert_eq!(ctx.delete(id), Err(NamespaceError::UnknownNamespace(id)));
}

#[test]
fn ids_survive_deleting_another_namespace() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let a = ctx
        .create_app_direct(SET, Capacity::Bytes(20 * GIB), "a", uuid(11))
        .unwrap();
    let b = ctx
        .create_app_direct(SET, Capacity::Bytes(20 * GIB), "b", uuid(12))
        .unwrap();
    assert_eq!((a.0, b.0), (0x0101, 0x0102));

    ctx.delete(a).unwrap();
    assert!(ctx.namespace(a).is_none());
    assert_eq!(ctx.namespace(b).unwrap().uuid, Guid::from_bytes([12; 16]));
    assert_eq!(ctx.delete(a), Err(NamespaceError::UnknownNamespace(a)));

    // the freed ordinal goes to the next namespace
    let c = ctx
        .create_app_direct(SET, Capacity::Bytes(20 * GIB), "c", uuid(13))
        .unwrap();
    assert_eq!(c.0, 0x0101);
    assert_eq!(ctx.namespace(b).unwrap().uuid, Guid::from_bytes([12; 16]));
}

#[test]
fn rename_rewrites_every_member() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let id = ctx
        .create_app_direct(SET, Capacity::Bytes(4 * GIB), "old", uuid(9))
        .unwrap();
    ctx.rename(id, "new").unwrap();

    assert_eq!(ctx.namespace(id).unwrap().name.as_str(), Some("new"));
    for module in 1..=2 {
        let labels = labels_on(&ctx, module);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].name.as_str(), Some("new"));
    }
}

#[test]
fn legacy_label_version_for_blank_storage() {
    let config = NamespaceConfig {
        default_label_version: LabelVersion::V1_1,
        btt_abstraction: true,
        ..NamespaceConfig::default()
    };
    let mut ctx = context(stores(), config);
    let id = ctx
        .create_app_direct(SET, Capacity::Bytes(8 * GIB), "old", uuid(10))
        .unwrap();

    let label = labels_on(&ctx, 1)[0];
    assert_eq!(label.lba_size, 0);
    assert!(label.type_guid.is_zero());
    assert!(label.abstraction_guid.is_zero());
    assert_eq!(
        label.set_cookie,
        ctx.topology().cookie(SET, LabelVersion::V1_1).unwrap()
    );

    let ns = ctx.namespace(id).unwrap();
    assert_eq!(ns.label_version, LabelVersion::V1_1);
    assert_eq!(ns.lba_size, 512);
    assert_eq!(ns.abstraction, Abstraction::Raw);
    assert_eq!(ns.health, Health::Ok);
}

#[test]
fn btt_option_overrides_the_default() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    let options = CreateOptions {
        btt: Some(true),
        ..uuid(11)
    };
    let id = ctx
        .create_app_direct(SET, Capacity::Bytes(8 * GIB), "btt", options)
        .unwrap();
    assert_eq!(ctx.namespace(id).unwrap().abstraction, Abstraction::Btt);
}

#[test]
fn mixed_label_versions_are_refused() {
    let mut stores = stores();
    Lsa::initialize(&mut stores[0].1, LabelVersion::V1_1).unwrap();
    Lsa::initialize(&mut stores[1].1, LabelVersion::V1_2).unwrap();
    let mut ctx = context(stores, NamespaceConfig::default());

    assert_eq!(
        ctx.label_version_for_set(SET),
        Err(NamespaceError::DeviceError(
            "label versions differ within the interleave set"
        ))
    );
    assert!(ctx
        .create_app_direct(SET, Capacity::Bytes(2 * GIB), "mixed", uuid(12))
        .is_err());
    assert!(labels_on(&ctx, 1).is_empty());
}

#[test]
fn initialized_storage_decides_the_label_version() {
    let mut stores = stores();
    Lsa::initialize(&mut stores[0].1, LabelVersion::V1_1).unwrap();
    let mut ctx = context(stores, NamespaceConfig::default());
    assert_eq!(ctx.label_version_for_set(SET), Ok(LabelVersion::V1_1));
    assert_eq!(
        ctx.label_version_for_set(InterleaveSetId(9)),
        Err(NamespaceError::UnknownInterleaveSet(InterleaveSetId(9)))
    );
}

#[test]
fn missing_member_surfaces_as_critical() {
    let mut ctx = context(stores(), NamespaceConfig::default());
    ctx.create_app_direct(SET, Capacity::Bytes(6 * GIB), "half", uuid(13))
        .unwrap();

    let mut stores = ctx.into_stores();
    stores.remove(&ModuleId(2));
    let ctx = context(stores.into_iter().collect(), NamespaceConfig::default());

    let ns = &ctx.namespaces()[0];
    assert_eq!(ns.health, Health::Critical);
    assert_eq!(ns.labels_found, 1);
    assert_eq!(ns.nlabel, 2);
}
