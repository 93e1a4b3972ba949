//! The namespace management context.
//!
//! A [`Context`] owns the topology snapshot, one [`LabelStorage`] per module and
//! the namespaces assembled from them. Every mutation writes labels first and
//! rebuilds the namespace list from media afterwards.

use crate::NamespaceError;
use crate::allocator::{Capacity, allocate, app_direct_bounds};
use crate::assembly::{ModuleLabels, reassemble};
use crate::namespace::{Namespace, NamespaceId};
use crate::policy::{LBA_SIZE_4K, NamespaceConfig};
use crate::topology::{InterleaveSetId, Topology, TopologyProvider};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use pmem_lsa::guid::{BTT_ABSTRACTION, SPA_RANGE_PM_REGION};
use pmem_lsa::lifecycle::{insert, modify_by_uuid, remove};
use pmem_lsa::{
    Guid, LabelChanges, LabelFlags, LabelName, LabelStorage, LabelVersion, Lsa, LsaError,
    NamespaceLabel, StorageError,
};
use pmem_range::ModuleId;

const fn no_media(module: ModuleId) -> NamespaceError {
    NamespaceError::label(module, LsaError::Transport(StorageError::NoMedia))
}

/// Per-call settings of [`Context::create_app_direct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Identity of the new namespace; must be non-zero and unused.
    pub uuid: Guid,
    /// Overrides [`NamespaceConfig::btt_abstraction`].
    pub btt: Option<bool>,
}

impl CreateOptions {
    #[must_use]
    pub const fn new(uuid: Guid) -> Self {
        Self { uuid, btt: None }
    }
}

pub struct Context<S: LabelStorage> {
    config: NamespaceConfig,
    topology: Topology,
    stores: BTreeMap<ModuleId, S>,
    namespaces: Vec<Namespace>,
}

impl<S: LabelStorage> Context<S> {
    /// Snapshot the topology of `provider` and assemble the namespaces on `stores`.
    ///
    /// # Errors
    /// Anything [`Topology::from_provider`] or [`Context::scan`] reports.
    pub fn new<P: TopologyProvider + ?Sized>(
        provider: &P,
        stores: impl IntoIterator<Item = (ModuleId, S)>,
        config: NamespaceConfig,
    ) -> Result<Self, NamespaceError> {
        let mut ctx = Self {
            config,
            topology: Topology::from_provider(provider)?,
            stores: stores.into_iter().collect(),
            namespaces: Vec::new(),
        };
        ctx.scan()?;
        Ok(ctx)
    }

    /// Replace the topology snapshot and re-assemble.
    ///
    /// # Errors
    /// Anything [`Topology::from_provider`] or [`Context::scan`] reports. The old
    /// snapshot stays in place if the new one is rejected.
    pub fn reload<P: TopologyProvider + ?Sized>(&mut self, provider: &P) -> Result<(), NamespaceError> {
        self.topology = Topology::from_provider(provider)?;
        self.scan()
    }

    /// Re-read every module's labels and rebuild the namespace list.
    ///
    /// Modules without label storage, or whose storage cannot be decoded, contribute
    /// no labels.
    ///
    /// Namespaces that are still present keep their ids.
    ///
    /// # Errors
    /// Anything [`reassemble`] reports.
    pub fn scan(&mut self) -> Result<(), NamespaceError> {
        let mut labels = Vec::new();
        for module in self.topology.modules() {
            let Some(storage) = self.stores.get_mut(&module.id) else {
                log::debug!("module {}: no label storage attached", module.id);
                continue;
            };
            match Lsa::read(storage) {
                Ok(lsa) => labels.push(ModuleLabels::from_lsa(
                    module.id,
                    &lsa,
                    module.security.is_locked(),
                )),
                Err(LsaError::NotFound) => {
                    log::debug!("module {}: label storage area not initialized", module.id);
                }
                Err(e) => log::warn!("module {}: skipping label storage area: {e}", module.id),
            }
        }

        self.namespaces = reassemble(&self.topology, &labels, &self.namespaces)?;
        log::debug!("scan found {} namespace(s)", self.namespaces.len());
        Ok(())
    }

    #[must_use]
    pub const fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    #[must_use]
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    #[must_use]
    pub fn namespace(&self, id: NamespaceId) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.id == id)
    }

    #[must_use]
    pub fn storage(&self, module: ModuleId) -> Option<&S> {
        self.stores.get(&module)
    }

    /// Label version new labels in set `set_id` have to use.
    ///
    /// Member storage that is already initialized decides; blank storage follows
    /// [`NamespaceConfig::default_label_version`].
    ///
    /// # Errors
    /// - [`NamespaceError::UnknownInterleaveSet`] if `set_id` is not in the topology.
    /// - [`NamespaceError::DeviceError`] if members use different versions.
    /// - [`NamespaceError::Label`] if a member's storage cannot be read.
    pub fn label_version_for_set(&mut self, set_id: InterleaveSetId) -> Result<LabelVersion, NamespaceError> {
        let set = self
            .topology
            .interleave_set(set_id)
            .ok_or(NamespaceError::UnknownInterleaveSet(set_id))?;

        let mut found: Option<LabelVersion> = None;
        for region in &set.regions {
            let Some(storage) = self.stores.get_mut(&region.module) else {
                continue;
            };
            let version = match Lsa::read(storage) {
                Ok(lsa) => lsa.version(),
                Err(LsaError::NotFound) => continue,
                Err(e) => return Err(NamespaceError::label(region.module, e)),
            };
            match found {
                Some(seen) if seen != version => {
                    log::warn!(
                        "interleave set {set_id}: module {} uses label version 1.{} next to 1.{}",
                        region.module,
                        version.minor(),
                        seen.minor()
                    );
                    return Err(NamespaceError::DeviceError(
                        "label versions differ within the interleave set",
                    ));
                }
                _ => found = Some(version),
            }
        }
        Ok(found.unwrap_or(self.config.default_label_version))
    }

    /// `(min, max)` total size of a new App Direct namespace in set `set_id`.
    ///
    /// # Errors
    /// See [`app_direct_bounds`].
    pub fn app_direct_size_bounds(&self, set_id: InterleaveSetId) -> Result<(u64, u64), NamespaceError> {
        app_direct_bounds(
            &self.topology,
            &self.namespaces,
            set_id,
            self.config.pm_namespace_min_size,
        )
    }

    /// Create an App Direct namespace of `capacity` in set `set_id`.
    ///
    /// One label per member is written. If a write fails, or the written labels do
    /// not reassemble into a complete namespace in `set_id`, the labels already
    /// written are removed again before the error is returned.
    ///
    /// # Errors
    /// - [`NamespaceError::Lsa`] if `name` is longer than 63 bytes.
    /// - [`NamespaceError::InvalidParameter`] for a zero or already used UUID.
    /// - Anything [`allocate`] or [`Context::label_version_for_set`] reports.
    /// - [`NamespaceError::Label`] if writing a label fails.
    /// - [`NamespaceError::DeviceError`] if the written labels do not assemble.
    /// - Anything [`Context::scan`] reports after the labels are written.
    pub fn create_app_direct(
        &mut self,
        set_id: InterleaveSetId,
        capacity: Capacity,
        name: &str,
        options: CreateOptions,
    ) -> Result<NamespaceId, NamespaceError> {
        let name = LabelName::new(name)?;
        let uuid = options.uuid;
        if uuid.is_zero() {
            return Err(NamespaceError::InvalidParameter("namespace uuid is zero"));
        }
        if self.namespaces.iter().any(|ns| ns.uuid == uuid) {
            return Err(NamespaceError::InvalidParameter("namespace uuid already in use"));
        }

        let extents = allocate(&self.topology, &self.namespaces, set_id, capacity)?;
        let version = self.label_version_for_set(set_id)?;
        let cookie = self
            .topology
            .cookie(set_id, version)
            .ok_or(NamespaceError::UnknownInterleaveSet(set_id))?;
        let nlabel = u16::try_from(extents.len())
            .map_err(|_| NamespaceError::InvalidTopology("too many interleave set members"))?;
        let btt = options.btt.unwrap_or(self.config.btt_abstraction);

        let mut written: Vec<(ModuleId, u64)> = Vec::new();
        for (position, extent) in (0u16..).zip(&extents) {
            let label = NamespaceLabel {
                uuid,
                name,
                flags: LabelFlags::new(),
                nlabel,
                position,
                set_cookie: cookie,
                lba_size: match version {
                    LabelVersion::V1_2 => LBA_SIZE_4K,
                    LabelVersion::V1_1 => 0,
                },
                dpa: extent.dpa,
                raw_size: extent.size,
                type_guid: match version {
                    LabelVersion::V1_2 => SPA_RANGE_PM_REGION,
                    LabelVersion::V1_1 => Guid::ZERO,
                },
                abstraction_guid: if btt && version == LabelVersion::V1_2 {
                    BTT_ABSTRACTION
                } else {
                    Guid::ZERO
                },
                ..NamespaceLabel::default()
            };

            let result = match self.stores.get_mut(&extent.module) {
                Some(storage) => insert(storage, &[label], version),
                None => Err(LsaError::Transport(StorageError::NoMedia)),
            };
            if let Err(e) = result {
                log::warn!("module {}: writing label of namespace {uuid} failed: {e}", extent.module);
                self.roll_back(&uuid, &written);
                return Err(NamespaceError::label(extent.module, e));
            }
            written.push((extent.module, extent.dpa));
        }

        if let Err(e) = self.scan() {
            log::warn!("namespace {uuid}: rescan after writing labels failed: {e}");
            self.roll_back(&uuid, &written);
            self.rescan_after_roll_back();
            return Err(e);
        }
        let Some(id) = self
            .namespaces
            .iter()
            .find(|ns| ns.uuid == uuid && ns.parent == Some(set_id) && ns.labels_found == nlabel)
            .map(|ns| ns.id)
        else {
            log::warn!("namespace {uuid}: written labels do not form a complete namespace");
            self.roll_back(&uuid, &written);
            self.rescan_after_roll_back();
            return Err(NamespaceError::DeviceError("created namespace did not assemble"));
        };
        log::info!("created App Direct namespace {id} ({uuid}) in interleave set {set_id}");
        Ok(id)
    }

    fn rescan_after_roll_back(&mut self) {
        if let Err(e) = self.scan() {
            log::warn!("rescan after rollback failed: {e}");
        }
    }

    fn roll_back(&mut self, uuid: &Guid, written: &[(ModuleId, u64)]) {
        for &(module, dpa) in written {
            let Some(storage) = self.stores.get_mut(&module) else {
                continue;
            };
            match remove(storage, uuid, Some(dpa)) {
                Ok(_) => log::info!("module {module}: rolled back label of namespace {uuid}"),
                Err(e) => log::warn!("module {module}: rollback of namespace {uuid} failed: {e}"),
            }
        }
    }

    /// Remove every label of namespace `id`.
    ///
    /// # Errors
    /// - [`NamespaceError::UnknownNamespace`] if `id` is not assembled.
    /// - [`NamespaceError::Label`] if a member's labels cannot be removed.
    pub fn delete(&mut self, id: NamespaceId) -> Result<(), NamespaceError> {
        let ns = self
            .namespace(id)
            .cloned()
            .ok_or(NamespaceError::UnknownNamespace(id))?;

        for range in &ns.ranges {
            let storage = self
                .stores
                .get_mut(&range.module)
                .ok_or_else(|| no_media(range.module))?;
            remove(storage, &ns.uuid, Some(range.dpa))
                .map_err(|e| NamespaceError::label(range.module, e))?;
        }

        log::info!("deleted namespace {id} ({})", ns.uuid);
        self.scan()
    }

    /// Change the name of namespace `id` on every member.
    ///
    /// # Errors
    /// - [`NamespaceError::Lsa`] if `name` is longer than 63 bytes.
    /// - [`NamespaceError::UnknownNamespace`] if `id` is not assembled.
    /// - [`NamespaceError::Label`] if a member's labels cannot be rewritten.
    pub fn rename(&mut self, id: NamespaceId, name: &str) -> Result<(), NamespaceError> {
        let name = LabelName::new(name)?;
        let ns = self
            .namespace(id)
            .cloned()
            .ok_or(NamespaceError::UnknownNamespace(id))?;

        let mut modules: Vec<ModuleId> = ns.ranges.iter().map(|r| r.module).collect();
        modules.sort_unstable();
        modules.dedup();

        let changes = LabelChanges::rename(name);
        for module in modules {
            let storage = self.stores.get_mut(&module).ok_or_else(|| no_media(module))?;
            modify_by_uuid(storage, &ns.uuid, &changes).map_err(|e| NamespaceError::label(module, e))?;
        }

        log::info!("renamed namespace {id} ({})", ns.uuid);
        self.scan()
    }

    /// Release the label stores.
    #[must_use]
    pub fn into_stores(self) -> BTreeMap<ModuleId, S> {
        self.stores
    }
}
