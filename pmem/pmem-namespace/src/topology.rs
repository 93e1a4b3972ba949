//! Modules and interleave sets as reported by the platform.
//!
//! The snapshot is built once from a [`TopologyProvider`] and stays immutable
//! until the owning [`Context`](crate::Context) is reloaded. Interleave-set
//! cookies are derived here, for both label versions, when the snapshot is built.

use crate::cookie::SetCookies;
use crate::NamespaceError;
use alloc::vec::Vec;
use core::fmt;
use pmem_lsa::LabelVersion;
use pmem_range::{ModuleId, RangeKind};

/// Partition layout of one module's address space, in DPA bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleGeometry {
    pub raw_capacity: u64,
    pub volatile_start: u64,
    pub volatile_capacity: u64,
    pub pm_start: u64,
    pub pm_capacity: u64,
}

impl ModuleGeometry {
    /// Exclusive end of the persistent partition.
    #[must_use]
    pub const fn pm_end(&self) -> Option<u64> {
        self.pm_start.checked_add(self.pm_capacity)
    }
}

/// Manufacturing identity of a module, as covered by the interleave-set cookie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    pub serial: u32,
    pub vendor: u16,
    pub manufacturing_date: u16,
    pub manufacturing_location: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecurityState {
    #[default]
    Disabled,
    Unlocked,
    Locked,
    Frozen,
}

impl SecurityState {
    #[must_use]
    pub const fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub geometry: ModuleGeometry,
    pub identity: ModuleIdentity,
    pub security: SecurityState,
}

/// Interleave-set (region) id. Zero is reserved for namespaces without a parent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct InterleaveSetId(pub u16);

impl fmt::Display for InterleaveSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The part of one module's persistent partition that belongs to an interleave set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimmRegion {
    pub module: ModuleId,
    /// Offset from the start of the module's persistent partition.
    pub partition_offset: u64,
    pub partition_size: u64,
    /// Offset of this region within the set's system address range.
    pub spa_region_offset: u64,
}

impl DimmRegion {
    /// DPA window `(start, end)` of this region on `module`.
    #[must_use]
    pub const fn window(&self, module: &Module) -> Option<(u64, u64)> {
        let Some(start) = module.geometry.pm_start.checked_add(self.partition_offset) else {
            return None;
        };
        match start.checked_add(self.partition_size) {
            Some(end) => Some((start, end)),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsState {
    #[default]
    Healthy,
    InitFailure,
    DimmMissing,
    ConfigInactive,
    SpaMissing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterleaveSet {
    pub id: InterleaveSetId,
    pub mirrored: bool,
    pub state: IsState,
    /// Member regions in platform order; the first one anchors allocation.
    pub regions: Vec<DimmRegion>,
}

impl InterleaveSet {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == IsState::Healthy
    }

    #[must_use]
    pub fn region_on(&self, module: ModuleId) -> Option<&DimmRegion> {
        self.regions.iter().find(|r| r.module == module)
    }

    /// How this set's regions appear in a module memory map.
    #[must_use]
    pub fn range_kind(&self) -> RangeKind {
        if self.mirrored {
            RangeKind::InterleaveSetMirrored
        } else if self.regions.len() > 1 {
            RangeKind::InterleaveSet
        } else {
            RangeKind::InterleaveSetSingle
        }
    }
}

/// Source of the module inventory and interleave configuration.
pub trait TopologyProvider {
    fn modules(&self) -> Vec<Module>;
    fn interleave_sets(&self) -> Vec<InterleaveSet>;
}

/// A provider over fixed lists, for firmware tables parsed up front and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    pub modules: Vec<Module>,
    pub sets: Vec<InterleaveSet>,
}

impl TopologyProvider for StaticTopology {
    fn modules(&self) -> Vec<Module> {
        self.modules.clone()
    }

    fn interleave_sets(&self) -> Vec<InterleaveSet> {
        self.sets.clone()
    }
}

/// Immutable snapshot of modules and interleave sets with their derived cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    modules: Vec<Module>,
    sets: Vec<InterleaveSet>,
    cookies: Vec<SetCookies>,
}

impl Topology {
    /// # Errors
    /// - [`NamespaceError::InvalidTopology`] for duplicate module or set ids, the
    ///   reserved set id 0 or a set id that does not fit a namespace id (above `0xFF`).
    /// - [`NamespaceError::UnknownModule`] for a region on a module that is not listed.
    pub fn new(modules: Vec<Module>, sets: Vec<InterleaveSet>) -> Result<Self, NamespaceError> {
        for (i, m) in modules.iter().enumerate() {
            if modules[..i].iter().any(|o| o.id == m.id) {
                return Err(NamespaceError::InvalidTopology("duplicate module id"));
            }
        }
        for (i, set) in sets.iter().enumerate() {
            if set.id.0 == 0 {
                return Err(NamespaceError::InvalidTopology("interleave set id 0 is reserved"));
            }
            if u8::try_from(set.id.0).is_err() {
                return Err(NamespaceError::InvalidTopology("interleave set id above 0xFF"));
            }
            if sets[..i].iter().any(|o| o.id == set.id) {
                return Err(NamespaceError::InvalidTopology("duplicate interleave set id"));
            }
        }

        let cookies = sets
            .iter()
            .map(|set| SetCookies::derive(set, &modules))
            .collect::<Result<Vec<_>, _>>()?;

        for (set, c) in sets.iter().zip(&cookies) {
            log::debug!(
                "interleave set {}: {} region(s), cookie v1.1 {:#018x}, v1.2 {:#018x}",
                set.id,
                set.regions.len(),
                c.v1_1,
                c.v1_2
            );
        }

        Ok(Self {
            modules,
            sets,
            cookies,
        })
    }

    /// # Errors
    /// See [`Topology::new`].
    pub fn from_provider<P: TopologyProvider + ?Sized>(provider: &P) -> Result<Self, NamespaceError> {
        Self::new(provider.modules(), provider.interleave_sets())
    }

    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    #[must_use]
    pub fn interleave_sets(&self) -> &[InterleaveSet] {
        &self.sets
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn interleave_set(&self, id: InterleaveSetId) -> Option<&InterleaveSet> {
        self.sets.iter().find(|s| s.id == id)
    }

    /// Cookie of set `id` as written into labels of `version`.
    #[must_use]
    pub fn cookie(&self, id: InterleaveSetId, version: LabelVersion) -> Option<u64> {
        self.sets
            .iter()
            .position(|s| s.id == id)
            .map(|i| self.cookies[i].for_version(version))
    }

    /// Member module and DPA window for every region of `set`.
    ///
    /// # Errors
    /// [`NamespaceError::UnknownModule`] or [`NamespaceError::InvalidTopology`] if a
    /// window cannot be resolved.
    pub fn windows(&self, set: &InterleaveSet) -> Result<Vec<(&Module, (u64, u64))>, NamespaceError> {
        set.regions
            .iter()
            .map(|region| {
                let module = self
                    .module(region.module)
                    .ok_or(NamespaceError::UnknownModule(region.module))?;
                let window = region
                    .window(module)
                    .ok_or(NamespaceError::InvalidTopology("region window overflows"))?;
                Ok((module, window))
            })
            .collect()
    }
}
