use crate::namespace::NamespaceId;
use crate::topology::{InterleaveSetId, IsState};
use pmem_lsa::LsaError;
use pmem_range::{ModuleId, RangeError};

/// Errors of the capacity, assembly and namespace management layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("invalid topology: {0}")]
    InvalidTopology(&'static str),
    #[error("no replicated free capacity in interleave set {set}")]
    NotFound { set: InterleaveSetId },
    #[error("unknown interleave set {0}")]
    UnknownInterleaveSet(InterleaveSetId),
    #[error("unknown module {0}")]
    UnknownModule(ModuleId),
    #[error("unknown namespace {0}")]
    UnknownNamespace(NamespaceId),
    #[error("capacity arithmetic overflowed")]
    OutOfResources,
    #[error("interleave set {set} is not ready: {state:?}")]
    NotReady { set: InterleaveSetId, state: IsState },
    #[error("device error: {0}")]
    DeviceError(&'static str),
    #[error("label storage of module {module} failed: {source}")]
    Label {
        module: ModuleId,
        #[source]
        source: LsaError,
    },
    #[error(transparent)]
    Lsa(#[from] LsaError),
    #[error(transparent)]
    Range(#[from] RangeError),
}

impl NamespaceError {
    /// Attach the module whose label storage produced `source`.
    #[must_use]
    pub const fn label(module: ModuleId, source: LsaError) -> Self {
        Self::Label { module, source }
    }
}
