//! # Namespace Management
//!
//! Capacity accounting, allocation and reassembly of persistent-memory namespaces
//! on top of the module label storage areas.
//!
//! ## Overview
//!
//! ```text
//!            TopologyProvider
//!                   │ modules, interleave sets
//!                   ▼
//!   ┌──────────── Topology ───────────┐      one LSA per module
//!   │ set cookies (v1.1 and v1.2)     │   ┌──────┐ ┌──────┐ ┌──────┐
//!   └───────┬───────────────┬─────────┘   │ LSA0 │ │ LSA1 │ │ ...  │
//!           │               │             └──┬───┘ └──┬───┘ └──┬───┘
//!           ▼               ▼                └────────┼────────┘
//!     module_memmap     assemble ◄──── ModuleLabels ──┘
//!       free_map            │
//!           │               ▼
//!           └──────► allocate ──► Context::create_app_direct ──► labels
//! ```
//!
//! A [`Context`] owns the label storage of every module. It reads all label
//! areas, groups the labels into [`Namespace`]s and keeps that list current after
//! each create, delete and rename.
//!
//! ## Health
//!
//! An App Direct namespace starts out [`Health::Ok`] and only ever escalates:
//!
//! | Condition                                         | Health        |
//! |---------------------------------------------------|---------------|
//! | label LBA size not 0, 512 or 4096                 | `Warning`     |
//! | parent set degraded, set mirrored                 | `Warning`     |
//! | parent set degraded, set not mirrored             | `Critical`    |
//! | member label missing, corrupted or duplicated     | `Critical`    |
//! | member positions duplicated or not `0..nlabel`    | `Critical`    |
//! | no interleave set matches cookie and ranges       | `Critical`    |
//! | a member module is security locked                | `Locked`      |
//!
//! ## Identifiers
//!
//! Namespace ids are `(region << 8) | n`, with `region` the parent interleave set
//! id (zero when there is none) and `n` in `1..=255`. A namespace keeps its id for
//! as long as the [`Context`] sees it; a new one takes the lowest `n` not in use
//! in its region. Interleave set ids above `0xFF` are rejected.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod allocator;
pub mod assembly;
mod context;
pub mod cookie;
mod error;
pub mod memmap;
mod namespace;
pub mod policy;
mod topology;

pub use allocator::{Capacity, Extent, aligned_share, allocate, app_direct_bounds};
pub use assembly::{ModuleLabels, assemble, reassemble};
pub use context::{Context, CreateOptions};
pub use error::NamespaceError;
pub use memmap::{FreeCapacityKind, free_map, module_memmap};
pub use namespace::{Abstraction, Health, Namespace, NamespaceId, NamespaceRange, NamespaceType};
pub use policy::NamespaceConfig;
pub use topology::{
    DimmRegion, InterleaveSet, InterleaveSetId, IsState, Module, ModuleGeometry, ModuleIdentity,
    SecurityState, StaticTopology, Topology, TopologyProvider,
};
