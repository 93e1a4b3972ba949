//! # Label Storage Area
//!
//! Codec, validator and lifecycle operations for the namespace label storage area
//! (LSA) of a persistent-memory module.
//!
//! ## Layout
//!
//! The LSA is a small partition on each module. It starts with two index blocks
//! of identical size followed by an array of fixed-size label slots:
//!
//! ```text
//! ┌──────────────┬──────────────┬────────┬────────┬─────┬──────────────┐
//! │ index A      │ index B      │ slot 0 │ slot 1 │ ... │ slot nslot-1 │
//! │ seq, bitmap  │ seq, bitmap  │ label  │ label  │     │ label        │
//! └──────────────┴──────────────┴────────┴────────┴─────┴──────────────┘
//! ```
//!
//! Each index block carries a sequence number in `1..=3` and a free bitmap over
//! all slots (a set bit marks a free slot). The block with the newer sequence
//! number is current; the other one is the scratch block for the next update.
//!
//! ## Updates
//!
//! Updates never modify the current block in place. The current bitmap is copied
//! into the other block, changes are applied to the copy, and the copy is written
//! with the next sequence number:
//!
//! 1. labels going into newly used slots are written (those slots are free under
//!    the current block),
//! 2. the next index block is written (the commit point),
//! 3. slots released by the update are zeroed.
//!
//! Losing power before step 2 leaves the old state visible; afterwards the new one.
//!
//! ## Label Versions
//!
//! | Index minor | Label size | Checksum | App Direct marker        |
//! |-------------|------------|----------|--------------------------|
//! | 1           | 128 bytes  | no       | `local` flag clear       |
//! | 2           | 256 bytes  | yes      | PM region type GUID      |
//!
//! ## Transport
//!
//! All media access goes through [`LabelStorage`]. Transfers are split to the
//! payload size the module supports; with the small payload only used label
//! slots are read. [`MemStorage`] keeps a partition in memory.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod area;
mod bitmap;
mod bytes;
pub mod checksum;
mod error;
pub mod guid;
mod index;
pub mod label;
pub mod layout;
pub mod lifecycle;
mod select;
mod storage;

pub use area::{LabelArea, Lsa, Update};
pub use bitmap::FreeBitmap;
pub use error::{CorruptionKind, IndexDefect, LsaError, StorageError};
pub use guid::Guid;
pub use index::IndexBlock;
pub use label::{LabelChanges, LabelFlags, LabelName, NamespaceLabel};
pub use layout::{Geometry, LabelVersion};
pub use select::{IndexSlot, next_sequence, select_current};
pub use storage::{LabelStorage, MemStorage, Payload, read_chunked, write_chunked};
