//! # Address Range Algebra
//!
//! This crate provides the interval arithmetic that every capacity decision in the
//! persistent-memory stack is built on. It knows nothing about namespaces, labels or
//! interleave sets; it only deals with module-local address ranges tagged with a
//! [`RangeKind`].
//!
//! ## Overview
//!
//! A module's address space is described as a flat list of [`AddressRange`]s. During
//! construction such a list may contain overlapping entries (a persistent partition
//! and the interleave-set region carved out of it, for example). The algebra turns
//! such lists into canonical, non-overlapping form and computes set differences:
//!
//! ```text
//!  usable    ├──────────────────────┤        ├──────────┤
//!  occupied        ├─────┤    ├──────────────────┤
//!  ─────────────────────────────────────────────────────────
//!  free      ├─────┤     ├────┤                  ├──────┤
//! ```
//!
//! ## Operations
//!
//! * [`insert_sorted`]: place a range into a start-ordered list without merging.
//! * [`merge`]: coalesce a start-ordered list into non-overlapping ranges.
//! * [`subtract`]: `usable − occupied`, yielding [`RangeKind::Free`] ranges.
//!
//! ## Malformed Input
//!
//! Contract violations (an unsorted list) are reported as [`RangeError`]. Data that is
//! representable but nonsensical, such as a range whose end overflows `u64`, never
//! panics: the range is dropped, a warning is logged and the drop is counted in
//! [`Coalesced::anomalies`].
//!
//! Zero-length ranges are legal point markers (e.g. the last usable address of a
//! module). They never contribute address space to a merge or a subtraction.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod algebra;
mod error;
mod range;

pub use algebra::{Coalesced, insert_sorted, is_sorted, merge, sort_by_start, subtract};
pub use error::RangeError;
pub use range::{AddressRange, ModuleId, RangeKind};
