// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # cowdraft: copy-on-write drafts over nested values
//!
//! This crate lets you "edit" an immutable value graph as if it were mutable. You hand
//! [`produce`] a base [`Value`] and a closure; the closure receives a [`Draft`] through which
//! it reads and writes the value. When the closure returns you get back either:
//!
//! - **the very same base** (pointer-equal), if nothing ended up changing, or
//! - **a new value** that shares every untouched subtree with the base and holds fresh copies
//!   only along the paths that were written to (structural sharing).
//!
//! ```rust
//! use cowdraft::{produce, value, DraftError, Key};
//!
//! let base = value!({
//!     "a" => { "x" => 1, "y" => 2 },
//!     "b" => { "z" => 3 }
//! });
//!
//! let next = produce(&base, |draft| {
//!     draft.child("a")?.set("x", 99)?;
//!     Ok::<_, DraftError>(())
//! })
//! .unwrap();
//!
//! // The written path was copied...
//! assert_ne!(next, base);
//! assert_ne!(next.get("a"), base.get("a"));
//! // ...the sibling subtree is shared.
//! assert_eq!(next.get("b"), base.get("b"));
//! assert_eq!(next.get("a").unwrap().get("x"), Some(99.into()));
//! ```
//!
//! ## Core Concepts
//!
//! - [`Value`]: a dynamic value. Primitives compare by value, compounds (objects, sequences,
//!   maps, sets) and callables compare by **identity**. Compounds carry a freeze flag; a frozen
//!   compound rejects every mutation.
//! - [`Draft`]: the handle the mutation closure works with. Every compound reached through a
//!   draft is itself handed out as a draft, so writes anywhere in the tree are tracked.
//! - **Descriptors**: every node visited during a session is tracked by a descriptor holding the
//!   base value and, once something at or below it changes, a shallow *shadow copy*. Writing a
//!   value cascades copies up to the root; writing the original value back prunes them again,
//!   so a round trip to the base costs nothing in the result.
//! - **Sessions**: a call to [`produce`] or [`produce_with`]. Drafts are revoked when the
//!   outermost session ends; using a revoked draft fails with [`DraftError::Revoked`].
//!
//! ## Change notification and rollback
//!
//! [`produce_with`] additionally invokes a callback with the result, a snapshot of every changed
//! path, and a [`Rollback`] handle. Calling [`Rollback::rollback`] inside the callback makes the
//! session return the original base.
//!
//! ## Merging plain values into drafts
//!
//! The [`merge`] module grafts plain deltas into a draft, walking descriptors directly instead of
//! materializing drafts for every subtree it passes.
//!
//! ## Freezing
//!
//! By default every value returned from a session is deeply frozen. See [`set_auto_freeze`].
//!
//! ## Features
//!
//! - `json`: Enables conversions between [`Value`] and `serde_json::Value`. This feature is
//!   enabled by default.
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for [`Value`], useful for property-based
//!   testing.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use std::cell::Cell;

pub mod diff;
mod draft;
pub use draft::{Draft, DraftValue};
mod error;
pub use error::{DraftError, ValueError};
mod graph;
#[cfg(feature = "json")]
mod json;
/// Macros usable for tests and initialization
pub mod macros;
pub mod merge;
pub use merge::{
    MergeOptions, MergePath, Segment, merge_at, merge_at_shallow, merge_at_with, merge_into,
    merge_into_shallow, merge_into_with,
};
pub mod overlay;
mod path;
pub use path::{Key, Path};
mod session;
pub use session::{Changes, Rollback, produce, produce_with};
#[cfg(any(test, feature = "arbitrary"))]
mod test_util;
mod value;
pub use value::{Callable, Compound, Kind, Value, WeakCompound};

/// Hasher used by every internal map.
pub(crate) type RandomState = ahash::RandomState;

pub(crate) fn create_map<K, V>() -> std::collections::HashMap<K, V, RandomState> {
    std::collections::HashMap::with_hasher(RandomState::default())
}

pub(crate) fn create_set<T>() -> std::collections::HashSet<T, RandomState> {
    std::collections::HashSet::with_hasher(RandomState::default())
}

thread_local! {
    // Values are `!Send`, so a session never leaves the thread that started it.
    static AUTO_FREEZE: Cell<bool> = const { Cell::new(true) };
}

/// Controls whether values returned from a session are deeply frozen.
///
/// Enabled by default. When disabled, an unchanged base is returned as-is and the fresh copies in
/// a changed result stay mutable through the [`Compound`] API.
pub fn set_auto_freeze(enabled: bool) {
    AUTO_FREEZE.with(|flag| flag.set(enabled));
}

/// Returns whether values returned from a session are deeply frozen.
pub fn auto_freeze() -> bool {
    AUTO_FREEZE.with(Cell::get)
}
