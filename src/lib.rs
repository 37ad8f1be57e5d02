#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Errors reported by fallible construction, insertion, and growth.
pub mod error;

/// A HashMap implementation using linear probing.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

pub mod hash_table;

pub use error::TryReserveError;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::HashTable;

/// Number of slots allocated when no size is requested.
pub const DEFAULT_SLOTS: usize = 32;

/// Smallest slot count a table is ever allocated with.
pub const MIN_SLOTS: usize = 1;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Default hasher for [`HashMap`].
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else {
        /// Dummy default hasher for [`HashMap`]. Enable the `foldhash`
        /// feature or pass a hasher explicitly.
        pub enum DefaultHashBuilder {}
    }
}
