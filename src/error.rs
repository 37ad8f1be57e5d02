use core::alloc::Layout;

/// The error type for the `try_*` methods and [`HashMap::put`].
///
/// Returned whenever the table needs a new slot buffer and cannot get one.
/// The table is left untouched when this is returned.
///
/// [`HashMap::put`]: crate::HashMap::put
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum TryReserveError {
    /// The computed slot buffer would exceed `isize::MAX` bytes.
    #[error("hash table capacity overflow")]
    CapacityOverflow,

    /// The memory allocator returned an error.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
}
