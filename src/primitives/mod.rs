//! Building blocks of page access synchronization.

/// Per-page locks, lock owners and contention diagnostics.
///
/// The lock manager serializes access to individual pages across threads and tasks.
pub mod concurrency;

/// Page manager abstraction.
///
/// Defines the collaborator the lock manager wraps and an in-memory implementation.
pub mod pager;
