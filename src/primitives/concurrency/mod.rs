//! Per-page lock coordination.
//!
//! [`PageLockManager`] keeps a sharded registry of page locks keyed by
//! [`PageId`](crate::types::PageId). A lock is owned by an [`Owner`], the
//! identity of a thread or task. Owners re-lock their own pages without
//! blocking. Other owners wait on the held lock until it is released or their
//! deadline passes.

mod diagnostics;
mod manager;
mod options;
mod owner;
mod page_lock;

pub use diagnostics::{ContentionDump, DumpStrategySource, OwnerLocks, ThreadDumpStrategy};
pub use manager::{LockSnapshot, PageLockManager};
pub use options::{FixedTimeout, LockOptions, TimeoutPolicy, DEFAULT_LOCK_TIMEOUT};
pub use owner::Owner;
