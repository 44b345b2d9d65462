//! Per-page access synchronization for page stores.
//!
//! A [`PageLockManager`] hands out exclusive, reentrant, time-bounded locks on
//! page ids to [`Owner`]s (threads or tasks). [`PageLockManager::wrap`]
//! decorates any [`PageManager`] so that pages are fetched and touched under
//! their lock and released when the unit of work detaches.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagesync::{LockOptions, MemoryPageManager, PageId, PageLockManager, PageManager};
//!
//! # fn main() -> pagesync::Result<()> {
//! let locks = Arc::new(PageLockManager::new(LockOptions::default()));
//! let pages = locks.wrap(MemoryPageManager::default());
//! if let Some(page) = pages.get_page(PageId(7))? {
//!     pages.touch_page(&page)?;
//! }
//! pages.detach()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod logging;
pub mod primitives;
pub mod types;

pub use primitives::concurrency::{
    ContentionDump, DumpStrategySource, FixedTimeout, LockOptions, LockSnapshot, Owner,
    OwnerLocks, PageLockManager, ThreadDumpStrategy, TimeoutPolicy, DEFAULT_LOCK_TIMEOUT,
};
pub use primitives::pager::{
    ManageablePage, MemoryPage, MemoryPageManager, MemoryPageStore, PageManager,
    SynchronizedPageManager,
};
pub use types::{LockTimeout, PageId, PageSyncError, Result};
