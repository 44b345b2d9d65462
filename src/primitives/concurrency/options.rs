use std::time::Duration;

use super::ThreadDumpStrategy;
use crate::types::PageId;

/// Default time a caller waits for a page lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a [`PageLockManager`](super::PageLockManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Time allowed for acquiring any page lock.
    pub timeout: Duration,
    /// Diagnostics to dump when an acquisition times out.
    pub thread_dump: ThreadDumpStrategy,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            thread_dump: ThreadDumpStrategy::default(),
        }
    }
}

/// Decides how long a caller may wait for a given page.
pub trait TimeoutPolicy: Send + Sync {
    /// Timeout for acquiring the lock on `page_id`.
    fn timeout_for(&self, page_id: PageId) -> Duration;
}

/// The same timeout for every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTimeout(pub Duration);

impl TimeoutPolicy for FixedTimeout {
    fn timeout_for(&self, _page_id: PageId) -> Duration {
        self.0
    }
}

impl<F> TimeoutPolicy for F
where
    F: Fn(PageId) -> Duration + Send + Sync,
{
    fn timeout_for(&self, page_id: PageId) -> Duration {
        self(page_id)
    }
}
