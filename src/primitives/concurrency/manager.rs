use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::diagnostics::{resolve_strategy, ContentionDump, DumpStrategySource};
use super::options::{FixedTimeout, LockOptions, TimeoutPolicy};
use super::page_lock::PageLock;
use super::Owner;
use crate::primitives::pager::{PageManager, SynchronizedPageManager};
use crate::types::{LockTimeout, PageId, Result};

/// Point-in-time view of one registered page lock.
#[derive(Debug, Clone)]
pub struct LockSnapshot {
    /// Locked page.
    pub page_id: PageId,
    /// Owner holding the page.
    pub owner: Owner,
    /// Time since the owner acquired the page.
    pub held_for: Duration,
}

/// Serializes access to pages across concurrent callers.
///
/// Each page id maps to at most one holder. Holders may re-lock their own
/// pages without blocking, and waiters give up after a deadline measured from
/// the start of the call. Waiters are not served in FIFO order: whoever wins
/// the next insert after a release gets the page.
pub struct PageLockManager {
    locks: DashMap<PageId, Arc<PageLock>>,
    timeouts: Box<dyn TimeoutPolicy>,
    dump_strategy: Box<dyn DumpStrategySource>,
}

impl PageLockManager {
    /// Creates a manager using `options` for timeouts and diagnostics.
    pub fn new(options: LockOptions) -> Self {
        Self {
            locks: DashMap::new(),
            timeouts: Box::new(FixedTimeout(options.timeout)),
            dump_strategy: Box::new(options.thread_dump),
        }
    }

    /// Replaces the per-page timeout policy.
    pub fn with_timeout_policy(mut self, policy: impl TimeoutPolicy + 'static) -> Self {
        self.timeouts = Box::new(policy);
        self
    }

    /// Replaces the source consulted for the dump strategy on timeout.
    pub fn with_dump_strategy(mut self, source: impl DumpStrategySource + 'static) -> Self {
        self.dump_strategy = Box::new(source);
        self
    }

    /// Time a caller may wait for the lock on `page_id`.
    pub fn timeout(&self, page_id: PageId) -> Duration {
        self.timeouts.timeout_for(page_id)
    }

    /// Locks `page_id` for the current owner using the configured timeout.
    pub fn lock_page(&self, page_id: PageId) -> Result<()> {
        self.lock(page_id, self.timeout(page_id))
    }

    /// Locks `page_id` for the current owner, waiting at most `timeout`.
    pub fn lock(&self, page_id: PageId, timeout: Duration) -> Result<()> {
        self.lock_as(&Owner::current(), page_id, timeout)
    }

    /// Locks `page_id` for `owner`, waiting at most `timeout`.
    ///
    /// Succeeds at once if `owner` already holds the page. At least one
    /// acquisition attempt is made, so a zero timeout acts as a try-lock.
    pub fn lock_as(&self, owner: &Owner, page_id: PageId, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        loop {
            debug!(owner = %owner, page = page_id.0, "page_lock.attempt");
            let holder = match self.locks.entry(page_id) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(PageLock::new(page_id, owner.clone())));
                    debug!(owner = %owner, page = page_id.0, "page_lock.acquired");
                    return Ok(());
                }
                Entry::Occupied(slot) => Arc::clone(slot.get()),
            };
            if holder.owner() == owner {
                debug!(owner = %owner, page = page_id.0, "page_lock.reentrant");
                return Ok(());
            }

            // Deadline is absolute: retries never extend it.
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(self.timed_out(owner, &holder, timeout, elapsed));
            }
            holder.await_release(owner, timeout - elapsed)?;
        }
    }

    fn timed_out(
        &self,
        requester: &Owner,
        holder: &PageLock,
        timeout: Duration,
        elapsed: Duration,
    ) -> crate::types::PageSyncError {
        let report = LockTimeout {
            page_id: holder.page_id(),
            requester: requester.clone(),
            holder: holder.owner().clone(),
            timeout,
            elapsed,
        };
        warn!(
            requester = %report.requester,
            page = report.page_id.0,
            elapsed_ms = elapsed.as_millis() as u64,
            timeout_ms = timeout.as_millis() as u64,
            holder = %report.holder,
            "page_lock.timeout"
        );
        if let Some(strategy) = resolve_strategy(self.dump_strategy.as_ref()) {
            if let Some(dump) = ContentionDump::collect(strategy, &report.holder, self.snapshot()) {
                dump.emit(&report);
            }
        }
        report.into()
    }

    /// Releases `page_id` if the current owner holds it.
    pub fn unlock(&self, page_id: PageId) {
        self.unlock_as(&Owner::current(), page_id);
    }

    /// Releases `page_id` if `owner` holds it; otherwise does nothing.
    pub fn unlock_as(&self, owner: &Owner, page_id: PageId) {
        if let Some((_, lock)) = self.locks.remove_if(&page_id, |_, lock| lock.owner() == owner) {
            debug!(owner = %owner, page = page_id.0, "page_lock.released");
            lock.mark_released();
        }
    }

    /// Releases every page held by the current owner.
    pub fn unlock_all(&self) {
        self.unlock_all_as(&Owner::current());
    }

    /// Releases every page held by `owner`.
    pub fn unlock_all_as(&self, owner: &Owner) {
        let mut released = Vec::new();
        self.locks.retain(|_, lock| {
            if lock.owner() == owner {
                released.push(Arc::clone(lock));
                false
            } else {
                true
            }
        });
        // Waiters are woken only after the shard locks are dropped.
        for lock in released {
            debug!(owner = %owner, page = lock.page_id().0, "page_lock.released");
            lock.mark_released();
        }
    }

    /// Wraps `manager` so page access goes through this lock manager.
    pub fn wrap<M: PageManager>(self: &Arc<Self>, manager: M) -> SynchronizedPageManager<M> {
        SynchronizedPageManager::new(manager, Arc::clone(self))
    }

    /// Owner currently holding `page_id`, if any.
    pub fn holder(&self, page_id: PageId) -> Option<Owner> {
        self.locks.get(&page_id).map(|lock| lock.owner().clone())
    }

    /// Pages held by `owner`, in ascending order.
    pub fn held_pages(&self, owner: &Owner) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .locks
            .iter()
            .filter(|entry| entry.value().owner() == owner)
            .map(|entry| *entry.key())
            .collect();
        pages.sort_unstable();
        pages
    }

    /// Snapshot of every registered lock, ordered by page id.
    pub fn snapshot(&self) -> Vec<LockSnapshot> {
        let mut entries: Vec<LockSnapshot> = self
            .locks
            .iter()
            .map(|entry| LockSnapshot {
                page_id: *entry.key(),
                owner: entry.value().owner().clone(),
                held_for: entry.value().held_for(),
            })
            .collect();
        entries.sort_unstable_by_key(|entry| entry.page_id);
        entries
    }

    /// Number of locked pages.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true when no page is locked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Default for PageLockManager {
    fn default() -> Self {
        Self::new(LockOptions::default())
    }
}
