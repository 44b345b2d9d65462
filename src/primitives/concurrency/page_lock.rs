use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::Owner;
use crate::types::{PageId, PageSyncError, Result};

/// One owner's hold on one page.
///
/// Starts held and becomes released exactly once; a released lock is never
/// put back into the registry.
pub(crate) struct PageLock {
    page_id: PageId,
    owner: Owner,
    acquired_at: Instant,
    released: Mutex<bool>,
    cond: Condvar,
}

impl PageLock {
    pub(crate) fn new(page_id: PageId, owner: Owner) -> Self {
        Self {
            page_id,
            owner,
            acquired_at: Instant::now(),
            released: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn page_id(&self) -> PageId {
        self.page_id
    }

    pub(crate) fn owner(&self) -> &Owner {
        &self.owner
    }

    pub(crate) fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Blocks `waiter` until this lock is released, `budget` runs out, or the
    /// waiter is interrupted.
    ///
    /// Returning `Ok` does not mean the page is free: wake-ups can be spurious
    /// and another waiter may win the page first, so callers retry acquisition.
    pub(crate) fn await_release(self: &Arc<Self>, waiter: &Owner, budget: Duration) -> Result<()> {
        let mut released = self.released.lock();
        if *released {
            debug!(
                page = self.page_id.0,
                holder = %self.owner,
                "page_lock.already_released"
            );
            return Ok(());
        }

        waiter.park_on(self);
        let interrupted = if waiter.take_interrupt() {
            true
        } else {
            debug!(
                page = self.page_id.0,
                waiter = %waiter,
                holder = %self.owner,
                budget_ms = budget.as_millis() as u64,
                "page_lock.waiting"
            );
            let _ = self.cond.wait_for(&mut released, budget);
            waiter.take_interrupt()
        };
        waiter.unpark();
        drop(released);

        if interrupted {
            debug!(page = self.page_id.0, waiter = %waiter, "page_lock.wait_interrupted");
            return Err(PageSyncError::Interrupted {
                page_id: self.page_id,
                owner: waiter.clone(),
            });
        }
        Ok(())
    }

    /// Marks the lock released and wakes every waiter.
    pub(crate) fn mark_released(&self) {
        let mut released = self.released.lock();
        *released = true;
        self.cond.notify_all();
        debug!(page = self.page_id.0, owner = %self.owner, "page_lock.waiters_notified");
    }

    pub(crate) fn wake_all(&self) {
        let _released = self.released.lock();
        self.cond.notify_all();
    }
}
