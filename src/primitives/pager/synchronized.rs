use std::sync::Arc;

use super::{ManageablePage, PageManager};
use crate::primitives::concurrency::{Owner, PageLockManager};
use crate::types::{PageId, Result};

/// A [`PageManager`] whose page accesses are serialized per page.
///
/// Pages returned by `get_page` or passed to `touch_page` stay locked for the
/// calling owner until `detach`. `remove_page` releases its page when done.
pub struct SynchronizedPageManager<M> {
    inner: M,
    locks: Arc<PageLockManager>,
}

impl<M: PageManager> SynchronizedPageManager<M> {
    /// Wraps `inner` with `locks`.
    pub fn new(inner: M, locks: Arc<PageLockManager>) -> Self {
        Self { inner, locks }
    }

    /// Lock manager used by this decorator.
    pub fn locks(&self) -> &Arc<PageLockManager> {
        &self.locks
    }

    /// The wrapped manager.
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Unwraps the decorator.
    pub fn into_inner(self) -> M {
        self.inner
    }

    fn lock(&self, owner: &Owner, page_id: PageId) -> Result<()> {
        self.locks
            .lock_as(owner, page_id, self.locks.timeout(page_id))
    }
}

/// Releases one page, or all of an owner's pages, when dropped.
struct ReleaseGuard<'a> {
    locks: &'a PageLockManager,
    owner: &'a Owner,
    page_id: Option<PageId>,
    armed: bool,
}

impl<'a> ReleaseGuard<'a> {
    fn page(locks: &'a PageLockManager, owner: &'a Owner, page_id: PageId) -> Self {
        Self {
            locks,
            owner,
            page_id: Some(page_id),
            armed: true,
        }
    }

    fn all(locks: &'a PageLockManager, owner: &'a Owner) -> Self {
        Self {
            locks,
            owner,
            page_id: None,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.page_id {
            Some(page_id) => self.locks.unlock_as(self.owner, page_id),
            None => self.locks.unlock_all_as(self.owner),
        }
    }
}

impl<M: PageManager> PageManager for SynchronizedPageManager<M> {
    type Page = M::Page;
    type Store = M::Store;

    fn supports_versioning(&self) -> bool {
        self.inner.supports_versioning()
    }

    fn get_page(&self, page_id: PageId) -> Result<Option<Self::Page>> {
        let owner = Owner::current();
        self.lock(&owner, page_id)?;
        let release = ReleaseGuard::page(&self.locks, &owner, page_id);
        let page = self.inner.get_page(page_id)?;
        if page.is_some() {
            release.disarm();
        }
        Ok(page)
    }

    fn remove_page(&self, page: &Self::Page) -> Result<()> {
        let owner = Owner::current();
        let page_id = page.page_id();
        self.lock(&owner, page_id)?;
        let _release = ReleaseGuard::page(&self.locks, &owner, page_id);
        self.inner.remove_page(page)
    }

    fn touch_page(&self, page: &Self::Page) -> Result<()> {
        self.lock(&Owner::current(), page.page_id())?;
        self.inner.touch_page(page)
    }

    fn untouch_page(&self, page: &Self::Page) -> Result<()> {
        self.inner.untouch_page(page)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn detach(&self) -> Result<()> {
        let owner = Owner::current();
        let _release = ReleaseGuard::all(&self.locks, &owner);
        self.inner.detach()
    }

    fn destroy(&self) -> Result<()> {
        self.inner.destroy()
    }

    fn page_store(&self) -> &Self::Store {
        self.inner.page_store()
    }
}
