use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use super::{ManageablePage, PageManager};
use crate::primitives::concurrency::Owner;
use crate::types::{PageId, Result};

/// A page held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryPage {
    page_id: PageId,
    data: Vec<u8>,
}

impl MemoryPage {
    /// Creates a page with the given contents.
    pub fn new(page_id: PageId, data: Vec<u8>) -> Self {
        Self { page_id, data }
    }

    /// Page contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a copy of this page with new contents.
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        Self::new(self.page_id, data)
    }
}

impl ManageablePage for MemoryPage {
    fn page_id(&self) -> PageId {
        self.page_id
    }
}

/// Committed pages of a [`MemoryPageManager`].
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    pages: Mutex<HashMap<PageId, MemoryPage>>,
}

impl MemoryPageStore {
    /// Stores `page`, replacing any previous version.
    pub fn insert(&self, page: MemoryPage) {
        self.pages.lock().insert(page.page_id, page);
    }

    /// Returns the stored version of `page_id`.
    pub fn get(&self, page_id: PageId) -> Option<MemoryPage> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Removes `page_id`, returning the stored version.
    pub fn remove(&self, page_id: PageId) -> Option<MemoryPage> {
        self.pages.lock().remove(&page_id)
    }

    /// Number of stored pages.
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    /// Returns true when no page is stored.
    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }

    fn clear(&self) {
        self.pages.lock().clear();
    }
}

/// In-memory [`PageManager`].
///
/// Touched pages are staged per [`Owner`] and written to the store when that
/// owner detaches.
#[derive(Debug, Default)]
pub struct MemoryPageManager {
    store: MemoryPageStore,
    touched: Mutex<HashMap<Owner, Vec<MemoryPage>>>,
}

impl MemoryPageManager {
    /// Pages touched by the current owner and not yet detached.
    pub fn touched_pages(&self) -> Vec<PageId> {
        self.touched
            .lock()
            .get(&Owner::current())
            .map(|pages| pages.iter().map(|page| page.page_id).collect())
            .unwrap_or_default()
    }
}

impl PageManager for MemoryPageManager {
    type Page = MemoryPage;
    type Store = MemoryPageStore;

    fn supports_versioning(&self) -> bool {
        false
    }

    fn get_page(&self, page_id: PageId) -> Result<Option<MemoryPage>> {
        let staged = self.touched.lock().get(&Owner::current()).and_then(|pages| {
            pages.iter().find(|page| page.page_id == page_id).cloned()
        });
        Ok(staged.or_else(|| self.store.get(page_id)))
    }

    fn remove_page(&self, page: &MemoryPage) -> Result<()> {
        if let Some(pages) = self.touched.lock().get_mut(&Owner::current()) {
            pages.retain(|staged| staged.page_id != page.page_id);
        }
        self.store.remove(page.page_id);
        Ok(())
    }

    fn touch_page(&self, page: &MemoryPage) -> Result<()> {
        let mut touched = self.touched.lock();
        let pages = touched.entry(Owner::current()).or_default();
        match pages.iter_mut().find(|staged| staged.page_id == page.page_id) {
            Some(staged) => *staged = page.clone(),
            None => pages.push(page.clone()),
        }
        Ok(())
    }

    fn untouch_page(&self, page: &MemoryPage) -> Result<()> {
        let mut touched = self.touched.lock();
        if let Some(pages) = touched.get_mut(&Owner::current()) {
            pages.retain(|staged| staged.page_id != page.page_id);
            if pages.is_empty() {
                touched.remove(&Owner::current());
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.touched.lock().clear();
        self.store.clear();
        Ok(())
    }

    fn detach(&self) -> Result<()> {
        let owner = Owner::current();
        let staged = self.touched.lock().remove(&owner).unwrap_or_default();
        debug!(owner = %owner, pages = staged.len(), "memory_pages.detach");
        for page in staged {
            self.store.insert(page);
        }
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.clear()
    }

    fn page_store(&self) -> &MemoryPageStore {
        &self.store
    }
}
