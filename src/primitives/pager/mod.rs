//! Page manager abstraction and its lock-synchronized decorator.

mod memory;
mod synchronized;

pub use memory::{MemoryPage, MemoryPageManager, MemoryPageStore};
pub use synchronized::SynchronizedPageManager;

use crate::types::{PageId, Result};

/// A page that can be handed out by a [`PageManager`].
pub trait ManageablePage {
    /// Identifier of this page.
    fn page_id(&self) -> PageId;
}

/// Access to pages for one unit of work.
///
/// `get_page`, `remove_page` and `touch_page` address a single page and are
/// the operations a [`SynchronizedPageManager`] puts under the page lock.
pub trait PageManager {
    /// Page type handed out by this manager.
    type Page: ManageablePage;
    /// Backing store exposed through [`PageManager::page_store`].
    type Store: ?Sized;

    /// Whether this manager keeps older versions of pages.
    fn supports_versioning(&self) -> bool;
    /// Looks up a page; `Ok(None)` when it does not exist.
    fn get_page(&self, page_id: PageId) -> Result<Option<Self::Page>>;
    /// Removes a page.
    fn remove_page(&self, page: &Self::Page) -> Result<()>;
    /// Marks a page as used by the current unit of work.
    fn touch_page(&self, page: &Self::Page) -> Result<()>;
    /// Reverts [`PageManager::touch_page`].
    fn untouch_page(&self, page: &Self::Page) -> Result<()>;
    /// Drops every page.
    fn clear(&self) -> Result<()>;
    /// Ends the current unit of work.
    fn detach(&self) -> Result<()>;
    /// Releases all resources held by the manager.
    fn destroy(&self) -> Result<()>;
    /// The underlying page store.
    fn page_store(&self) -> &Self::Store;
}
