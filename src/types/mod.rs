//! Identifiers and error types shared across the crate.

use std::fmt;

mod error;

pub use error::{LockTimeout, PageSyncError, Result};

/// Identifier of a page managed by a [`PageManager`](crate::primitives::pager::PageManager).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        PageId(value)
    }
}

impl From<PageId> for u64 {
    fn from(value: PageId) -> Self {
        value.0
    }
}
