use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::PageId;
use crate::primitives::concurrency::Owner;

/// Result type for page synchronization operations.
pub type Result<T> = std::result::Result<T, PageSyncError>;

/// Errors surfaced by the lock manager and the page managers it wraps.
#[derive(Debug, Error)]
pub enum PageSyncError {
    /// The page lock could not be acquired before the deadline.
    ///
    /// Recoverable: callers typically fail the current unit of work and retry
    /// at a higher level.
    #[error("{0}")]
    LockTimeout(Box<LockTimeout>),

    /// The waiting owner was interrupted while parked on a page lock.
    #[error("{owner} was interrupted while waiting for the lock on page {page_id}")]
    Interrupted {
        /// Page the owner was waiting for.
        page_id: PageId,
        /// Owner whose wait was interrupted.
        owner: Owner,
    },

    /// The wrapped page manager failed.
    #[error("page store: {0}")]
    Store(#[source] Box<dyn StdError + Send + Sync>),

    /// Invalid configuration or argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PageSyncError {
    /// Wraps a page manager failure.
    pub fn store<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        PageSyncError::Store(err.into())
    }

    /// Returns true when this error is a lock timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageSyncError::LockTimeout(_))
    }

    /// Returns the timeout details when this error is a lock timeout.
    pub fn as_timeout(&self) -> Option<&LockTimeout> {
        match self {
            PageSyncError::LockTimeout(timeout) => Some(timeout),
            _ => None,
        }
    }
}

impl From<LockTimeout> for PageSyncError {
    fn from(value: LockTimeout) -> Self {
        PageSyncError::LockTimeout(Box::new(value))
    }
}

/// Details of a failed page lock acquisition.
#[derive(Debug, Clone)]
pub struct LockTimeout {
    /// Page that could not be locked.
    pub page_id: PageId,
    /// Owner that requested the lock.
    pub requester: Owner,
    /// Owner that held the lock when the deadline passed.
    pub holder: Owner,
    /// Time the requester was allowed to wait.
    pub timeout: Duration,
    /// Time the requester actually spent trying.
    pub elapsed: Duration,
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} could not lock page {}: held by {}, attempted for {:?} out of allowed {:?}",
            self.requester, self.page_id, self.holder, self.elapsed, self.timeout
        )
    }
}

impl StdError for LockTimeout {}
