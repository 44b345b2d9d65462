//! Contention diagnostics emitted when a page lock times out.
//!
//! Rust cannot sample another thread's stack, so a "thread dump" here is a
//! dump of the lock registry: which owners hold which pages and for how long.
//! The [`ThreadDumpStrategy`] decides how much of it is logged.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::warn;

use super::{LockSnapshot, Owner};
use crate::types::{LockTimeout, PageId};

/// How much diagnostic state to dump when a page lock times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadDumpStrategy {
    /// Dump nothing.
    NoThreads,
    /// Dump only the owner that held the contended page.
    #[default]
    ThreadHoldingLock,
    /// Dump every owner currently holding pages, plus the requester's backtrace.
    AllThreads,
}

/// Supplies the dump strategy at the moment a timeout happens.
///
/// Returning `None` disables the dump. Implementations may consult
/// application state; failures only affect diagnostics, never locking.
pub trait DumpStrategySource: Send + Sync {
    /// Strategy to apply for the current timeout.
    fn thread_dump_strategy(&self) -> Option<ThreadDumpStrategy>;
}

impl DumpStrategySource for ThreadDumpStrategy {
    fn thread_dump_strategy(&self) -> Option<ThreadDumpStrategy> {
        Some(*self)
    }
}

impl<F> DumpStrategySource for F
where
    F: Fn() -> Option<ThreadDumpStrategy> + Send + Sync,
{
    fn thread_dump_strategy(&self) -> Option<ThreadDumpStrategy> {
        self()
    }
}

/// Asks `source` for a strategy; a panicking source counts as no strategy.
pub(crate) fn resolve_strategy(source: &dyn DumpStrategySource) -> Option<ThreadDumpStrategy> {
    match panic::catch_unwind(AssertUnwindSafe(|| source.thread_dump_strategy())) {
        Ok(strategy) => strategy,
        Err(_) => {
            warn!("page_lock.dump_strategy_unavailable");
            None
        }
    }
}

/// Pages held by one owner at dump time.
#[derive(Debug, Clone)]
pub struct OwnerLocks {
    /// Owner holding the pages.
    pub owner: Owner,
    /// Held pages with how long each has been held, ordered by page id.
    pub pages: Vec<(PageId, Duration)>,
}

/// Registry state captured for a lock timeout.
#[derive(Debug, Clone)]
pub struct ContentionDump {
    /// Strategy that produced this dump.
    pub strategy: ThreadDumpStrategy,
    /// Owners included in the dump. The contended page's holder comes first.
    pub owners: Vec<OwnerLocks>,
}

impl ContentionDump {
    /// Builds a dump of `snapshot` filtered by `strategy`.
    ///
    /// Returns `None` for [`ThreadDumpStrategy::NoThreads`].
    pub fn collect(
        strategy: ThreadDumpStrategy,
        holder: &Owner,
        snapshot: Vec<LockSnapshot>,
    ) -> Option<Self> {
        if strategy == ThreadDumpStrategy::NoThreads {
            return None;
        }
        let mut by_owner: BTreeMap<u64, OwnerLocks> = BTreeMap::new();
        for entry in snapshot {
            if strategy == ThreadDumpStrategy::ThreadHoldingLock && entry.owner != *holder {
                continue;
            }
            by_owner
                .entry(entry.owner.id())
                .or_insert_with(|| OwnerLocks {
                    owner: entry.owner.clone(),
                    pages: Vec::new(),
                })
                .pages
                .push((entry.page_id, entry.held_for));
        }

        let mut owners: Vec<OwnerLocks> = by_owner.into_values().collect();
        for locks in &mut owners {
            locks.pages.sort_by_key(|(page_id, _)| *page_id);
        }
        if let Some(pos) = owners.iter().position(|locks| locks.owner == *holder) {
            let holder_locks = owners.remove(pos);
            owners.insert(0, holder_locks);
        }
        Some(Self { strategy, owners })
    }

    /// Writes the dump to the log.
    pub fn emit(&self, timeout: &LockTimeout) {
        for locks in &self.owners {
            let pages = locks
                .pages
                .iter()
                .map(|(page_id, held)| format!("{page_id} ({held:?})"))
                .collect::<Vec<_>>()
                .join(", ");
            let holds_contended = locks.owner == timeout.holder;
            warn!(
                contended_page = timeout.page_id.0,
                owner = %locks.owner,
                holds_contended,
                pages = %pages,
                "page_lock.dump.owner"
            );
        }
        if self.strategy == ThreadDumpStrategy::AllThreads {
            warn!(
                requester = %timeout.requester,
                backtrace = %Backtrace::capture(),
                "page_lock.dump.requester"
            );
        }
    }
}
