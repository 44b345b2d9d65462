//! Synchronized Page Manager Tests
//!
//! Verifies the lock discipline of a wrapped page manager:
//! - Misses and delegate errors never leave a lock behind
//! - Detach releases every lock of the caller, even when the delegate fails
//! - Pages fetched by one request block other requests until detach

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pagesync::{
    LockOptions, ManageablePage, MemoryPage, MemoryPageManager, Owner, PageId, PageLockManager,
    PageManager, PageSyncError, Result, ThreadDumpStrategy,
};

#[derive(Debug, Clone)]
struct TestPage(PageId);

impl ManageablePage for TestPage {
    fn page_id(&self) -> PageId {
        self.0
    }
}

/// Page manager with scripted failures.
#[derive(Default)]
struct FlakyManager {
    missing: bool,
    fail_get: bool,
    fail_detach: bool,
    detached: AtomicBool,
}

impl PageManager for FlakyManager {
    type Page = TestPage;
    type Store = str;

    fn supports_versioning(&self) -> bool {
        true
    }

    fn get_page(&self, page_id: PageId) -> Result<Option<TestPage>> {
        if self.fail_get {
            return Err(PageSyncError::store("read failed"));
        }
        Ok((!self.missing).then_some(TestPage(page_id)))
    }

    fn remove_page(&self, _page: &TestPage) -> Result<()> {
        Err(PageSyncError::store("remove failed"))
    }

    fn touch_page(&self, _page: &TestPage) -> Result<()> {
        Ok(())
    }

    fn untouch_page(&self, _page: &TestPage) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn detach(&self) -> Result<()> {
        self.detached.store(true, Ordering::SeqCst);
        if self.fail_detach {
            return Err(PageSyncError::store("detach failed"));
        }
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        Ok(())
    }

    fn page_store(&self) -> &str {
        "flaky"
    }
}

fn lock_manager(timeout: Duration) -> Arc<PageLockManager> {
    Arc::new(PageLockManager::new(LockOptions {
        timeout,
        thread_dump: ThreadDumpStrategy::NoThreads,
    }))
}

#[test]
fn get_miss_leaves_no_lock() -> Result<()> {
    let locks = lock_manager(Duration::from_secs(1));
    let pages = locks.wrap(FlakyManager {
        missing: true,
        ..FlakyManager::default()
    });

    assert!(pages.get_page(PageId(5))?.is_none());
    assert!(locks.holder(PageId(5)).is_none());
    assert!(locks.held_pages(&Owner::current()).is_empty());
    Ok(())
}

#[test]
fn get_error_leaves_no_lock() {
    let locks = lock_manager(Duration::from_secs(1));
    let pages = locks.wrap(FlakyManager {
        fail_get: true,
        ..FlakyManager::default()
    });

    let err = pages.get_page(PageId(6)).expect_err("read fails");
    assert!(matches!(err, PageSyncError::Store(_)));
    assert!(locks.is_empty());
}

#[test]
fn failing_detach_still_releases_locks() -> Result<()> {
    let locks = lock_manager(Duration::from_secs(1));
    let pages = locks.wrap(FlakyManager {
        fail_detach: true,
        ..FlakyManager::default()
    });

    pages.touch_page(&TestPage(PageId(7)))?;
    let fetched = pages.get_page(PageId(8))?;
    assert!(fetched.is_some());
    assert_eq!(
        locks.held_pages(&Owner::current()),
        vec![PageId(7), PageId(8)]
    );

    let err = pages.detach().expect_err("delegate detach fails");
    assert_eq!(err.to_string(), "page store: detach failed");
    assert!(pages.inner().detached.load(Ordering::SeqCst));
    assert!(locks.is_empty());
    Ok(())
}

#[test]
fn failing_remove_still_releases_page() -> Result<()> {
    let locks = lock_manager(Duration::from_secs(1));
    let pages = locks.wrap(FlakyManager::default());

    let page = pages.get_page(PageId(3))?.expect("page");
    assert!(pages.remove_page(&page).is_err());
    assert!(locks.holder(PageId(3)).is_none());
    Ok(())
}

#[test]
fn passthrough_calls_reach_delegate() -> Result<()> {
    let locks = lock_manager(Duration::from_secs(1));
    let pages = locks.wrap(FlakyManager::default());
    assert!(pages.supports_versioning());
    assert_eq!(pages.page_store(), "flaky");
    pages.untouch_page(&TestPage(PageId(1)))?;
    pages.clear()?;
    pages.destroy()?;
    assert!(locks.is_empty());
    Ok(())
}

/// Test: A fetched page blocks other requests until the fetching request detaches.
#[test]
fn fetched_page_blocks_other_requests_until_detach() -> Result<()> {
    let locks = lock_manager(Duration::from_secs(5));
    let manager = MemoryPageManager::default();
    manager
        .page_store()
        .insert(MemoryPage::new(PageId(1), b"v1".to_vec()));
    let pages = Arc::new(locks.wrap(manager));

    let first = pages.get_page(PageId(1))?.expect("page 1");
    pages.touch_page(&first.with_data(b"v2".to_vec()))?;

    let second = {
        let pages = Arc::clone(&pages);
        thread::spawn(move || -> Result<(Vec<u8>, Duration)> {
            let start = Instant::now();
            let page = pages.get_page(PageId(1))?.expect("page 1");
            let waited = start.elapsed();
            pages.detach()?;
            Ok((page.data().to_vec(), waited))
        })
    };

    thread::sleep(Duration::from_millis(100));
    pages.detach()?;

    let (data, waited) = second.join().unwrap()?;
    assert_eq!(data, b"v2".to_vec());
    assert!(waited >= Duration::from_millis(50), "waited {waited:?}");
    assert!(locks.is_empty());
    Ok(())
}

#[test]
fn contended_touch_times_out() -> Result<()> {
    let locks = lock_manager(Duration::from_millis(50));
    let pages = Arc::new(locks.wrap(MemoryPageManager::default()));
    let page = MemoryPage::new(PageId(2), Vec::new());
    pages.touch_page(&page)?;

    let other = {
        let pages = Arc::clone(&pages);
        let page = page.clone();
        thread::spawn(move || pages.touch_page(&page))
    };
    let err = other.join().unwrap().expect_err("held by this thread");
    let timeout = err.as_timeout().expect("timeout");
    assert_eq!(timeout.holder, Owner::current());
    assert_eq!(timeout.timeout, Duration::from_millis(50));

    pages.detach()?;
    Ok(())
}
