//! Page Lock Manager Tests
//!
//! Exercises the lock manager the way concurrent requests use it:
//! - Contended acquisition times out after the allotted time and names the holder
//! - Releases wake waiters before their deadline
//! - `unlock_all` frees every page an owner holds
//! - The deadline is absolute across wake-ups

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use pagesync::{
    LockOptions, Owner, PageId, PageLockManager, PageSyncError, Result, ThreadDumpStrategy,
};

const SLACK: Duration = Duration::from_secs(2);

fn manager(timeout: Duration, thread_dump: ThreadDumpStrategy) -> Arc<PageLockManager> {
    Arc::new(PageLockManager::new(LockOptions {
        timeout,
        thread_dump,
    }))
}

/// Test: Holder reported on timeout, then freed by unlock_all
///
/// A locks page 1; B times out after ~100ms naming A; A releases everything;
/// C then locks page 1 without waiting.
#[test]
fn timeout_then_unlock_all_frees_page() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::ThreadHoldingLock);
    let a = Owner::new("A");
    let b = Owner::new("B");
    let c = Owner::new("C");

    locks.lock_as(&a, PageId(1), Duration::from_millis(100))?;

    let start = Instant::now();
    let err = locks
        .lock_as(&b, PageId(1), Duration::from_millis(100))
        .expect_err("page 1 is held by A");
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(100), "gave up after {waited:?}");
    assert!(waited < Duration::from_millis(100) + SLACK, "gave up after {waited:?}");

    let timeout = err.as_timeout().expect("timeout error");
    assert_eq!(timeout.page_id, PageId(1));
    assert_eq!(timeout.holder, a);
    assert_eq!(timeout.requester, b);
    assert_eq!(timeout.timeout, Duration::from_millis(100));
    assert!(timeout.elapsed >= Duration::from_millis(100));

    locks.unlock_all_as(&a);

    let start = Instant::now();
    locks.lock_as(&c, PageId(1), Duration::from_millis(1000))?;
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(locks.holder(PageId(1)), Some(c));
    Ok(())
}

#[test]
fn reentrant_lock_succeeds_immediately() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::NoThreads);
    let a = Owner::new("A");
    locks.lock_as(&a, PageId(4), Duration::from_secs(1))?;
    for timeout in [Duration::ZERO, Duration::from_millis(1), Duration::from_secs(30)] {
        let start = Instant::now();
        locks.lock_as(&a, PageId(4), timeout)?;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
    Ok(())
}

#[test]
fn release_ends_wait_early() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::NoThreads);
    let a = Owner::new("A");
    locks.lock_as(&a, PageId(2), Duration::ZERO)?;

    let waiter = {
        let locks = Arc::clone(&locks);
        thread::spawn(move || {
            let start = Instant::now();
            let result = locks.lock(PageId(2), Duration::from_secs(10));
            (result, start.elapsed(), Owner::current())
        })
    };

    thread::sleep(Duration::from_millis(100));
    locks.unlock_as(&a, PageId(2));

    let (result, waited, b) = waiter.join().unwrap();
    result?;
    assert!(waited < Duration::from_secs(5), "waited {waited:?}");
    assert_eq!(locks.holder(PageId(2)), Some(b));
    Ok(())
}

#[test]
fn unlock_all_wakes_waiters_on_every_page() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::NoThreads);
    let a = Owner::new("A");
    for page in 0..3 {
        locks.lock_as(&a, PageId(page), Duration::ZERO)?;
    }

    let acquired = Arc::new(AtomicUsize::new(0));
    let waiters: Vec<_> = (0..3)
        .map(|page| {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || -> Result<Duration> {
                let start = Instant::now();
                locks.lock(PageId(page), Duration::from_secs(10))?;
                acquired.fetch_add(1, Ordering::SeqCst);
                let waited = start.elapsed();
                locks.unlock_all();
                Ok(waited)
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(acquired.load(Ordering::SeqCst), 0);
    locks.unlock_all_as(&a);

    for waiter in waiters {
        let waited = waiter.join().unwrap()?;
        assert!(waited < Duration::from_secs(5), "waited {waited:?}");
    }
    assert_eq!(acquired.load(Ordering::SeqCst), 3);
    assert!(locks.is_empty());
    Ok(())
}

/// Test: Deadline is measured from the start of the call
///
/// Another owner repeatedly takes the page back after brief releases, waking
/// the waiter without letting it in. The waiter must still give up on time.
#[test]
fn deadline_is_not_reset_by_wakeups() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::NoThreads);
    let a = Owner::new("A");
    locks.lock_as(&a, PageId(9), Duration::ZERO)?;

    let churn = {
        let locks = Arc::clone(&locks);
        let a = a.clone();
        thread::spawn(move || {
            let until = Instant::now() + Duration::from_millis(600);
            while Instant::now() < until {
                thread::sleep(Duration::from_millis(20));
                // The waiter may win the page between these two calls.
                locks.unlock_as(&a, PageId(9));
                let _ = locks.lock_as(&a, PageId(9), Duration::from_millis(100));
            }
        })
    };

    let b = Owner::new("B");
    let start = Instant::now();
    let result = locks.lock_as(&b, PageId(9), Duration::from_millis(250));
    let waited = start.elapsed();
    churn.join().unwrap();

    match result {
        Err(err) => {
            assert!(err.is_timeout());
            assert!(waited >= Duration::from_millis(250));
            assert!(waited < Duration::from_millis(250) + SLACK, "gave up after {waited:?}");
        }
        Ok(()) => assert!(waited < Duration::from_millis(250) + SLACK),
    }
    Ok(())
}

#[test]
fn interrupted_waiter_surfaces_interrupted_error() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::NoThreads);
    let a = Owner::new("A");
    locks.lock_as(&a, PageId(5), Duration::ZERO)?;

    let task = Owner::new("task");
    let waiter = {
        let locks = Arc::clone(&locks);
        let task = task.clone();
        thread::spawn(move || task.scope(|| locks.lock(PageId(5), Duration::from_secs(30))))
    };

    thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    task.interrupt();

    match waiter.join().unwrap() {
        Err(PageSyncError::Interrupted { page_id, owner }) => {
            assert_eq!(page_id, PageId(5));
            assert_eq!(owner, task);
        }
        other => panic!("expected Interrupted, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(locks.held_pages(&task).is_empty());
    Ok(())
}

#[test]
fn unrelated_pages_do_not_block_each_other() -> Result<()> {
    const OWNERS: usize = 8;
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::NoThreads);
    let barrier = Arc::new(Barrier::new(OWNERS));

    let handles: Vec<_> = (0..OWNERS)
        .map(|i| {
            let locks = Arc::clone(&locks);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                locks.lock(PageId(i as u64), Duration::ZERO)?;
                // Every owner holds its page at the barrier, so each lock
                // above succeeded without waiting on anyone else.
                barrier.wait();
                locks.unlock(PageId(i as u64));
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap()?;
    }
    assert!(locks.is_empty());
    Ok(())
}

#[test]
fn all_threads_dump_does_not_change_outcome() -> Result<()> {
    let locks = manager(Duration::from_secs(60), ThreadDumpStrategy::AllThreads);
    let a = Owner::new("A");
    let other = Owner::new("other");
    locks.lock_as(&a, PageId(1), Duration::ZERO)?;
    locks.lock_as(&other, PageId(2), Duration::ZERO)?;

    let err = locks
        .lock_as(&Owner::new("B"), PageId(1), Duration::from_millis(20))
        .expect_err("held");
    assert_eq!(err.as_timeout().map(|t| t.holder.clone()), Some(a.clone()));
    assert_eq!(locks.len(), 2);
    Ok(())
}
