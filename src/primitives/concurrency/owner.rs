use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use super::page_lock::PageLock;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_OWNER: Owner = Owner::for_current_thread();
    static SCOPED_OWNERS: RefCell<Vec<Owner>> = const { RefCell::new(Vec::new()) };
}

/// Identity of a caller that can hold page locks.
///
/// Every thread gets an implicit owner on first use. Task-based callers that
/// hop between threads create an explicit owner with [`Owner::new`] and either
/// pass it to the `*_as` methods of the lock manager or install it with
/// [`Owner::scope`].
///
/// Owners compare by a process-unique id; the name is only for diagnostics.
#[derive(Clone)]
pub struct Owner {
    inner: Arc<OwnerInner>,
}

struct OwnerInner {
    id: u64,
    name: String,
    interrupted: AtomicBool,
    parked_on: Mutex<Option<Arc<PageLock>>>,
}

impl Owner {
    /// Creates a new owner with a fresh identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(OwnerInner {
                id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                interrupted: AtomicBool::new(false),
                parked_on: Mutex::new(None),
            }),
        }
    }

    fn for_current_thread() -> Self {
        let current = thread::current();
        let name = match current.name() {
            Some(name) => name.to_owned(),
            None => format!("{:?}", current.id()),
        };
        Self::new(name)
    }

    /// Returns the owner of the calling context.
    ///
    /// This is the innermost [`Owner::scope`] override on this thread, or the
    /// thread's own owner when no scope is active.
    pub fn current() -> Owner {
        SCOPED_OWNERS
            .with(|scoped| scoped.borrow().last().cloned())
            .unwrap_or_else(|| THREAD_OWNER.with(Owner::clone))
    }

    /// Runs `f` with `self` installed as [`Owner::current`] on this thread.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        struct PopOnDrop;

        impl Drop for PopOnDrop {
            fn drop(&mut self) {
                SCOPED_OWNERS.with(|scoped| {
                    scoped.borrow_mut().pop();
                });
            }
        }

        SCOPED_OWNERS.with(|scoped| scoped.borrow_mut().push(self.clone()));
        let _pop = PopOnDrop;
        f()
    }

    /// Process-unique id of this owner.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Diagnostic name of this owner.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Interrupts this owner.
    ///
    /// If the owner is waiting for a page lock the wait fails with
    /// [`PageSyncError::Interrupted`](crate::types::PageSyncError::Interrupted).
    /// Otherwise the flag stays set and the next wait fails immediately.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        let parked = self.inner.parked_on.lock().clone();
        if let Some(lock) = parked {
            lock.wake_all();
        }
    }

    /// Returns true if an interrupt is pending.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Consumes a pending interrupt.
    pub(crate) fn take_interrupt(&self) -> bool {
        self.inner.interrupted.swap(false, Ordering::SeqCst)
    }

    // Must be called with the lock's state mutex held, before the interrupt
    // flag is checked, so `interrupt` cannot miss the parked waiter.
    pub(crate) fn park_on(&self, lock: &Arc<PageLock>) {
        *self.inner.parked_on.lock() = Some(Arc::clone(lock));
    }

    pub(crate) fn unpark(&self) {
        self.inner.parked_on.lock().take();
    }
}

impl PartialEq for Owner {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Owner {}

impl Hash for Owner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (#{})", self.inner.name, self.inner.id)
    }
}
