//! Page lock handle

use std::fmt;
use std::sync::Arc;

use super::manager::Shared;
use super::LockObject;

/// Read/write lock for one page, issued by [`LockManager`](super::LockManager)
///
/// Clones share the same handle. Operations run on the calling thread while
/// the lock is held; dropping the last clone hands the lock object back to
/// the pool.
#[derive(Clone)]
pub struct PageLock {
    pub(super) inner: Arc<HandleInner>,
}

pub(super) struct HandleInner {
    pub(super) id: u64,
    pub(super) page_nr: u32,
    pub(super) lock: LockObject,
    pub(super) shared: Arc<Shared>,
}

impl PageLock {
    /// Run `op` once while holding the page's read lock
    pub fn in_read_operation<R>(&self, op: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock.read();
        op()
    }

    /// Run `op` once while holding the page's write lock
    pub fn in_write_operation<R>(&self, op: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock.write();
        op()
    }

    pub fn page_nr(&self) -> u32 {
        self.inner.page_nr
    }

    /// Unique id of the handle (not of the page)
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether both values are clones of the same handle
    pub fn same_handle(&self, other: &PageLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PageLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageLock")
            .field("id", &self.inner.id)
            .field("page_nr", &self.inner.page_nr)
            .finish()
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.shared
            .release(self.page_nr, self.id, Arc::clone(&self.lock));
    }
}
