//! Lock Manager
//!
//! Issues one canonical lock handle per page and reclaims handles nobody
//! references anymore.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendError, Sender};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::Result;
use crate::pool::{ObjectPool, DEFAULT_POLL_INTERVAL};

use super::handle::{HandleInner, PageLock};
use super::LockObject;

/// Default time `shutdown()` waits for the reclaimer
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Work for the reclaimer thread
enum Message {
    /// The last clone of a handle was dropped
    Evict(Eviction),
    Shutdown,
}

struct Eviction {
    page_nr: u32,
    handle_id: u64,
    lock: LockObject,
}

/// State shared by the manager, its handles and the reclaimer thread
pub(super) struct Shared {
    /// page number → live handle (weak, so it doesn't keep handles alive)
    handles: DashMap<u32, Weak<HandleInner>>,
    pool: ObjectPool<LockObject>,
    next_id: AtomicU64,

    /// Evictions go to the reclaimer while this is true, inline otherwise
    running: Mutex<bool>,
    reclaim_tx: Sender<Message>,
}

impl Shared {
    /// Called when the last clone of a handle drops
    pub(super) fn release(&self, page_nr: u32, handle_id: u64, lock: LockObject) {
        let eviction = Eviction {
            page_nr,
            handle_id,
            lock,
        };

        let inline = {
            let running = self.running.lock();
            if *running {
                match self.reclaim_tx.send(Message::Evict(eviction)) {
                    Ok(()) => None,
                    Err(SendError(Message::Evict(eviction))) => Some(eviction),
                    Err(SendError(Message::Shutdown)) => None,
                }
            } else {
                Some(eviction)
            }
        };

        if let Some(eviction) = inline {
            self.evict(eviction);
        }
    }

    /// Drop the page's map entry if its handle is dead and recycle the lock
    fn evict(&self, eviction: Eviction) {
        let Eviction {
            page_nr,
            handle_id,
            lock,
        } = eviction;

        self.handles
            .remove_if(&page_nr, |_, handle| handle.strong_count() == 0);
        self.pool.return_object(lock);

        tracing::debug!(page_nr, handle_id, "reclaimed page lock handle");
    }
}

/// Hands out per-page lock handles backed by a bounded lock pool
///
/// ## Guarantees
/// - While any clone of a page's handle is alive, `lock_for_page` returns
///   that same handle
/// - Acquiring a lock never fails; an exhausted pool makes callers wait
/// - Two handles for one page may coexist briefly after the previous one was
///   dropped; they then use different lock objects, which is harmless since
///   the old one has no holders left
pub struct LockManager {
    shared: Arc<Shared>,
    reclaimer: Mutex<Option<Reclaimer>>,
    shutdown_timeout: Duration,
}

struct Reclaimer {
    thread: JoinHandle<()>,
    /// Disconnects when the reclaimer thread exits
    done_rx: Receiver<()>,
}

impl LockManager {
    /// Create a manager with `pool_size` lock objects and default timings
    pub fn new(pool_size: usize) -> Result<Self> {
        Self::build(pool_size, DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a manager sized and timed by the store configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(
            config.lock_pool_size,
            config.pool_poll_interval(),
            config.shutdown_timeout(),
        )
    }

    fn build(pool_size: usize, poll_interval: Duration, shutdown_timeout: Duration) -> Result<Self> {
        let pool = ObjectPool::with_capacity(
            Box::new(|| Arc::new(RwLock::new(()))),
            Box::new(|lock: &LockObject| !lock.is_locked()),
            pool_size,
        )
        .poll_interval(poll_interval);

        let (reclaim_tx, reclaim_rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            handles: DashMap::new(),
            pool,
            next_id: AtomicU64::new(1),
            running: Mutex::new(true),
            reclaim_tx,
        });

        let (done_tx, done_rx) = channel::bounded::<()>(0);
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("page-lock-reclaimer".to_string())
            .spawn(move || {
                let _done = done_tx;
                run_reclaimer(thread_shared, reclaim_rx);
            })?;

        Ok(Self {
            shared,
            reclaimer: Mutex::new(Some(Reclaimer { thread, done_rx })),
            shutdown_timeout,
        })
    }

    /// Get the canonical lock handle for a page
    pub fn lock_for_page(&self, page_nr: u32) -> PageLock {
        if let Some(handle) = self.live_handle(page_nr) {
            return handle;
        }

        // Borrow before touching the map: the pool may make us wait, and
        // waiting inside a map shard would stall unrelated pages
        let lock = self.shared.pool.borrow();

        let mut entry = self.shared.handles.entry(page_nr).or_default();
        if let Some(inner) = entry.upgrade() {
            // Someone else created it meanwhile
            drop(entry);
            self.shared.pool.return_object(lock);
            return PageLock { inner };
        }

        let inner = Arc::new(HandleInner {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            page_nr,
            lock,
            shared: Arc::clone(&self.shared),
        });
        *entry = Arc::downgrade(&inner);
        drop(entry);

        tracing::debug!(page_nr, handle_id = inner.id, "created page lock handle");
        PageLock { inner }
    }

    /// Stop the reclaimer thread, waiting up to the shutdown timeout
    ///
    /// Held locks are left alone. Handles dropped afterwards are reclaimed
    /// inline by the dropping thread. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let Some(reclaimer) = self.reclaimer.lock().take() else {
            return;
        };

        {
            let mut running = self.shared.running.lock();
            *running = false;
            // FIFO: every eviction queued so far is handled before this
            let _ = self.shared.reclaim_tx.send(Message::Shutdown);
        }

        match reclaimer.done_rx.recv_timeout(self.shutdown_timeout) {
            Err(channel::RecvTimeoutError::Disconnected) | Ok(()) => {
                if reclaimer.thread.join().is_err() {
                    tracing::warn!("page lock reclaimer panicked");
                }
                tracing::debug!("page lock reclaimer stopped");
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout = ?self.shutdown_timeout,
                    "page lock reclaimer did not stop in time"
                );
            }
        }
    }

    /// Number of lock objects constructed so far
    pub fn pool_size(&self) -> usize {
        self.shared.pool.pool_size()
    }

    /// Number of lock objects currently held by some operation
    pub fn locks_in_use(&self) -> usize {
        self.shared.pool.in_use()
    }

    /// Number of pages with a live handle
    pub fn live_handles(&self) -> usize {
        self.shared
            .handles
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn live_handle(&self, page_nr: u32) -> Option<PageLock> {
        let inner = self.shared.handles.get(&page_nr)?.upgrade()?;
        Some(PageLock { inner })
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reclaimer thread body: process evictions until told to stop
fn run_reclaimer(shared: Arc<Shared>, rx: Receiver<Message>) {
    for message in rx.iter() {
        match message {
            Message::Evict(eviction) => shared.evict(eviction),
            Message::Shutdown => break,
        }
    }
}
