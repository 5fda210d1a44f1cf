//! Object Pool Module
//!
//! Bounded pool of reusable instances that are expensive or unsafe to
//! create without limit.
//!
//! ## Responsibilities
//! - Hand out a free instance when one exists
//! - Lazily construct up to `max_pool_size` instances, each slot exactly once
//! - Make borrowers wait (never fail) once every instance is out
//!
//! ## Slot Claiming
//! ```text
//!   head ──► 0   1   2   3   ...   max_pool_size-1
//!           [x] [x] [x] [ ] ...   [ ]
//!            claimed     └─ next CAS on `head` claims this slot
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

/// Creates pool instances
pub type ObjectFactory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Reports whether an instance is currently idle
pub type IdlePredicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Default capacity when none is given
pub const DEFAULT_POOL_SIZE: usize = 25;

/// Default wait slice for borrowers on an exhausted pool
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Generic fixed-capacity object pool
///
/// ## Concurrency:
/// - `head`: atomic slot counter, advanced by compare-and-swap
/// - `slots`: fixed array, each slot written once by the claiming thread
/// - `free_tx`/`free_rx`: bounded channel holding returned instances
pub struct ObjectPool<T> {
    factory: ObjectFactory<T>,
    is_idle: IdlePredicate<T>,
    max_pool_size: usize,
    poll_interval: Duration,

    /// Every instance ever created, for diagnostics
    slots: Box<[OnceLock<T>]>,

    /// Number of claimed slots
    head: AtomicUsize,

    free_tx: Sender<T>,
    free_rx: Receiver<T>,
}

impl<T: Clone + Send> ObjectPool<T> {
    /// Create a pool with the default capacity
    pub fn new(factory: ObjectFactory<T>, is_idle: IdlePredicate<T>) -> Self {
        Self::with_capacity(factory, is_idle, DEFAULT_POOL_SIZE)
    }

    /// Create a pool constructing at most `max_pool_size` instances
    pub fn with_capacity(
        factory: ObjectFactory<T>,
        is_idle: IdlePredicate<T>,
        max_pool_size: usize,
    ) -> Self {
        let max_pool_size = max_pool_size.max(1);
        let (free_tx, free_rx) = channel::bounded(max_pool_size);
        let slots = (0..max_pool_size).map(|_| OnceLock::new()).collect();

        Self {
            factory,
            is_idle,
            max_pool_size,
            poll_interval: DEFAULT_POLL_INTERVAL,
            slots,
            head: AtomicUsize::new(0),
            free_tx,
            free_rx,
        }
    }

    /// Set how long an exhausted borrower waits before polling again
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Borrow an instance, waiting for a return if the pool is exhausted
    ///
    /// Order of preference:
    /// 1. An already free instance
    /// 2. A freshly constructed instance in the next unclaimed slot
    /// 3. The next instance returned by another holder
    pub fn borrow(&self) -> T {
        if let Some(object) = self.try_borrow() {
            return object;
        }

        let started = Instant::now();
        loop {
            match self.free_rx.recv_timeout(self.poll_interval) {
                Ok(object) => {
                    tracing::trace!(waited = ?started.elapsed(), "pool borrow satisfied by a return");
                    return object;
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::trace!(waited = ?started.elapsed(), "pool exhausted, still waiting");
                }
                // Both channel ends live in `self`
                Err(RecvTimeoutError::Disconnected) => unreachable!("pool channel closed"),
            }
        }
    }

    /// Borrow an instance, giving up after `timeout`
    pub fn borrow_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(object) = self.try_borrow() {
            return Some(object);
        }
        self.free_rx.recv_timeout(timeout).ok()
    }

    /// Make an instance available to the next borrower. No validation.
    pub fn return_object(&self, object: T) {
        // Capacity equals the number of instances, so this can't block
        // unless foreign instances are returned.
        let _ = self.free_tx.send(object);
    }

    /// Number of slots ever claimed
    pub fn pool_size(&self) -> usize {
        self.head.load(Ordering::Acquire).min(self.max_pool_size)
    }

    /// Number of constructed instances that are currently not idle
    pub fn in_use(&self) -> usize {
        self.slots[..self.pool_size()]
            .iter()
            .filter_map(OnceLock::get)
            .filter(|object| !(self.is_idle)(object))
            .count()
    }

    /// Maximum number of instances
    pub fn capacity(&self) -> usize {
        self.max_pool_size
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Free instance or a new one, without waiting
    fn try_borrow(&self) -> Option<T> {
        if let Ok(object) = self.free_rx.try_recv() {
            return Some(object);
        }
        self.claim_slot()
    }

    /// Claim the next slot and construct its instance
    fn claim_slot(&self) -> Option<T> {
        let mut claimed = self.head.load(Ordering::Acquire);
        loop {
            if claimed >= self.max_pool_size {
                return None;
            }
            match self.head.compare_exchange_weak(
                claimed,
                claimed + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => claimed = current,
            }
        }

        tracing::trace!(slot = claimed, "constructing pooled object");
        let object = self.slots[claimed].get_or_init(|| (self.factory)()).clone();
        Some(object)
    }
}
