//! Optimistic read / exclusive write coordination for the namespace table.
//!
//! A version counter sits beside a `parking_lot::RwLock`. Writers hold the
//! lock exclusively and keep the version odd for as long as they are
//! mutating. Readers take a stamp, try a non-blocking shared acquisition,
//! and accept it only if the stamp is still current; otherwise they fall back
//! to a blocking shared read, which always yields a consistent view.

use parking_lot::{RwLock, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

pub(crate) struct StampedLock<T> {
    version: AtomicU64,
    data: RwLock<T>,
}

impl<T> StampedLock<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            version: AtomicU64::new(0),
            data: RwLock::new(data),
        }
    }

    /// Returns a stamp for an optimistic read, or `None` while a writer is active
    pub(crate) fn try_optimistic_read(&self) -> Option<u64> {
        let stamp = self.version.load(Ordering::Acquire);
        (stamp & 1 == 0).then_some(stamp)
    }

    /// True if no write has started since `stamp` was taken
    pub(crate) fn validate(&self, stamp: u64) -> bool {
        self.version.load(Ordering::Acquire) == stamp
    }

    /// Runs `f` against a consistent view of the data.
    ///
    /// `f` is called exactly once, on either the optimistic or the escalated path.
    pub(crate) fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        if let Some(stamp) = self.try_optimistic_read() {
            if let Some(guard) = self.data.try_read() {
                if self.validate(stamp) {
                    return f(&guard);
                }
            }
        }

        trace!("optimistic read invalidated, escalating to shared lock");
        // Recursive, so a read nested inside another read's closure does not
        // queue behind a waiting writer.
        let guard = self.data.read_recursive();
        f(&guard)
    }

    /// Acquires exclusive access, blocking until every reader and writer is gone
    pub(crate) fn write(&self) -> StampedWriteGuard<'_, T> {
        StampedWriteGuard::begin(&self.version, self.data.write())
    }

    /// Acquires exclusive access, giving up after `timeout`
    pub(crate) fn try_write_for(&self, timeout: Duration) -> Option<StampedWriteGuard<'_, T>> {
        self.data
            .try_write_for(timeout)
            .map(|guard| StampedWriteGuard::begin(&self.version, guard))
    }
}

/// Exclusive access to the data; the version stays odd until this is dropped
pub(crate) struct StampedWriteGuard<'a, T> {
    version: &'a AtomicU64,
    guard: RwLockWriteGuard<'a, T>,
}

impl<'a, T> StampedWriteGuard<'a, T> {
    fn begin(version: &'a AtomicU64, guard: RwLockWriteGuard<'a, T>) -> Self {
        version.fetch_add(1, Ordering::AcqRel);
        Self { version, guard }
    }
}

impl<T> Deref for StampedWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for StampedWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for StampedWriteGuard<'_, T> {
    fn drop(&mut self) {
        // Still holding the lock here; the field guard is released afterwards.
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}
