use crate::error::{CacheError, Result};
use crate::stamped::StampedLock;
use crate::table::NamespaceTable;
use crate::tag::{self, Tag};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, trace, warn};
use uuid::Uuid;

const DEFAULT_NAME: &str = "thread-cache";

/// How long a dropped tag waits for the table before leaving its namespace stale
const RECLAIM_WAIT: Duration = Duration::from_millis(100);

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(0);

static GLOBAL: LazyLock<ThreadCache> = LazyLock::new(|| ThreadCache::named("global"));

pub(crate) struct CacheShared {
    id: u64,
    name: String,
    table: StampedLock<NamespaceTable>,
    needs_sweep: AtomicBool,
}

impl CacheShared {
    /// Called when the last handle to a tag is dropped
    pub(crate) fn reclaim(&self, id: Uuid) {
        let Some(mut table) = self.table.try_write_for(RECLAIM_WAIT) else {
            warn!(cache = %self.name, tag = %id, "table busy, leaving namespace for the next sweep");
            self.needs_sweep.store(true, Ordering::Release);
            return;
        };
        let store = table.reclaim(&id);
        drop(table);

        if let Some(store) = store {
            debug!(
                cache = %self.name,
                tag = %id,
                entries = store.total(),
                types = ?store.type_names(),
                "reclaimed namespace"
            );
        }
    }
}

/// A thread-scoped, type-keyed object cache.
///
/// Each thread that calls [`initialise`](Self::initialise) gets a private
/// namespace. Inside it, values are partitioned by their type and then by a
/// string key, so `get::<Connection>("primary")` and `get::<Config>("primary")`
/// never collide, and no thread can observe another thread's entries.
///
/// Reads use an optimistic protocol and only block while a write is in
/// flight; writes are exclusive. A namespace is reclaimed once its thread has
/// called [`close`](Self::close) (or exited) and no clone of its [`Tag`] remains.
///
/// Cloning a `ThreadCache` yields another handle to the same table.
///
/// # Examples
///
/// ```
/// use sovran_threadcache::{CacheError, ThreadCache};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct RequestId(u64);
///
/// let cache = ThreadCache::new();
/// cache.initialise();
///
/// cache.add("current", RequestId(7))?;
/// assert_eq!(cache.get::<RequestId>("current")?, RequestId(7));
/// assert_eq!(cache.length::<RequestId>()?, 1);
///
/// // Nothing of this type was ever added by this thread
/// assert!(matches!(cache.get::<String>("current"), Err(CacheError::MissingType(_))));
///
/// cache.close();
/// assert!(cache.is_empty());
/// # Ok::<(), CacheError>(())
/// ```
#[derive(Clone)]
pub struct ThreadCache {
    shared: Arc<CacheShared>,
}

impl ThreadCache {
    /// Creates a new, empty cache
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    /// Creates a new, empty cache labelled `name` in log output
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                table: StampedLock::new(NamespaceTable::default()),
                needs_sweep: AtomicBool::new(false),
            }),
        }
    }

    /// The process-wide cache used by the crate's free functions
    pub fn global() -> &'static ThreadCache {
        &GLOBAL
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Mints a fresh tag for the calling thread.
    ///
    /// Any tag the thread already held is replaced, and its namespace is
    /// reclaimed once nothing else references it.
    pub fn initialise(&self) {
        let tag = Tag::mint(Arc::downgrade(&self.shared));
        debug!(cache = %self.shared.name, tag = %tag, "initialised thread context");

        match tag::install(self.shared.id, tag) {
            Ok(Some(previous)) => {
                debug!(cache = %self.shared.name, tag = %previous, "replaced previous thread context");
            }
            Ok(None) => {}
            Err(tag) => {
                warn!(cache = %self.shared.name, tag = %tag, "thread is shutting down, context not installed");
            }
        }
    }

    /// Releases the calling thread's tag. Does nothing if the thread is not initialised.
    pub fn close(&self) {
        if let Some(tag) = tag::take(self.shared.id) {
            debug!(cache = %self.shared.name, tag = %tag, "closed thread context");
        }
    }

    pub fn is_initialised(&self) -> bool {
        tag::is_active(self.shared.id)
    }

    /// Returns a handle to the calling thread's tag.
    ///
    /// Holding it keeps this thread's namespace alive after `close`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Uninitialised` if the thread has no active tag.
    pub fn tag(&self) -> Result<Tag> {
        tag::current(self.shared.id).ok_or(CacheError::Uninitialised)
    }

    /// Runs `f` with exclusive access to the table.
    ///
    /// Stale namespaces are expunged first; their values, like anything `f`
    /// hands back, are dropped only after the lock is released.
    fn write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut NamespaceTable) -> R,
    {
        let mut table = self.shared.table.write();
        let expunged = if self.shared.needs_sweep.swap(false, Ordering::AcqRel) {
            table.expunge_stale()
        } else {
            Vec::new()
        };
        let result = f(&mut table);
        drop(table);

        if !expunged.is_empty() {
            debug!(cache = %self.shared.name, count = expunged.len(), "expunged stale namespaces");
        }
        result
    }

    /// Stores `value` under `key` for the calling thread, replacing any value
    /// of the same type already stored there.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Uninitialised` if the thread has no active tag.
    ///
    /// # Returns
    ///
    /// The value previously stored under `key` for type `T`, if any.
    pub fn add<T>(&self, key: impl Into<String>, value: T) -> Result<Option<T>>
    where
        T: Any + Send + Sync,
    {
        let tag = self.tag()?;
        let key = key.into();
        trace!(cache = %self.shared.name, tag = %tag, key = %key, value_type = type_name::<T>(), "add");
        self.write(|table| table.store_or_insert(&tag).insert(key, value))
    }

    /// Retrieves a clone of the value stored under `key`
    ///
    /// # Errors
    ///
    /// - Returns `CacheError::Uninitialised` if the thread has no active tag
    /// - Returns `CacheError::MissingType` if nothing of type `T` was added by this thread
    /// - Returns `CacheError::MissingKey` if values of type `T` exist but not under `key`
    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: Any + Send + Sync + Clone,
    {
        self.with(key, T::clone)
    }

    /// Runs `f` on the value stored under `key` without cloning it.
    ///
    /// # Examples
    ///
    /// ```
    /// use sovran_threadcache::{CacheError, ThreadCache};
    ///
    /// let cache = ThreadCache::new();
    /// cache.initialise();
    /// cache.add("scratch", vec![0u8; 1024])?;
    ///
    /// let size = cache.with("scratch", |buf: &Vec<u8>| buf.len())?;
    /// assert_eq!(size, 1024);
    /// # Ok::<(), CacheError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn with<T, F, R>(&self, key: &str, f: F) -> Result<R>
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) -> R,
    {
        let tag = self.tag()?;
        self.shared.table.read(|table| {
            let store = table
                .store(&tag)
                .ok_or_else(|| CacheError::MissingType(type_name::<T>()))?;
            store.get::<T>(key).map(f)
        })
    }

    /// Runs `f` on a mutable reference to the value stored under `key`.
    ///
    /// The table is held exclusively while `f` runs.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn with_mut<T, F, R>(&self, key: &str, f: F) -> Result<R>
    where
        T: Any + Send + Sync,
        F: FnOnce(&mut T) -> R,
    {
        let tag = self.tag()?;
        self.write(|table| {
            let store = table
                .store_mut(&tag)
                .ok_or_else(|| CacheError::MissingType(type_name::<T>()))?;
            store.get_mut::<T>(key).map(f)
        })
    }

    /// Removes and returns the value stored under `key`
    ///
    /// # Errors
    ///
    /// - Returns `CacheError::Uninitialised` if the thread has no active tag
    /// - Returns `CacheError::MissingType` if nothing of type `T` was added by this thread
    ///
    /// # Returns
    ///
    /// `Ok(None)` if values of type `T` exist but none under `key`.
    pub fn remove<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: Any + Send + Sync,
    {
        let tag = self.tag()?;
        trace!(cache = %self.shared.name, tag = %tag, key = %key, value_type = type_name::<T>(), "remove");
        self.write(|table| {
            table
                .store_mut(&tag)
                .ok_or_else(|| CacheError::MissingType(type_name::<T>()))?
                .remove::<T>(key)
        })
    }

    /// Returns true if a value of type `T` is stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Uninitialised` if the thread has no active tag.
    pub fn contains_key<T>(&self, key: &str) -> Result<bool>
    where
        T: Any + Send + Sync,
    {
        let tag = self.tag()?;
        Ok(self
            .shared
            .table
            .read(|table| table.store(&tag).is_some_and(|store| store.contains::<T>(key))))
    }

    /// Returns the keys holding values of type `T`, in no particular order
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Uninitialised` if the thread has no active tag.
    pub fn keys<T>(&self) -> Result<Vec<String>>
    where
        T: Any + Send + Sync,
    {
        let tag = self.tag()?;
        Ok(self
            .shared
            .table
            .read(|table| table.store(&tag).map(|store| store.keys::<T>()).unwrap_or_default()))
    }

    /// Returns how many values of type `T` the calling thread has stored
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Uninitialised` if the thread has no active tag.
    pub fn length<T>(&self) -> Result<usize>
    where
        T: Any + Send + Sync,
    {
        let tag = self.tag()?;
        Ok(self
            .shared
            .table
            .read(|table| table.store(&tag).map_or(0, |store| store.len_of::<T>())))
    }

    /// Drops every value the calling thread has stored, keeping its tag active
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Uninitialised` if the thread has no active tag.
    pub fn clear(&self) -> Result<()> {
        let tag = self.tag()?;
        let cleared = self.write(|table| table.store_mut(&tag).map(std::mem::take));
        if let Some(store) = cleared {
            debug!(cache = %self.shared.name, tag = %tag, entries = store.total(), "cleared thread context");
        }
        Ok(())
    }

    /// Returns true if no thread currently has a live namespace in this cache.
    ///
    /// Does not require the calling thread to be initialised.
    pub fn is_empty(&self) -> bool {
        self.shared.table.read(NamespaceTable::is_empty)
    }
}

impl Default for ThreadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCache")
            .field("name", &self.shared.name)
            .field("id", &self.shared.id)
            .finish()
    }
}
