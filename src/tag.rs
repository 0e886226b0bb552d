//! Per-thread tags.
//!
//! A thread owns its tag through a thread-local slot; the namespace table only
//! links back to it weakly. When the last `Tag` handle goes away (on `close`,
//! re-initialisation, or thread exit) the owning cache is asked to reclaim the
//! namespace.

use crate::cache::CacheShared;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

pub(crate) struct TagInner {
    id: Uuid,
    cache: Weak<CacheShared>,
}

impl Drop for TagInner {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.reclaim(self.id);
        }
    }
}

/// Opaque identifier of one thread's namespace in a [`ThreadCache`](crate::ThreadCache).
///
/// Cloning a `Tag` keeps the namespace alive; it is reclaimed once the owning
/// thread has closed its context and every clone has been dropped.
#[derive(Clone)]
pub struct Tag {
    inner: Arc<TagInner>,
}

impl Tag {
    pub(crate) fn mint(cache: Weak<CacheShared>) -> Self {
        Self {
            inner: Arc::new(TagInner {
                id: Uuid::new_v4(),
                cache,
            }),
        }
    }

    /// The unique identifier minted for this tag
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub(crate) fn downgrade(&self) -> Weak<TagInner> {
        Arc::downgrade(&self.inner)
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Tag {}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tag").field(&self.inner.id).finish()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.id)
    }
}

thread_local! {
    // Keyed by cache id so independent caches keep independent tags.
    static ACTIVE: RefCell<HashMap<u64, Tag>> = RefCell::new(HashMap::new());
}

/// Makes `tag` the calling thread's active tag, returning the one it replaces.
///
/// Hands `tag` back as the error if thread-local storage is already torn down.
pub(crate) fn install(cache_id: u64, tag: Tag) -> Result<Option<Tag>, Tag> {
    let mut slot = Some(tag);
    let previous = ACTIVE.try_with(|active| {
        slot.take()
            .and_then(|tag| active.borrow_mut().insert(cache_id, tag))
    });
    match slot {
        Some(tag) => Err(tag),
        None => Ok(previous.ok().flatten()),
    }
}

/// Detaches the calling thread's tag; the caller decides when it is dropped
pub(crate) fn take(cache_id: u64) -> Option<Tag> {
    ACTIVE
        .try_with(|active| active.borrow_mut().remove(&cache_id))
        .ok()
        .flatten()
}

pub(crate) fn current(cache_id: u64) -> Option<Tag> {
    ACTIVE
        .try_with(|active| active.borrow().get(&cache_id).cloned())
        .ok()
        .flatten()
}

pub(crate) fn is_active(cache_id: u64) -> bool {
    ACTIVE
        .try_with(|active| active.borrow().contains_key(&cache_id))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{current, install, is_active, take, Tag};
    use std::sync::Weak;
    use std::thread;

    // Ids well away from anything a ThreadCache would allocate in this test binary.
    const CACHE_A: u64 = u64::MAX - 1;
    const CACHE_B: u64 = u64::MAX - 2;

    #[test]
    fn test_minted_tags_are_unique() {
        let a = Tag::mint(Weak::new());
        let b = Tag::mint(Weak::new());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.to_string(), a.id().to_string());
    }

    #[test]
    fn test_install_replaces_and_take_clears() {
        let first = Tag::mint(Weak::new());
        let second = Tag::mint(Weak::new());

        assert!(install(CACHE_A, first.clone()).unwrap().is_none());
        assert_eq!(install(CACHE_A, second.clone()).unwrap(), Some(first));
        assert_eq!(current(CACHE_A), Some(second.clone()));
        assert!(!is_active(CACHE_B));

        assert_eq!(take(CACHE_A), Some(second));
        assert!(!is_active(CACHE_A));
        assert!(take(CACHE_A).is_none());
    }

    #[test]
    fn test_slots_are_per_thread() {
        let tag = Tag::mint(Weak::new());
        install(CACHE_B, tag).unwrap();

        let seen_elsewhere = thread::spawn(|| current(CACHE_B)).join().unwrap();
        assert!(seen_elsewhere.is_none());
        assert!(is_active(CACHE_B));
        take(CACHE_B);
    }
}
