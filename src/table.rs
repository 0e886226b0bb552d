use crate::store::TypedStore;
use crate::tag::{Tag, TagInner};
use std::collections::HashMap;
use std::sync::Weak;
use uuid::Uuid;

/// One thread's store, linked to its tag without keeping the tag alive
struct Namespace {
    owner: Weak<TagInner>,
    store: TypedStore,
}

impl Namespace {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// Every thread's namespace in one cache, keyed by tag id.
///
/// Entries whose tag has been dropped are stale: lookups never return them and
/// `is_empty` ignores them until they are reclaimed or expunged.
#[derive(Default)]
pub(crate) struct NamespaceTable {
    namespaces: HashMap<Uuid, Namespace>,
}

impl NamespaceTable {
    pub(crate) fn store(&self, tag: &Tag) -> Option<&TypedStore> {
        self.namespaces
            .get(&tag.id())
            .filter(|ns| ns.is_live())
            .map(|ns| &ns.store)
    }

    pub(crate) fn store_mut(&mut self, tag: &Tag) -> Option<&mut TypedStore> {
        self.namespaces
            .get_mut(&tag.id())
            .filter(|ns| ns.is_live())
            .map(|ns| &mut ns.store)
    }

    pub(crate) fn store_or_insert(&mut self, tag: &Tag) -> &mut TypedStore {
        &mut self
            .namespaces
            .entry(tag.id())
            .or_insert_with(|| Namespace {
                owner: tag.downgrade(),
                store: TypedStore::default(),
            })
            .store
    }

    /// Detaches a namespace so its values can be dropped outside the lock
    pub(crate) fn reclaim(&mut self, id: &Uuid) -> Option<TypedStore> {
        self.namespaces.remove(id).map(|ns| ns.store)
    }

    /// Detaches every stale namespace
    pub(crate) fn expunge_stale(&mut self) -> Vec<TypedStore> {
        let stale: Vec<Uuid> = self
            .namespaces
            .iter()
            .filter(|(_, ns)| !ns.is_live())
            .map(|(id, _)| *id)
            .collect();
        stale.iter().filter_map(|id| self.reclaim(id)).collect()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.namespaces.values().filter(|ns| ns.is_live()).count()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::NamespaceTable;
    use crate::tag::Tag;
    use std::sync::Weak;

    #[test]
    fn test_namespaces_are_keyed_by_tag() {
        let mut table = NamespaceTable::default();
        let a = Tag::mint(Weak::new());
        let b = Tag::mint(Weak::new());

        table.store_or_insert(&a).insert("k".into(), 1u8).unwrap();
        assert!(table.store(&b).is_none());
        assert_eq!(*table.store(&a).unwrap().get::<u8>("k").unwrap(), 1);
        assert_eq!(table.live_count(), 1);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_dropped_tag_leaves_stale_entry() {
        let mut table = NamespaceTable::default();
        let tag = Tag::mint(Weak::new());
        let id = tag.id();
        table.store_or_insert(&tag).insert("k".into(), 1u8).unwrap();

        drop(tag);
        assert!(table.is_empty());

        let expunged = table.expunge_stale();
        assert_eq!(expunged.len(), 1);
        assert_eq!(expunged[0].total(), 1);
        assert!(table.reclaim(&id).is_none());
    }

    #[test]
    fn test_clone_keeps_namespace_live() {
        let mut table = NamespaceTable::default();
        let tag = Tag::mint(Weak::new());
        let held = tag.clone();
        table.store_or_insert(&tag).insert("k".into(), 1u8).unwrap();

        drop(tag);
        assert!(!table.is_empty());
        assert!(table.expunge_stale().is_empty());
        assert!(table.store(&held).is_some());
    }
}
