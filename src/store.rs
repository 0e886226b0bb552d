use crate::any_value::AnyValue;
use crate::error::{CacheError, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

/// All values of one type cached by a single thread, by key
#[derive(Debug)]
struct TypeBucket {
    type_name: &'static str,
    entries: HashMap<String, AnyValue>,
}

/// One thread's private storage: values partitioned by type, then by key
#[derive(Debug, Default)]
pub(crate) struct TypedStore {
    buckets: HashMap<TypeId, TypeBucket>,
}

impl TypedStore {
    /// Inserts or overwrites `key`, returning whatever was there before
    pub(crate) fn insert<T>(&mut self, key: String, value: T) -> Result<Option<T>>
    where
        T: Any + Send + Sync,
    {
        let bucket = self
            .buckets
            .entry(TypeId::of::<T>())
            .or_insert_with(|| TypeBucket {
                type_name: type_name::<T>(),
                entries: HashMap::new(),
            });

        match bucket.entries.insert(key, AnyValue::new(value)) {
            None => Ok(None),
            Some(previous) => previous
                .into_inner::<T>()
                .map(Some)
                .map_err(|_| CacheError::TypeMismatch),
        }
    }

    fn bucket<T: 'static>(&self) -> Result<&TypeBucket> {
        self.buckets
            .get(&TypeId::of::<T>())
            .ok_or_else(|| CacheError::MissingType(type_name::<T>()))
    }

    fn bucket_mut<T: 'static>(&mut self) -> Result<&mut TypeBucket> {
        self.buckets
            .get_mut(&TypeId::of::<T>())
            .ok_or_else(|| CacheError::MissingType(type_name::<T>()))
    }

    pub(crate) fn get<T: 'static>(&self, key: &str) -> Result<&T> {
        let value = self
            .bucket::<T>()?
            .entries
            .get(key)
            .ok_or_else(|| CacheError::MissingKey(key.to_string()))?;
        value.downcast_ref::<T>().ok_or(CacheError::TypeMismatch)
    }

    pub(crate) fn get_mut<T: 'static>(&mut self, key: &str) -> Result<&mut T> {
        let value = self
            .bucket_mut::<T>()?
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::MissingKey(key.to_string()))?;
        value.downcast_mut::<T>().ok_or(CacheError::TypeMismatch)
    }

    /// Removes `key`; a missing key is `Ok(None)`, a missing type is an error.
    ///
    /// The bucket is kept even when it empties, so later lookups of the type
    /// report the key as missing rather than the type.
    pub(crate) fn remove<T: 'static>(&mut self, key: &str) -> Result<Option<T>> {
        let bucket = self.bucket_mut::<T>()?;
        let Some(value) = bucket.entries.remove(key) else {
            return Ok(None);
        };
        match value.into_inner::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(value) => {
                bucket.entries.insert(key.to_string(), value);
                Err(CacheError::TypeMismatch)
            }
        }
    }

    pub(crate) fn contains<T: 'static>(&self, key: &str) -> bool {
        self.bucket::<T>()
            .map(|bucket| bucket.entries.contains_key(key))
            .unwrap_or(false)
    }

    pub(crate) fn keys<T: 'static>(&self) -> Vec<String> {
        self.bucket::<T>()
            .map(|bucket| bucket.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entries of type `T`, zero if none were ever added
    pub(crate) fn len_of<T: 'static>(&self) -> usize {
        self.bucket::<T>()
            .map(|bucket| bucket.entries.len())
            .unwrap_or(0)
    }

    /// Total number of entries across every type
    pub(crate) fn total(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.entries.len()).sum()
    }

    pub(crate) fn type_names(&self) -> Vec<&'static str> {
        self.buckets.values().map(|bucket| bucket.type_name).collect()
    }
}
