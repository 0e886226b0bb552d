use thiserror::Error;

/// Errors that can occur when using ThreadCache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The calling thread has no active tag; call `initialise` first
    #[error("thread cache not initialised for this thread")]
    Uninitialised,
    /// Nothing of the requested type was ever added under the calling thread's tag
    #[error("no entries of type [{0}] for this thread")]
    MissingType(&'static str),
    /// Entries of the requested type exist, but not under this key
    #[error("no value stored for key: {0}")]
    MissingKey(String),
    /// A stored value did not match the type of the bucket holding it
    #[error("type mismatch for the requested key")]
    TypeMismatch,
}

/// Shorthand for results returned by the cache
pub type Result<T> = std::result::Result<T, CacheError>;
