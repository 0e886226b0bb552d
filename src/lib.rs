//! # sovran-threadcache
//!
//! A thread-scoped, type-keyed object cache.
//!
//! `sovran-threadcache` lets unrelated parts of a program stash per-request or
//! per-task resources (connections, contexts, scratch buffers) for the current
//! thread and pick them up again later, without threading them through every
//! call in between.
//!
//! ## Key Features
//!
//! - **Isolated**: every thread gets its own namespace; no thread can see another's entries
//! - **Type-keyed**: values are partitioned by type, then by a string key
//! - **Optimistic reads**: lookups never block unless a write is in flight
//! - **Self-cleaning**: a thread's namespace is reclaimed once its tag is released
//!
//! ## Usage Examples
//!
//! ### Per-request context
//!
//! ```rust
//! use sovran_threadcache::{self as cache, CacheError};
//!
//! #[derive(Clone)]
//! struct User {
//!     name: String,
//! }
//!
//! fn handle_request(name: &str) -> Result<String, CacheError> {
//!     cache::initialise();
//!     cache::add("current", User { name: name.to_string() })?;
//!
//!     let greeting = render_greeting()?;
//!
//!     cache::close();
//!     Ok(greeting)
//! }
//!
//! // Deep in the call stack, without a `User` parameter
//! fn render_greeting() -> Result<String, CacheError> {
//!     let user: User = cache::get("current")?;
//!     Ok(format!("Hello, {}!", user.name))
//! }
//!
//! assert_eq!(handle_request("alice").unwrap(), "Hello, alice!");
//! ```
//!
//! ### Error Handling
//!
//! ```rust
//! use sovran_threadcache::{CacheError, ThreadCache};
//!
//! let cache = ThreadCache::new();
//!
//! // Nothing works until the thread is initialised
//! assert_eq!(cache.get::<u32>("n"), Err(CacheError::Uninitialised));
//!
//! cache.initialise();
//! match cache.get::<u32>("n") {
//!     Ok(n) => println!("n = {}", n),
//!     Err(CacheError::MissingType(name)) => println!("no {} stored yet", name),
//!     Err(CacheError::MissingKey(key)) => println!("nothing under {}", key),
//!     Err(e) => println!("Other error: {}", e),
//! }
//!
//! cache.add("n", 1u32).unwrap();
//! // Removing an absent key is not an error
//! assert_eq!(cache.remove::<u32>("m"), Ok(None));
//! cache.close();
//! ```

mod any_value;
mod cache;
mod error;
mod stamped;
mod store;
mod table;
mod tag;

pub use cache::ThreadCache;
pub use error::{CacheError, Result};
pub use tag::Tag;

use std::any::Any;

/// Mints a fresh tag for the calling thread in the global cache
pub fn initialise() {
    ThreadCache::global().initialise()
}

/// Releases the calling thread's tag in the global cache
pub fn close() {
    ThreadCache::global().close()
}

pub fn is_initialised() -> bool {
    ThreadCache::global().is_initialised()
}

/// See [`ThreadCache::add`]
pub fn add<T>(key: impl Into<String>, value: T) -> Result<Option<T>>
where
    T: Any + Send + Sync,
{
    ThreadCache::global().add(key, value)
}

/// See [`ThreadCache::get`]
pub fn get<T>(key: &str) -> Result<T>
where
    T: Any + Send + Sync + Clone,
{
    ThreadCache::global().get(key)
}

/// See [`ThreadCache::with`]
pub fn with<T, F, R>(key: &str, f: F) -> Result<R>
where
    T: Any + Send + Sync,
    F: FnOnce(&T) -> R,
{
    ThreadCache::global().with(key, f)
}

/// See [`ThreadCache::remove`]
pub fn remove<T>(key: &str) -> Result<Option<T>>
where
    T: Any + Send + Sync,
{
    ThreadCache::global().remove(key)
}

/// See [`ThreadCache::length`]
pub fn length<T>() -> Result<usize>
where
    T: Any + Send + Sync,
{
    ThreadCache::global().length::<T>()
}

/// Returns true if no thread has a live namespace in the global cache
pub fn is_empty() -> bool {
    ThreadCache::global().is_empty()
}
