//! Durable key/value stores for the pending overlay
//!
//! The overlay only needs string keys and structured values that survive a
//! process restart. Backends:
//! - [`MemoryStore`]: tests and ephemeral sessions
//! - [`FileStore`]: one JSON file, the same shape a Tauri store file has
//! - [`SqliteStore`]: local SQLite (requires the `native` feature)

mod file;
mod memory;
#[cfg(feature = "native")]
mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "native")]
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;

/// Scoped durable key/value store.
///
/// No TTL or size bound is enforced here. A `get` that fails should return
/// `Err`; callers decide whether that is fatal.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never written.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
