//! Persistent variable store.
//!
//! The engine only talks to the [`Store`] trait.  Two implementations ship
//! with the crate:
//!
//! - [`MemoryStore`]: process-local map, for tests and dry runs.
//! - [`JsonFileStore`]: one JSON document on disk, rewritten atomically on
//!   every change.
//!
//! Neither offers cross-key transactions, and two concurrent read-modify-write
//! cycles on the same key can lose an update.  Callers that need ordering
//! serialize their `parse` calls per command.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::value::Value;

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Default path prefix for variables (`variables/<name>`).
pub const DEFAULT_PREFIX: &str = "variables";

/// Path-addressed key/value persistence.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;
    /// Write `value`.  Sets are persisted as deduplicated sequences.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;
    /// Delete `path`.  Removing a missing path is not an error.
    async fn remove(&self, path: &str) -> Result<(), StoreError>;
}

/// `<prefix>/<name>`
pub fn variable_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

pub(crate) fn check_path(path: &str) -> Result<(), StoreError> {
    if path.is_empty() || path.contains('\0') {
        return Err(StoreError::InvalidPath(path.to_owned()));
    }
    Ok(())
}
