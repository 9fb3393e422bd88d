//! Key-value stores that persistent cells write through to.
//!
//! [`KeyValueStore`] is the capability the cells consume. The concrete
//! stores cover the usual homes for that data:
//! - [`MemoryStore`] - lives as long as the process
//! - [`FileStore`] - a JSON file on disk (native targets)
//! - [`WebStorage`] - `localStorage` / `sessionStorage` (wasm32)
//!
//! [`durable()`] and [`session()`] hand out the process-wide stores used by
//! the scoped constructors.

mod memory;
mod scope;

#[cfg(not(target_arch = "wasm32"))]
mod file;
#[cfg(target_arch = "wasm32")]
mod web;

pub use memory::MemoryStore;
pub use scope::{durable, install_durable, install_session, session};

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;
#[cfg(target_arch = "wasm32")]
pub use web::{WebScope, WebStorage};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by key-value stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend rejected the operation (quota exceeded, security error)
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The backend does not exist in this environment
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A process-wide store or its configuration was set twice
    #[error("{0} is already initialized")]
    AlreadyInstalled(&'static str),

    /// The backing file does not hold a JSON object of strings
    #[error("store file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The store contents could not be encoded
    #[error("failed to encode store contents: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A string-keyed store of string values living outside the reactive graph.
///
/// Implementations are shared as `Arc<dyn KeyValueStore>` and must accept
/// repeated synchronous calls from one logical thread. They may fail and
/// they may be changed behind the cell's back; persistent cells neither
/// retry nor re-read after construction.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` if there is none.
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the value under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}
