//! # Pantry
//!
//! Reactive signals that keep themselves in key-value storage.
//!
//! A [`PersistentCell`] is a [`Signal`] bound to a named slot in a
//! [`KeyValueStore`]. On creation it restores its value from the slot, or
//! starts from a default when the slot is empty; after that every change
//! is written back as JSON.
//!
//! ## Signals (reactive primitives)
//!
//! - `Signal<T>` - Reactive values that notify dependents when changed
//! - `Effect` - Side effects that run when dependencies change
//! - `batch` - Coalesce several writes into one flush
//!
//! ## Persistence
//!
//! - `create_persistent_cell` - Persist into any store
//! - `persistent_durable` / `persistent_session` - Persist into the
//!   process-wide durable or session store
//! - `KeyRegistry` - Opt-in detection of two cells sharing a slot
//!
//! ```
//! use pantry::{create_persistent_cell, KeyValueStore, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.write("count", "41").unwrap();
//!
//! let count = create_persistent_cell("count", 0, store.clone()).unwrap();
//! assert_eq!(count.get(), 41);
//!
//! count.update(|n| *n += 1).unwrap();
//! assert_eq!(store.read("count").unwrap().as_deref(), Some("42"));
//! ```

#[cfg(not(target_arch = "wasm32"))]
pub mod config;
pub mod persist;
pub mod runtime;
pub mod signal;
pub mod store;

// Re-export main types for convenience
pub use persist::{
    create_persistent_cell, persistent_durable, persistent_session, KeyRegistry, PersistError,
    PersistentCell,
};
pub use runtime::{batch, FlushError};
pub use signal::{create_effect, create_signal, Effect, Signal};
pub use store::{KeyValueStore, MemoryStore, StoreError};
