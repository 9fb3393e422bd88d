use crate::store::StoreError;
use thiserror::Error;

/// Errors raised while creating or running a persistent cell.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Keys name the store slot and cannot be empty
    #[error("persistent cell key must not be empty")]
    EmptyKey,

    /// The store holds text under the key that does not decode to the cell type
    #[error("stored value for `{key}` is malformed: {source}")]
    MalformedStoredValue {
        key: String,
        source: serde_json::Error,
    },

    /// Reading the initial value failed
    #[error("failed to read `{key}` from store: {source}")]
    StoreRead { key: String, source: StoreError },

    /// Writing the current value failed
    #[error("failed to write `{key}` to store: {source}")]
    StoreWrite { key: String, source: StoreError },

    /// Removing the slot failed
    #[error("failed to remove `{key}` from store: {source}")]
    StoreRemove { key: String, source: StoreError },

    /// The current value could not be encoded
    #[error("failed to serialize value for `{key}`: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    /// A process-wide store could not be opened
    #[error("backing store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// A registry already holds a live claim on this store and key
    #[error("key `{key}` is already bound to a live cell on this store")]
    KeyInUse { key: String },
}

impl PersistError {
    /// The key involved, if the error concerns a single slot.
    pub fn key(&self) -> Option<&str> {
        match self {
            PersistError::MalformedStoredValue { key, .. }
            | PersistError::StoreRead { key, .. }
            | PersistError::StoreWrite { key, .. }
            | PersistError::StoreRemove { key, .. }
            | PersistError::Serialize { key, .. }
            | PersistError::KeyInUse { key } => Some(key.as_str()),
            PersistError::EmptyKey | PersistError::StoreUnavailable(_) => None,
        }
    }
}
