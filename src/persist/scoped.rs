use super::{create_persistent_cell, PersistError, PersistentCell};
use crate::store;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A persistent cell in the process-wide durable store.
///
/// Entries outlive the session: `localStorage` in the browser, a JSON file
/// on native targets.
pub fn persistent_durable<T>(
    key: impl Into<String>,
    initial_value: T,
) -> Result<PersistentCell<T>, PersistError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let store = store::durable().map_err(PersistError::StoreUnavailable)?;
    create_persistent_cell(key, initial_value, store)
}

/// A persistent cell in the process-wide session store.
///
/// Entries last for the session: `sessionStorage` in the browser, the
/// process lifetime on native targets.
pub fn persistent_session<T>(
    key: impl Into<String>,
    initial_value: T,
) -> Result<PersistentCell<T>, PersistError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let store = store::session().map_err(PersistError::StoreUnavailable)?;
    create_persistent_cell(key, initial_value, store)
}
