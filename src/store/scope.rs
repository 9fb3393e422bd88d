use super::{KeyValueStore, StoreError};
use std::sync::{Arc, OnceLock};

static DURABLE: OnceLock<Arc<dyn KeyValueStore>> = OnceLock::new();
static SESSION: OnceLock<Arc<dyn KeyValueStore>> = OnceLock::new();

/// The process-wide store whose entries outlive the session.
///
/// Opened on first use: `localStorage` on wasm32, a
/// [`FileStore`](super::FileStore) at the configured path elsewhere (see
/// [`config`](crate::config)).
pub fn durable() -> Result<Arc<dyn KeyValueStore>, StoreError> {
    get_or_open(&DURABLE, open_durable)
}

/// The process-wide store whose entries last for the current session.
///
/// Opened on first use: `sessionStorage` on wasm32, a
/// [`MemoryStore`](super::MemoryStore) that lives as long as the process
/// elsewhere.
pub fn session() -> Result<Arc<dyn KeyValueStore>, StoreError> {
    get_or_open(&SESSION, open_session)
}

/// Use `store` as the durable store. Must run before the first [`durable`] call.
pub fn install_durable(store: Arc<dyn KeyValueStore>) -> Result<(), StoreError> {
    DURABLE
        .set(store)
        .map_err(|_| StoreError::AlreadyInstalled("durable store"))
}

/// Use `store` as the session store. Must run before the first [`session`] call.
pub fn install_session(store: Arc<dyn KeyValueStore>) -> Result<(), StoreError> {
    SESSION
        .set(store)
        .map_err(|_| StoreError::AlreadyInstalled("session store"))
}

fn get_or_open(
    slot: &OnceLock<Arc<dyn KeyValueStore>>,
    open: fn() -> Result<Arc<dyn KeyValueStore>, StoreError>,
) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    if let Some(store) = slot.get() {
        return Ok(Arc::clone(store));
    }
    let opened = open()?;
    // Another thread may have won the race; its store is the one kept.
    Ok(Arc::clone(slot.get_or_init(|| opened)))
}

#[cfg(not(target_arch = "wasm32"))]
fn open_durable() -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let config = crate::config::current();
    Ok(Arc::new(super::FileStore::open(&config.durable_path)?))
}

#[cfg(not(target_arch = "wasm32"))]
fn open_session() -> Result<Arc<dyn KeyValueStore>, StoreError> {
    log::debug!("Using in-memory session store");
    Ok(Arc::new(super::MemoryStore::new()))
}

#[cfg(target_arch = "wasm32")]
fn open_durable() -> Result<Arc<dyn KeyValueStore>, StoreError> {
    Ok(Arc::new(super::WebStorage::local()?))
}

#[cfg(target_arch = "wasm32")]
fn open_session() -> Result<Arc<dyn KeyValueStore>, StoreError> {
    Ok(Arc::new(super::WebStorage::session()?))
}
