use super::{create_persistent_cell, PersistError, PersistentCell};
use crate::store::KeyValueStore;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

type Slot = (usize, String);
type Slots = Arc<Mutex<HashSet<Slot>>>;

/// Opt-in detection of two live cells bound to the same store slot.
///
/// Cells created without a registry share keys last-writer-wins. Cells
/// created through the same registry refuse a key another live cell holds
/// on the same store. Stores are told apart by their `Arc` allocation.
///
/// ```
/// use pantry::{KeyRegistry, MemoryStore, PersistError};
/// use std::sync::Arc;
///
/// let registry = KeyRegistry::new();
/// let store = Arc::new(MemoryStore::new());
///
/// let first = registry.create_persistent_cell("volume", 5, store.clone()).unwrap();
/// let second = registry.create_persistent_cell("volume", 7, store.clone());
/// assert!(matches!(second, Err(PersistError::KeyInUse { .. })));
///
/// drop(first);
/// assert!(registry.create_persistent_cell("volume", 7, store).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    slots: Slots,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` on `store` until the returned guard is dropped.
    pub fn claim(
        &self,
        store: &Arc<dyn KeyValueStore>,
        key: &str,
    ) -> Result<KeyClaim, PersistError> {
        if key.is_empty() {
            return Err(PersistError::EmptyKey);
        }

        let slot = (store_address(store), key.to_string());
        if !self.slots.lock().insert(slot.clone()) {
            return Err(PersistError::KeyInUse {
                key: key.to_string(),
            });
        }

        Ok(KeyClaim {
            slots: Arc::downgrade(&self.slots),
            slot,
        })
    }

    /// Whether a live claim holds `key` on `store`.
    pub fn is_claimed(&self, store: &Arc<dyn KeyValueStore>, key: &str) -> bool {
        self.slots
            .lock()
            .contains(&(store_address(store), key.to_string()))
    }

    /// Number of live claims.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Claim the key, then create the cell holding the claim.
    ///
    /// The claim is released if creating the cell fails.
    pub fn create_persistent_cell<T>(
        &self,
        key: impl Into<String>,
        initial_value: T,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<PersistentCell<T>, PersistError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let key = key.into();
        let claim = self.claim(&store, &key)?;
        let cell = create_persistent_cell(key, initial_value, store)?;
        Ok(cell.with_claim(claim))
    }
}

fn store_address(store: &Arc<dyn KeyValueStore>) -> usize {
    Arc::as_ptr(store) as *const () as usize
}

/// A live claim on a store slot, released on drop.
#[derive(Debug)]
pub struct KeyClaim {
    slots: Weak<Mutex<HashSet<Slot>>>,
    slot: Slot,
}

impl KeyClaim {
    pub fn key(&self) -> &str {
        &self.slot.1
    }

    /// Hold the claim for as long as the registry lives.
    pub(crate) fn keep(mut self) {
        self.slots = Weak::new();
    }
}

impl Drop for KeyClaim {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.lock().remove(&self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ReactiveRuntime;
    use crate::store::MemoryStore;

    #[test]
    fn claims_are_per_store() {
        let registry = KeyRegistry::new();
        let a: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let b: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let _on_a = registry.claim(&a, "k").unwrap();
        let _on_b = registry.claim(&b, "k").unwrap();
        assert!(matches!(
            registry.claim(&a, "k"),
            Err(PersistError::KeyInUse { key }) if key == "k"
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn dropping_claim_releases_key() {
        let registry = KeyRegistry::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let claim = registry.claim(&store, "k").unwrap();
        assert_eq!(claim.key(), "k");
        assert!(registry.is_claimed(&store, "k"));

        drop(claim);
        assert!(!registry.is_claimed(&store, "k"));
        assert!(registry.is_empty());
    }

    #[test]
    fn empty_key_is_rejected() {
        let registry = KeyRegistry::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            registry.claim(&store, ""),
            Err(PersistError::EmptyKey)
        ));
    }

    #[test]
    fn failed_cell_releases_claim() {
        ReactiveRuntime::scope(|| {
            let registry = KeyRegistry::new();
            let store: Arc<dyn KeyValueStore> =
                Arc::new(MemoryStore::with_entries([("k", "{broken")]));

            let result = registry.create_persistent_cell("k", 1, store.clone());
            assert!(matches!(
                result,
                Err(PersistError::MalformedStoredValue { .. })
            ));
            assert!(!registry.is_claimed(&store, "k"));
        });
    }

    #[test]
    fn detached_cell_keeps_claim() {
        ReactiveRuntime::scope(|| {
            let registry = KeyRegistry::new();
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

            let cell = registry
                .create_persistent_cell("k", 1, store.clone())
                .unwrap();
            let _signal = cell.detach();
            assert!(registry.is_claimed(&store, "k"));
        });
    }
}
