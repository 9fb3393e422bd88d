use super::{codec, KeyClaim, PersistError};
use crate::signal::{Effect, Signal};
use crate::store::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A signal bound to a slot in a key-value store.
///
/// The cell starts from the value stored under its key, or from the
/// default when the slot is empty, and writes its value back on creation
/// and after every change. Reads and writes go through the wrapped
/// [`Signal`], which the cell dereferences to.
///
/// Dropping the cell stops persistence. Use [`PersistentCell::detach`] to
/// keep persisting for the lifetime of the runtime without a handle.
///
/// ```
/// use pantry::{create_persistent_cell, KeyValueStore, MemoryStore};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let theme = create_persistent_cell("theme", "light".to_string(), store.clone()).unwrap();
/// assert_eq!(store.read("theme").unwrap().as_deref(), Some("\"light\""));
///
/// theme.set("dark".to_string()).unwrap();
/// assert_eq!(store.read("theme").unwrap().as_deref(), Some("\"dark\""));
/// ```
pub struct PersistentCell<T> {
    key: String,
    signal: Signal<T>,
    store: Arc<dyn KeyValueStore>,
    effect: Effect,
    claim: Option<KeyClaim>,
}

impl<T> PersistentCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Same as [`create_persistent_cell`].
    pub fn new(
        key: impl Into<String>,
        initial_value: T,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, PersistError> {
        create_persistent_cell(key, initial_value, store)
    }

    /// The store slot this cell writes to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The store this cell writes to.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// A handle to the underlying signal.
    pub fn signal(&self) -> Signal<T> {
        self.signal.clone()
    }

    /// Stop persisting and hand back the signal.
    ///
    /// The store keeps whatever was written last.
    pub fn dispose(self) -> Signal<T> {
        let PersistentCell {
            key,
            signal,
            effect,
            claim,
            ..
        } = self;
        effect.dispose();
        drop(claim);
        log::debug!("Stopped persisting `{key}`");
        signal
    }

    /// Keep persisting for the lifetime of the runtime and hand back the signal.
    ///
    /// A registry claim held by the cell is kept as well.
    pub fn detach(self) -> Signal<T> {
        let PersistentCell {
            signal,
            effect,
            claim,
            ..
        } = self;
        effect.detach();
        if let Some(claim) = claim {
            claim.keep();
        }
        signal
    }

    /// Stop persisting and remove the slot from the store.
    pub fn purge(self) -> Result<Signal<T>, PersistError> {
        let key = self.key.clone();
        let store = Arc::clone(&self.store);
        let signal = self.dispose();
        store
            .remove(&key)
            .map_err(|source| PersistError::StoreRemove { key, source })?;
        Ok(signal)
    }

    pub(crate) fn with_claim(mut self, claim: KeyClaim) -> Self {
        self.claim = Some(claim);
        self
    }
}

impl<T> Deref for PersistentCell<T> {
    type Target = Signal<T>;

    fn deref(&self) -> &Signal<T> {
        &self.signal
    }
}

impl<T> fmt::Debug for PersistentCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCell")
            .field("key", &self.key)
            .field("signal", &self.signal.id())
            .field("effect", &self.effect.id())
            .finish()
    }
}

/// Create a signal persisted under `key` in `store`.
///
/// 1. Read `key`. Stored text is decoded into `T`; text that does not
///    decode fails with [`PersistError::MalformedStoredValue`] and nothing
///    is written. An absent or empty entry means `initial_value` is used
///    as is.
/// 2. Create the signal with that value.
/// 3. Register an effect writing the encoded value under `key`. It runs
///    once right away, so the store holds the starting value when this
///    returns, and again in every flush that follows a change.
///
/// Later write failures come out of the flush that ran the effect, as a
/// [`FlushError`](crate::FlushError) holding [`PersistError::StoreWrite`].
///
/// Keys are not checked for uniqueness; two cells on one key overwrite
/// each other. See [`KeyRegistry`](super::KeyRegistry) for opt-in checks.
pub fn create_persistent_cell<T>(
    key: impl Into<String>,
    initial_value: T,
    store: Arc<dyn KeyValueStore>,
) -> Result<PersistentCell<T>, PersistError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let key = key.into();
    if key.is_empty() {
        return Err(PersistError::EmptyKey);
    }

    let start = restore(store.as_ref(), &key, initial_value)?;
    let signal = Signal::new(start);

    let effect = Effect::try_new({
        let signal = signal.clone();
        let store = Arc::clone(&store);
        let key = key.clone();
        move || signal.with(|value| write_through(store.as_ref(), &key, value))
    })?;

    Ok(PersistentCell {
        key,
        signal,
        store,
        effect,
        claim: None,
    })
}

fn restore<T>(store: &dyn KeyValueStore, key: &str, initial_value: T) -> Result<T, PersistError>
where
    T: DeserializeOwned,
{
    let stored = store.read(key).map_err(|source| PersistError::StoreRead {
        key: key.to_string(),
        source,
    })?;

    match stored {
        Some(text) if !text.is_empty() => {
            let value =
                codec::from_text(&text).map_err(|source| PersistError::MalformedStoredValue {
                    key: key.to_string(),
                    source,
                })?;
            log::debug!("Restored `{key}` from store");
            Ok(value)
        }
        _ => {
            log::debug!("No stored value for `{key}`, using default");
            Ok(initial_value)
        }
    }
}

fn write_through<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), PersistError>
where
    T: Serialize,
{
    let text = codec::to_text(value).map_err(|source| PersistError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store
        .write(key, &text)
        .map_err(|source| PersistError::StoreWrite {
            key: key.to_string(),
            source,
        })?;
    log::trace!("Persisted `{key}` ({} bytes)", text.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{batch, ReactiveRuntime};
    use crate::store::{MemoryStore, StoreError};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every write and can be told to fail.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        writes: Mutex<Vec<(String, String)>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl RecordingStore {
        fn writes(&self) -> Vec<(String, String)> {
            self.writes.lock().clone()
        }
    }

    impl KeyValueStore for RecordingStore {
        fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("storage locked".to_string()));
            }
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("quota exceeded".to_string()));
            }
            self.writes
                .lock()
                .push((key.to_string(), value.to_string()));
            self.inner.write(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StoreError> {
            self.inner.remove(key)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        volume: u8,
        muted: bool,
    }

    #[test]
    fn fresh_key_uses_default_and_writes_it() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            let prefs = Prefs {
                volume: 3,
                muted: false,
            };

            let cell = create_persistent_cell("prefs", prefs.clone(), store.clone()).unwrap();

            assert_eq!(cell.get(), prefs);
            assert_eq!(
                store.writes(),
                vec![(
                    "prefs".to_string(),
                    r#"{"volume":3,"muted":false}"#.to_string()
                )]
            );
        });
    }

    #[test]
    fn stored_value_wins_over_default() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::with_entries([(
                "prefs",
                r#"{"volume":9,"muted":true}"#,
            )]));

            let cell = create_persistent_cell(
                "prefs",
                Prefs {
                    volume: 0,
                    muted: false,
                },
                store,
            )
            .unwrap();

            assert_eq!(
                cell.get(),
                Prefs {
                    volume: 9,
                    muted: true
                }
            );
        });
    }

    #[test]
    fn empty_stored_text_counts_as_absent() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::with_entries([("n", "")]));
            let cell = create_persistent_cell("n", 4, store.clone()).unwrap();
            assert_eq!(cell.get(), 4);
            assert_eq!(store.read("n").unwrap().as_deref(), Some("4"));
        });
    }

    #[test]
    fn malformed_entry_fails_without_writing() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            store.inner.write("n", "[1, 2").unwrap();

            let err = create_persistent_cell("n", 0u32, store.clone()).unwrap_err();

            assert!(matches!(err, PersistError::MalformedStoredValue { ref key, .. } if key == "n"));
            assert!(store.writes().is_empty());
            assert_eq!(store.read("n").unwrap().as_deref(), Some("[1, 2"));
            assert_eq!(ReactiveRuntime::current().observer_count(), 0);
        });
    }

    #[test]
    fn empty_key_is_rejected() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::new());
            let err = create_persistent_cell("", 1, store.clone()).unwrap_err();
            assert!(matches!(err, PersistError::EmptyKey));
            assert!(store.is_empty());
        });
    }

    #[test]
    fn every_change_is_written_in_order() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            let cell = create_persistent_cell("n", 0, store.clone()).unwrap();

            cell.set(1).unwrap();
            cell.update(|n| *n += 10).unwrap();

            let values: Vec<String> = store.writes().into_iter().map(|(_, v)| v).collect();
            assert_eq!(values, vec!["0", "1", "11"]);
        });
    }

    #[test]
    fn batched_changes_write_once() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            let cell = create_persistent_cell("n", 0, store.clone()).unwrap();

            batch(|| {
                for n in 1..=5 {
                    cell.set(n).unwrap();
                }
            })
            .unwrap();

            let values: Vec<String> = store.writes().into_iter().map(|(_, v)| v).collect();
            assert_eq!(values, vec!["0", "5"]);
        });
    }

    #[test]
    fn failed_write_surfaces_from_set() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            let cell = create_persistent_cell("n", 0, store.clone()).unwrap();

            store.fail_writes.store(true, Ordering::SeqCst);
            let err = cell.set(1).unwrap_err();
            let failure = err.find::<PersistError>().unwrap();
            assert!(matches!(
                failure,
                PersistError::StoreWrite {
                    source: StoreError::Backend(_),
                    ..
                }
            ));
            assert_eq!(failure.key(), Some("n"));

            // The cell keeps its value and persists again once writes work.
            assert_eq!(cell.get(), 1);
            store.fail_writes.store(false, Ordering::SeqCst);
            cell.set(2).unwrap();
            assert_eq!(store.read("n").unwrap().as_deref(), Some("2"));
        });
    }

    #[test]
    fn failed_first_write_fails_construction() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            store.fail_writes.store(true, Ordering::SeqCst);

            let err = create_persistent_cell("n", 0, store).unwrap_err();
            assert!(matches!(err, PersistError::StoreWrite { .. }));
        });
    }

    #[test]
    fn failed_read_fails_construction_without_writing() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            store.fail_reads.store(true, Ordering::SeqCst);

            let err = create_persistent_cell("n", 0, store.clone()).unwrap_err();

            assert!(matches!(
                err,
                PersistError::StoreRead {
                    ref key,
                    source: StoreError::Backend(_),
                } if key == "n"
            ));
            assert!(store.writes().is_empty());
            assert_eq!(ReactiveRuntime::current().observer_count(), 0);
        });
    }

    #[test]
    fn unencodable_value_fails_construction() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            // JSON object keys must be strings
            let grid: HashMap<(u8, u8), u8> = HashMap::from([((0, 1), 5)]);

            let err = create_persistent_cell("grid", grid, store.clone()).unwrap_err();

            assert!(matches!(err, PersistError::Serialize { ref key, .. } if key == "grid"));
            assert_eq!(err.key(), Some("grid"));
            assert!(store.writes().is_empty());
            assert_eq!(store.read("grid").unwrap(), None);
        });
    }

    #[test]
    fn clearing_the_runtime_does_not_cross_wire_cells() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::new());
            let a = create_persistent_cell("a", 0, store.clone()).unwrap();

            ReactiveRuntime::current().clear();
            let b = create_persistent_cell("b", 0, store.clone()).unwrap();
            assert_ne!(a.id(), b.id());

            // `a` lost its effect in the clear and must not drive `b`'s
            a.set(7).unwrap();
            assert_eq!(store.read("a").unwrap().as_deref(), Some("0"));
            assert_eq!(store.read("b").unwrap().as_deref(), Some("0"));

            drop(a);
            b.set(5).unwrap();
            assert_eq!(store.read("b").unwrap().as_deref(), Some("5"));
        });
    }

    #[test]
    fn debug_shows_key() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::new());
            let cell = create_persistent_cell("volume", 3u8, store).unwrap();
            let text = format!("{cell:?}");
            assert!(text.starts_with("PersistentCell"));
            assert!(text.contains("\"volume\""));
        });
    }

    #[test]
    fn dispose_stops_writes() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            let cell = create_persistent_cell("n", 0, store.clone()).unwrap();
            cell.set(1).unwrap();

            let signal = cell.dispose();
            signal.set(2).unwrap();

            assert_eq!(signal.get(), 2);
            assert_eq!(store.read("n").unwrap().as_deref(), Some("1"));
            assert_eq!(store.writes().len(), 2);
        });
    }

    #[test]
    fn detach_keeps_writing() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::new());
            let signal = create_persistent_cell("n", 0, store.clone())
                .unwrap()
                .detach();

            signal.set(8).unwrap();
            assert_eq!(store.read("n").unwrap().as_deref(), Some("8"));
        });
    }

    #[test]
    fn purge_removes_slot() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(MemoryStore::new());
            let cell = create_persistent_cell("n", 3, store.clone()).unwrap();
            assert_eq!(cell.key(), "n");

            let signal = cell.purge().unwrap();
            assert_eq!(store.read("n").unwrap(), None);

            signal.set(4).unwrap();
            assert_eq!(store.read("n").unwrap(), None);
        });
    }

    #[test]
    fn unrelated_signals_do_not_trigger_writes() {
        ReactiveRuntime::scope(|| {
            let store = Arc::new(RecordingStore::default());
            let _cell = create_persistent_cell("n", 0, store.clone()).unwrap();
            let other = Signal::new(0);

            other.set(1).unwrap();
            assert_eq!(store.writes().len(), 1);
        });
    }
}
