use crate::runtime::{FlushError, ReactiveRuntime};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A reactive signal that holds a value and notifies dependents when changed.
///
/// Clones share the same value. A signal belongs to the runtime that was
/// current when it was created.
pub struct Signal<T> {
    value: Arc<RwLock<T>>,
    id: usize,
    runtime: Arc<ReactiveRuntime>,
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(initial: T) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();

        Self {
            value: Arc::new(RwLock::new(initial)),
            id,
            runtime,
        }
    }

    /// Get the current value of the signal.
    pub fn get(&self) -> T {
        self.runtime.track_read(self.id);
        self.value.read().clone()
    }

    /// Get the current value without subscribing the running effect.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value for the signal.
    ///
    /// Dependent effects run before this returns unless a batch is open.
    /// Failures of those effects are returned here.
    pub fn set(&self, new_value: T) -> Result<(), FlushError> {
        *self.value.write() = new_value;
        self.runtime.notify_observers(self.id)
    }

    /// Update the value in place using a function.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), FlushError> {
        {
            let mut value = self.value.write();
            f(&mut *value);
        }
        self.runtime.notify_observers(self.id)
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track_read(self.id);
        let value = self.value.read();
        f(&*value)
    }
}

impl<T> Signal<T> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            id: self.id,
            runtime: Arc::clone(&self.runtime),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.value.read())
            .finish()
    }
}

/// Create a new signal.
///
/// # Example
///
/// ```
/// use pantry::create_signal;
///
/// let count = create_signal(0);
/// count.set(5).unwrap();
/// assert_eq!(count.get(), 5);
/// ```
pub fn create_signal<T>(initial: T) -> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    Signal::new(initial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_update() {
        ReactiveRuntime::scope(|| {
            let signal = create_signal(1);
            signal.set(2).unwrap();
            assert_eq!(signal.get(), 2);

            signal.update(|n| *n *= 10).unwrap();
            assert_eq!(signal.get(), 20);
        });
    }

    #[test]
    fn clones_share_value() {
        ReactiveRuntime::scope(|| {
            let a = create_signal(String::from("a"));
            let b = a.clone();
            b.set("b".to_string()).unwrap();
            assert_eq!(a.get(), "b");
            assert_eq!(a.id(), b.id());
            assert_eq!(a.with(|s| s.len()), 1);
        });
    }
}
