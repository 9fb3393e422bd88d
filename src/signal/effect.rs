use crate::runtime::{EffectError, EffectFn, ReactiveRuntime, RuntimeInner};
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Weak};

/// A side effect that runs when its dependencies change.
///
/// Effects track the signals they read and re-run when those signals
/// change. The effect runs immediately on creation to establish its
/// initial dependencies. Dropping the handle unregisters the effect.
///
/// # Examples
///
/// ```
/// use pantry::{Effect, Signal};
/// use std::sync::{Arc, atomic::{AtomicI32, Ordering}};
///
/// let signal = Signal::new(5);
/// let last_value = Arc::new(AtomicI32::new(0));
///
/// let _effect = Effect::new({
///     let signal = signal.clone();
///     let last_value = last_value.clone();
///     move || last_value.store(signal.get(), Ordering::SeqCst)
/// });
///
/// assert_eq!(last_value.load(Ordering::SeqCst), 5);
///
/// signal.set(10).unwrap();
/// assert_eq!(last_value.load(Ordering::SeqCst), 10);
/// ```
pub struct Effect {
    id: usize,
    run: EffectFn,
    runtime: Weak<RuntimeInner>,
}

impl Effect {
    /// Create a new effect that cannot fail.
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        match Self::try_new(move || {
            effect();
            Ok::<(), Infallible>(())
        }) {
            Ok(effect) => effect,
            Err(never) => match never {},
        }
    }

    /// Create a new effect that may fail.
    ///
    /// The first run happens before this returns. If it fails, the effect
    /// is unregistered again and the error is returned. Failures of later
    /// runs come out of the flush that ran them, see
    /// [`FlushError`](crate::FlushError).
    pub fn try_new<F, E>(effect: F) -> Result<Self, E>
    where
        F: Fn() -> Result<(), E> + Send + Sync + 'static,
        E: Error + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        let effect = Arc::new(effect);

        let run: EffectFn = {
            let effect = Arc::clone(&effect);
            Arc::new(move || effect().map_err(EffectError::from))
        };
        runtime.register_observer(id, Arc::clone(&run));

        // Run immediately within the observer context to track dependencies
        if let Err(error) = runtime.with_observer(id, || effect()) {
            runtime.inner().remove_observer(id);
            return Err(error);
        }

        Ok(Self {
            id,
            run,
            runtime: Arc::downgrade(&runtime.inner()),
        })
    }

    /// Run the effect by hand, outside any flush.
    pub fn run(&self) -> Result<(), EffectError> {
        (self.run)()
    }

    /// The observer ID of this effect.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Unregister the effect now.
    pub fn dispose(self) {
        drop(self);
    }

    /// Give up the handle but keep the effect registered.
    ///
    /// The effect then lives as long as its runtime.
    pub fn detach(mut self) {
        self.runtime = Weak::new();
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("id", &self.id).finish()
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
    }
}

/// Create a new effect that runs when dependencies change.
///
/// The effect runs immediately and then again whenever any signal
/// it reads changes.
///
/// # Example
///
/// ```
/// use pantry::{create_effect, create_signal};
///
/// let count = create_signal(0);
///
/// let _effect = create_effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
/// ```
pub fn create_effect<F>(effect: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(effect)
}
