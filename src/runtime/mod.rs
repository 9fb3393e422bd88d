//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking,
//! the pending-effect queue and the flush cycle that drives effects.

mod context;
mod error;

pub(crate) use context::{EffectFn, RuntimeInner};
pub use context::ReactiveRuntime;
pub use error::{EffectError, FlushError, RunawayFlush};

/// Run `f` with flushing deferred on the current runtime.
///
/// Every signal written inside the closure queues its dependents, and the
/// queue is flushed once when the outermost batch returns. An effect that
/// depends on several of the written signals, or on one signal written
/// several times, runs once with the final values.
///
/// # Examples
///
/// ```
/// use pantry::{batch, create_effect, create_signal};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// let count = create_signal(0);
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let _effect = create_effect({
///     let count = count.clone();
///     let runs = runs.clone();
///     move || {
///         let _ = count.get();
///         runs.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// batch(|| {
///     count.set(1).unwrap();
///     count.set(2).unwrap();
///     count.set(3).unwrap();
/// })
/// .unwrap();
///
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// assert_eq!(count.get(), 3);
/// ```
pub fn batch<F, R>(f: F) -> Result<R, FlushError>
where
    F: FnOnce() -> R,
{
    ReactiveRuntime::current().batch(f)
}
