use super::{EffectError, FlushError, RunawayFlush};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) type EffectFn = Arc<dyn Fn() -> Result<(), EffectError> + Send + Sync>;

/// Upper bound on effect runs within one flush.
const MAX_FLUSH_RUNS: usize = 100_000;

/// Reactive context for tracking dependencies.
struct ReactiveContext {
    current_observer: Option<usize>,
    // Map from signal ID to the observers that read it, in creation order
    dependencies: HashMap<usize, BTreeSet<usize>>,
    // Map from observer ID to the signals it read on its last run
    observer_deps: HashMap<usize, BTreeSet<usize>>,
    // Map from observer ID to the effect function
    observers: HashMap<usize, EffectFn>,
    // Observers waiting for the next flush, without duplicates
    pending: VecDeque<usize>,
    batch_depth: usize,
    flushing: bool,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            current_observer: None,
            dependencies: HashMap::new(),
            observer_deps: HashMap::new(),
            observers: HashMap::new(),
            pending: VecDeque::new(),
            batch_depth: 0,
            flushing: false,
        }
    }

    fn clear(&mut self) {
        self.current_observer = None;
        self.dependencies.clear();
        self.observer_deps.clear();
        self.observers.clear();
        self.pending.clear();
    }

    /// Forget which signals an observer read.
    fn untrack(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for signal_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&signal_id) {
                    deps.remove(&observer_id);
                    if deps.is_empty() {
                        self.dependencies.remove(&signal_id);
                    }
                }
            }
        }
    }

    fn schedule(&mut self, observer_id: usize) {
        if self.observers.contains_key(&observer_id) && !self.pending.contains(&observer_id) {
            self.pending.push_back(observer_id);
        }
    }
}

/// Inner runtime state that can be shared.
pub struct RuntimeInner {
    context: Mutex<ReactiveContext>,
}

impl RuntimeInner {
    fn new() -> Self {
        Self {
            context: Mutex::new(ReactiveContext::new()),
        }
    }

    pub(crate) fn remove_observer(&self, observer_id: usize) {
        let mut ctx = self.context.lock();
        ctx.observers.remove(&observer_id);
        ctx.untrack(observer_id);
        ctx.pending.retain(|id| *id != observer_id);
    }
}

/// Resets the flushing flag even if an effect panics.
struct FlushGuard<'a>(&'a Mutex<ReactiveContext>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().flushing = false;
    }
}

/// Leaves a batch even if the batched closure panics.
struct BatchGuard<'a>(&'a Mutex<ReactiveContext>);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let mut ctx = self.0.lock();
        ctx.batch_depth = ctx.batch_depth.saturating_sub(1);
    }
}

/// Puts back the previous observer even if the observed closure panics.
struct ObserverGuard<'a> {
    context: &'a Mutex<ReactiveContext>,
    prev: Option<usize>,
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        self.context.lock().current_observer = self.prev.take();
    }
}

/// Reactive runtime managing the dependency graph and the flush cycle.
///
/// Every thread has a default runtime; scoped runtimes can be pushed on
/// top of it for isolation. Signals remember the runtime that was current
/// when they were created, effects register with the runtime that is
/// current when they are created.
///
/// Writing a signal queues the effects that read it. Outside a batch the
/// queue is flushed right away, inside [`ReactiveRuntime::batch`] it is
/// flushed once when the outermost batch ends.
///
/// # Examples
///
/// Using the default runtime:
///
/// ```
/// use pantry::Signal;
///
/// let signal = Signal::new(42);
/// assert_eq!(signal.get(), 42);
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use pantry::runtime::ReactiveRuntime;
/// use pantry::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    inner: Arc<RuntimeInner>,
}

thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
    static THREAD_RUNTIME: Arc<ReactiveRuntime> = ReactiveRuntime::new();
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            inner: Arc::new(RuntimeInner::new()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// The runtime and all its state is cleaned up when the function
    /// returns, unless signals created inside escape it or effects were
    /// detached.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// The default runtime of the calling thread.
    pub fn thread_default() -> Arc<Self> {
        THREAD_RUNTIME.with(Arc::clone)
    }

    /// Get the current reactive runtime.
    ///
    /// Returns the runtime from the top of the thread-local stack, or the
    /// thread's default runtime if no scoped runtime is active.
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::thread_default)
        })
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// ```
    /// use pantry::runtime::ReactiveRuntime;
    /// use pantry::Signal;
    ///
    /// let runtime = ReactiveRuntime::new();
    /// ReactiveRuntime::with_runtime(runtime, || {
    ///     let signal = Signal::new(42);
    ///     assert_eq!(signal.get(), 42);
    /// });
    /// ```
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Clear all observers, dependencies and queued effects.
    ///
    /// Useful for resetting between tests. Ids keep counting up, so signals
    /// and effects created before the clear never collide with later ones;
    /// the old effects just stop running.
    pub fn clear(&self) {
        self.inner.context.lock().clear();
    }

    pub(crate) fn inner(&self) -> Arc<RuntimeInner> {
        Arc::clone(&self.inner)
    }

    /// Generate the next unique ID for a reactive primitive.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Track a read of a signal by the current observer.
    pub fn track_read(&self, signal_id: usize) {
        let mut ctx = self.inner.context.lock();
        if let Some(current_observer) = ctx.current_observer {
            ctx.dependencies
                .entry(signal_id)
                .or_default()
                .insert(current_observer);
            ctx.observer_deps
                .entry(current_observer)
                .or_default()
                .insert(signal_id);
        }
    }

    /// Run `f` without recording any signal reads.
    pub fn untracked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self.inner.context.lock().current_observer.take();
        let _guard = ObserverGuard {
            context: &self.inner.context,
            prev,
        };
        f()
    }

    /// Queue every observer that depends on a signal.
    ///
    /// Flushes immediately unless a batch or a flush is already in
    /// progress, in which case the queued observers run as part of it.
    pub fn notify_observers(&self, signal_id: usize) -> Result<(), FlushError> {
        let flush_now = {
            let mut ctx = self.inner.context.lock();
            let observers: Vec<usize> = ctx
                .dependencies
                .get(&signal_id)
                .map(|obs| obs.iter().copied().collect())
                .unwrap_or_default();
            for observer_id in observers {
                ctx.schedule(observer_id);
            }
            ctx.batch_depth == 0 && !ctx.flushing && !ctx.pending.is_empty()
        };

        if flush_now {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Run every queued observer.
    ///
    /// Observers queued while the flush runs are picked up by the same
    /// flush. A failing observer does not stop the others; all failures
    /// are returned together.
    pub fn flush(&self) -> Result<(), FlushError> {
        {
            let mut ctx = self.inner.context.lock();
            if ctx.flushing {
                return Ok(());
            }
            ctx.flushing = true;
        }
        let _guard = FlushGuard(&self.inner.context);

        let mut failures: Vec<EffectError> = Vec::new();
        let mut runs = 0usize;
        loop {
            let (observer_id, effect) = {
                let mut ctx = self.inner.context.lock();
                let Some(observer_id) = ctx.pending.pop_front() else {
                    break;
                };
                if runs == MAX_FLUSH_RUNS {
                    ctx.pending.clear();
                    failures.push(Box::new(RunawayFlush(runs)));
                    break;
                }
                let effect = ctx.observers.get(&observer_id).cloned();
                match effect {
                    Some(effect) => (observer_id, effect),
                    None => continue,
                }
            };

            runs += 1;
            if let Err(error) = self.run_observer(observer_id, &effect) {
                failures.push(error);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            log::warn!("{} effect(s) failed during flush", failures.len());
            Err(FlushError::new(failures))
        }
    }

    /// Run `f` with flushing deferred until the outermost batch ends.
    pub fn batch<F, R>(&self, f: F) -> Result<R, FlushError>
    where
        F: FnOnce() -> R,
    {
        self.inner.context.lock().batch_depth += 1;
        let result = {
            let _guard = BatchGuard(&self.inner.context);
            f()
        };

        let outermost = self.inner.context.lock().batch_depth == 0;
        if outermost {
            self.flush()?;
        }
        Ok(result)
    }

    /// Whether a batch is currently open on this runtime.
    pub fn is_batching(&self) -> bool {
        self.inner.context.lock().batch_depth > 0
    }

    /// Register an observer function under `observer_id`.
    ///
    /// The observer has no dependencies until it is run.
    pub(crate) fn register_observer(&self, observer_id: usize, effect: EffectFn) {
        let mut ctx = self.inner.context.lock();
        ctx.untrack(observer_id);
        ctx.observers.insert(observer_id, effect);
    }

    /// Run an observer, replacing its dependencies with the reads of this run.
    pub(crate) fn run_observer(
        &self,
        observer_id: usize,
        effect: &EffectFn,
    ) -> Result<(), EffectError> {
        self.inner.context.lock().untrack(observer_id);
        self.with_observer(observer_id, || effect())
    }

    /// Run a function with a specific observer as the current context.
    pub fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self
            .inner
            .context
            .lock()
            .current_observer
            .replace(observer_id);
        let _guard = ObserverGuard {
            context: &self.inner.context,
            prev,
        };
        f()
    }

    /// Number of observers waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.context.lock().pending.len()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.context.lock().observers.len()
    }
}
