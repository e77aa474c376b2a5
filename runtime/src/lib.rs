//! # Futsal Runtime
//!
//! Runtime implementation for reducer-driven features.
//!
//! This crate provides the [`Store`](store::Store), which owns a feature's
//! state, runs its reducer, and executes the effects the reducer returns.
//!
//! ## Core Components
//!
//! - **Store**: Manages state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to the reducer
//! - **`EffectHandle`**: Lets a caller await the work an action started
//!
//! ## Example
//!
//! ```ignore
//! use futsal_runtime::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action and wait for the network chain it started
//! let mut handle = store.send(Action::DoSomething).await?;
//! handle.wait().await;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

use futsal_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

pub use error::StoreError;
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timed out waiting for effects of an action to settle
        #[error("Timeout waiting for effects to complete")]
        Timeout,
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects of an
/// action to complete.
///
/// Waiting covers `Future` and `Sequential` effects and, transitively, the
/// effects of every action they feed back into the store. `Delay` effects
/// are not tracked by the handle; they only count towards shutdown.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a handle together with the tracking context used by the executor
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Useful for initialization in loops where you need a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracking) = Self::new();
        handle
    }

    /// Whether every tracked effect has finished
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.effects.load(Ordering::SeqCst) == 0
    }

    /// Wait for all tracked effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, nothing can still be running
                break;
            }
        }
    }

    /// Wait for all tracked effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all
    /// effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Register a started effect and get the guard that completes it
    fn start(&self) -> DecrementGuard {
        self.counter.fetch_add(1, Ordering::SeqCst);
        DecrementGuard(self.clone())
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl AtomicCounterGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, Duration, Effect, EffectHandle,
        EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };
    use tokio::sync::broadcast;

    /// Default capacity of the action broadcast channel
    const DEFAULT_BROADCAST_CAPACITY: usize = 64;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a store is cheap and every clone drives the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Every action produced by an effect is broadcast here before it is
        /// reduced, so observers can follow server outcomes as they land.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(
                initial_state,
                reducer,
                environment,
                DEFAULT_BROADCAST_CAPACITY,
            )
        }

        /// Create a new Store with custom action broadcast capacity
        ///
        /// Increase the capacity when observers are slow and frequently lag.
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// The injected environment
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Number of effects currently running (including scheduled delays)
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Subscribe to actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects
        ///
        /// `send()` returns once the effects are started; use the returned
        /// [`EffectHandle`] to wait for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut *state, action, &*self.environment)
            };

            let (handle, tracking) = EffectHandle::new();
            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let step = store.state(|s| s.progress.step).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, then waits for running effects (including
        /// scheduled delays) to finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(20);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::warn!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Feed an effect-produced action back into the store and wait for
        /// the effects it starts.
        async fn feed_back(&self, action: A) {
            let _ = self.action_broadcast.send(action.clone());

            match self.send(action).await {
                Ok(mut handle) => handle.wait().await,
                Err(error) => {
                    tracing::debug!(%error, "Dropping effect output");
                },
            }
        }

        /// Execute an effect under the given tracking context
        ///
        /// - `None`: No-op
        /// - `Future`: Awaits the computation, feeds back the resulting action
        /// - `Delay`: Sleeps, then sends the action (not tracked by the handle)
        /// - `Parallel`: Starts every child under the same tracking
        /// - `Sequential`: Runs children in order, each to full completion
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);

                    let guard = tracking.start();
                    let pending_guard = AtomicCounterGuard::new(&self.pending_effects);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action");
                            store.feed_back(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!(?duration, "Executing Effect::Delay");
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);

                    let pending_guard = AtomicCounterGuard::new(&self.pending_effects);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _pending_guard = pending_guard;

                        tokio::time::sleep(duration).await;
                        let _ = store.action_broadcast.send((*action).clone());
                        if let Err(error) = store.send(*action).await {
                            tracing::debug!(%error, "Dropping delayed action");
                        }
                    });
                },
                Effect::Parallel(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Parallel");
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);

                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                },
                Effect::Sequential(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Sequential");
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);

                    let guard = tracking.start();
                    let pending_guard = AtomicCounterGuard::new(&self.pending_effects);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        for effect in effects {
                            let (mut step, step_tracking) = EffectHandle::new();
                            store.execute_effect(effect, &step_tracking);
                            drop(step_tracking);
                            step.wait().await;
                        }
                        tracing::trace!("Effect::Sequential completed");
                    });
                },
            }
        }
    }
}
