//! # Chainpass Runtime
//!
//! Runtime for chainpass reducers.
//!
//! The [`store::Store`] owns a reducer's state, runs the reducer for every
//! action, executes the returned effects on the Tokio runtime and feeds the
//! actions they produce back into the reducer.
//!
//! ## Example
//!
//! ```ignore
//! use chainpass_runtime::Store;
//!
//! let store = Store::new(PurchaseState::new(purchaser), PurchaseReducer::new(), env);
//!
//! // Send an action
//! store.send(PurchaseAction::Initiate { event_id }).await?;
//!
//! // Read state
//! let status = store.state(|s| s.attempt.status).await;
//! ```

use chainpass_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

/// Retry logic with exponential backoff
pub mod retry;

pub use retry::RetryPolicy;
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use std::time::Duration;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// No matching action was observed before the deadline
        #[error("Timed out after {0:?} waiting for a matching action")]
        Timeout(Duration),

        /// The action broadcast channel closed
        #[error("Action channel closed")]
        ChannelClosed,

        /// The store no longer accepts actions
        #[error("Store is shutting down")]
        ShutdownInProgress,
    }
}

pub use error::StoreError;

/// Handle for waiting on the effects started by one `send`
///
/// Only the effects returned directly by the reducer are tracked; actions
/// fed back by those effects are reduced before the handle completes, but
/// effects they start in turn are not waited for.
#[derive(Clone)]
pub struct EffectHandle {
    pending: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let pending = Arc::new(AtomicUsize::new(0));
        let (notifier, completion) = watch::channel(());

        let handle = Self {
            pending: Arc::clone(&pending),
            completion,
        };
        let tracking = EffectTracking { pending, notifier };

        (handle, tracking)
    }

    /// Number of tracked effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every tracked effect has finished (or been aborted)
    pub async fn wait(&mut self) {
        while self.pending.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for tracked effects with an upper bound
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running after `timeout`.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout(timeout))
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct EffectTracking {
    pending: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    fn begin(&self) -> PendingGuard {
        self.pending.fetch_add(1, Ordering::SeqCst);
        PendingGuard(self.clone())
    }
}

/// Decrements the pending count when the task finishes or is aborted
struct PendingGuard(EffectTracking);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::SeqCst);
        self.0.notifier.send_replace(());
    }
}

/// Store implementation
pub mod store {
    use super::{
        Arc, AtomicU64, Duration, Effect, EffectHandle, EffectTracking, Ordering, Reducer, RwLock,
        StoreError, watch,
    };
    use chainpass_core::effect::EffectId;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::sync::broadcast;
    use tokio::task::AbortHandle;

    type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Actions buffered for each observer before it starts lagging
    const BROADCAST_CAPACITY: usize = 16;

    struct InFlight {
        token: u64,
        handle: AbortHandle,
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution, feedback and cancellation
    ///
    /// Cloning a store is cheap; clones share state and in-flight effects.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        in_flight: Arc<Mutex<HashMap<EffectId, InFlight>>>,
        next_token: Arc<AtomicU64>,
        /// Flips to `true` once, on [`Store::shutdown`].
        shutdown: Arc<watch::Sender<bool>>,
        /// Actions produced by effects, published after they were reduced.
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
                in_flight: Arc::clone(&self.in_flight),
                next_token: Arc::clone(&self.next_token),
                shutdown: Arc::clone(&self.shutdown),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Clone + Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (action_broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
            let (shutdown, _) = watch::channel(false);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                in_flight: Arc::new(Mutex::new(HashMap::new())),
                next_token: Arc::new(AtomicU64::new(0)),
                shutdown: Arc::new(shutdown),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// The reducer runs under the state write lock; its effects are
        /// started once the lock is released.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] after [`Store::shutdown`].
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.is_shut_down() {
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            for effect in effects {
                self.execute(effect, &tracking);
            }

            Ok(handle)
        }

        /// Wait on `receiver` for an action matching `predicate`
        ///
        /// Subscribe with [`Store::subscribe_actions`] before sending the
        /// action whose effects produce the awaited one, so a fast effect
        /// cannot be missed. The matching action has already been reduced
        /// when it is returned.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: nothing matched before `timeout`
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: the store is or was shut down
        ///   while waiting
        pub async fn wait_for<F>(
            &self,
            receiver: &mut broadcast::Receiver<A>,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let shut_down = Self::shut_down(self.shutdown.subscribe());
            tokio::pin!(shut_down);

            let wait = async {
                loop {
                    tokio::select! {
                        received = receiver.recv() => match received {
                            Ok(action) if predicate(&action) => return Ok(action),
                            Ok(_) => {},
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "Action observer lagged");
                            },
                            Err(broadcast::error::RecvError::Closed) => {
                                return Err(StoreError::ChannelClosed);
                            },
                        },
                        () = &mut shut_down => return Err(StoreError::ShutdownInProgress),
                    }
                }
            };

            tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| StoreError::Timeout(timeout))?
        }

        /// Resolves once the shutdown flag is set
        async fn shut_down(mut signal: watch::Receiver<bool>) {
            while !*signal.borrow_and_update() {
                if signal.changed().await.is_err() {
                    return;
                }
            }
        }

        /// Subscribe to actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read state through a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Whether a cancellable effect with this id is still running
        #[must_use]
        pub fn is_in_flight(&self, id: &EffectId) -> bool {
            self.lock_in_flight().contains_key(id)
        }

        /// Whether [`Store::shutdown`] has been called
        #[must_use]
        pub fn is_shut_down(&self) -> bool {
            *self.shutdown.borrow()
        }

        /// Stop accepting actions and abort every cancellable effect
        ///
        /// Callers blocked in [`Store::wait_for`] are woken with
        /// [`StoreError::ShutdownInProgress`].
        pub fn shutdown(&self) {
            self.shutdown.send_replace(true);

            let aborted: Vec<InFlight> = self.lock_in_flight().drain().map(|(_, f)| f).collect();
            for in_flight in &aborted {
                in_flight.handle.abort();
            }
            tracing::info!(aborted = aborted.len(), "Store shut down");
        }

        fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<EffectId, InFlight>> {
            self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn execute(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guard = tracking.begin();
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        store.feed_back(fut.await).await;
                    });
                },
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable").increment(1);
                    let guard = tracking.begin();
                    let token = self.next_token.fetch_add(1, Ordering::SeqCst);
                    let store = self.clone();
                    let task_id = id.clone();

                    // Hold the lock across spawn so the task cannot deregister
                    // before it has been registered.
                    let mut in_flight = self.lock_in_flight();
                    let task = tokio::spawn(async move {
                        let _guard = guard;
                        store.clone().run(*effect).await;
                        store.finish_cancellable(&task_id, token);
                    });

                    let previous = in_flight.insert(
                        id.clone(),
                        InFlight {
                            token,
                            handle: task.abort_handle(),
                        },
                    );
                    if let Some(previous) = previous {
                        tracing::debug!(effect_id = %id, "Replacing in-flight effect");
                        previous.handle.abort();
                    }
                },
                Effect::Cancel(id) => {
                    let removed = self.lock_in_flight().remove(&id);
                    if let Some(in_flight) = removed {
                        tracing::debug!(effect_id = %id, "Cancelling in-flight effect");
                        in_flight.handle.abort();
                    } else {
                        tracing::trace!(effect_id = %id, "Cancel requested for idle effect");
                    }
                },
            }
        }

        /// Run an effect to completion inside the current task
        fn run(self, effect: Effect<A>) -> BoxedRun {
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        let action = fut.await;
                        self.feed_back(action).await;
                    },
                    nested @ (Effect::Cancellable { .. } | Effect::Cancel(_)) => {
                        let (_handle, tracking) = EffectHandle::new();
                        self.execute(nested, &tracking);
                    },
                }
            })
        }

        fn finish_cancellable(&self, id: &EffectId, token: u64) {
            let mut in_flight = self.lock_in_flight();
            if in_flight.get(id).is_some_and(|f| f.token == token) {
                in_flight.remove(id);
            }
        }

        /// Reduce an effect's output, then publish it to observers
        async fn feed_back(&self, action: Option<A>) {
            let Some(action) = action else {
                tracing::trace!("Effect completed with no action");
                return;
            };

            match self.send(action.clone()).await {
                Ok(_) => {
                    // No receivers is the common case
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    tracing::warn!(error = %error, "Dropping action produced by effect");
                },
            }
        }
    }
}
