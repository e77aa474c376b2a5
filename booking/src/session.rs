//! A running booking wizard for one futsal.
//!
//! [`BookingSession`] wires the reducer, its environment and the runtime
//! store together. Opening a session restores the saved progress for the
//! futsal and revalidates it against the server; everything after that is
//! `send` / `dispatch` of [`BookingAction`]s.

use crate::api::BookingApi;
use crate::machine::Step;
use crate::progress::{BookingProgress, ProgressStore};
use crate::types::{DisplayStatus, FutsalContext, Slot};
use crate::wizard::{
    BookingAction, BookingEnvironment, BookingReducer, BookingState, BookingSummary, Notification,
};
use futsal_runtime::{EffectHandle, Store, StoreError};
use std::time::Duration;
use tokio::sync::broadcast;

/// Store type behind a session
pub type BookingStore<A, P> =
    Store<BookingState, BookingAction, BookingEnvironment<A, P>, BookingReducer<A, P>>;

/// One guest's booking wizard
pub struct BookingSession<A: BookingApi, P: ProgressStore> {
    store: BookingStore<A, P>,
}

impl<A: BookingApi, P: ProgressStore> Clone for BookingSession<A, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<A: BookingApi, P: ProgressStore> BookingSession<A, P> {
    /// Open the wizard for `futsal`, resuming saved progress when usable.
    ///
    /// Waits until special prices are loaded and a restored listing has been
    /// re-read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store refuses the opening action.
    pub async fn open(futsal: FutsalContext, env: BookingEnvironment<A, P>) -> Result<Self, StoreError> {
        let repository = env.progress.clone();
        let (futsal_id, today) = (futsal.id, env.today());
        let restored = tokio::task::spawn_blocking(move || repository.restore(futsal_id, today))
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(%futsal_id, %error, "Progress restore task failed");
                None
            });
        tracing::info!(
            futsal_id = %futsal.id,
            resumed = restored.is_some(),
            "Opening booking wizard"
        );

        let mut state = BookingState::new(futsal, restored.unwrap_or_default());
        state.revision = env.progress.latest_revision(state.futsal.id);

        let session = Self {
            store: Store::new(state, BookingReducer::new(), env),
        };
        session.dispatch(BookingAction::Opened).await?;
        Ok(session)
    }

    /// Send an action without waiting for its requests
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn send(&self, action: BookingAction) -> Result<EffectHandle, StoreError> {
        self.store.send(action).await
    }

    /// Send an action and wait for every request it started, including the
    /// actions those requests fed back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn dispatch(&self, action: BookingAction) -> Result<(), StoreError> {
        let mut handle = self.store.send(action).await?;
        handle.wait().await;
        Ok(())
    }

    /// Copy of the whole state
    pub async fn snapshot(&self) -> BookingState {
        self.store.state(Clone::clone).await
    }

    /// Copy of the persisted part of the state
    pub async fn progress(&self) -> BookingProgress {
        self.store.state(|state| state.progress.clone()).await
    }

    /// Current step
    pub async fn step(&self) -> Step {
        self.store.state(BookingState::step).await
    }

    /// Final-step summary, once a booking exists
    pub async fn summary(&self) -> Option<BookingSummary> {
        self.store.state(BookingState::summary).await
    }

    /// Listed slots with the status to display right now
    pub async fn slot_view(&self) -> Vec<(Slot, DisplayStatus)> {
        let now = self.store.environment().local_now();
        self.store.state(|state| state.slot_view(now)).await
    }

    /// Take the notifications raised so far
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`Self::shutdown`].
    pub async fn drain_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.store.state(|state| state.notifications.clone()).await;
        if !notifications.is_empty() {
            self.store
                .send(BookingAction::DismissNotifications {
                    count: notifications.len(),
                })
                .await?;
        }
        Ok(notifications)
    }

    /// Follow server outcomes as they arrive
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BookingAction> {
        self.store.subscribe_actions()
    }

    /// Injected environment
    #[must_use]
    pub fn environment(&self) -> &BookingEnvironment<A, P> {
        self.store.environment()
    }

    /// Stop accepting actions and wait for outstanding requests
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if requests are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.shutdown(timeout).await
    }
}
