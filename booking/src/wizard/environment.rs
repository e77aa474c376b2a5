//! Injected dependencies for the booking wizard.

use crate::api::BookingApi;
use crate::config::BookingConfig;
use crate::progress::{ProgressRepository, ProgressStore};
use chrono::{NaiveDate, NaiveDateTime};
use futsal_core::environment::Clock;
use std::sync::Arc;

/// Environment for [`super::BookingReducer`]
pub struct BookingEnvironment<A, P> {
    /// Backend
    pub api: A,
    /// Snapshot persistence
    pub progress: ProgressRepository<P>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Settings
    pub config: BookingConfig,
}

impl<A: Clone, P> Clone for BookingEnvironment<A, P> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            progress: self.progress.clone(),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<A: BookingApi, P: ProgressStore> BookingEnvironment<A, P> {
    /// Build an environment
    #[must_use]
    pub fn new(api: A, store: P, clock: Arc<dyn Clock>, config: BookingConfig) -> Self {
        Self {
            api,
            progress: ProgressRepository::new(store),
            clock,
            config,
        }
    }

    /// Wall-clock time at the venue
    #[must_use]
    pub fn local_now(&self) -> NaiveDateTime {
        self.clock
            .now()
            .with_timezone(&self.config.venue_offset())
            .naive_local()
    }

    /// Today at the venue
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}
