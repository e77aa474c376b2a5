//! # Futsal Testing
//!
//! Testing utilities and helpers for reducer-driven features.
//!
//! This crate provides:
//! - Deterministic [`Clock`] implementations
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Assertion helpers for returned effects
//!
//! ## Example
//!
//! ```ignore
//! use futsal_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(test_environment())
//!     .given_state(BookingState::default())
//!     .when_action(BookingAction::ConfirmDate)
//!     .then_state(|state| assert_eq!(state.progress.step, 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use futsal_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use futsal_testing::mocks::FixedClock;
    /// use futsal_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Clones share the same instant, so a test can keep one handle and hand
    /// another to the environment.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Jump to an absolute instant
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut guard) = self.time.write() {
                *guard = time;
            }
        }

        /// Move forward by `by`
        pub fn advance(&self, by: Duration) {
            if let Ok(mut guard) = self.time.write() {
                *guard += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .read()
                .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_089))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
