//! The seven-step booking wizard as a reducer.
//!
//! - [`actions`]: guest commands and backend events
//! - [`state`]: persisted progress plus transient view state
//! - [`environment`]: backend, snapshot storage, clock and settings
//! - [`reducer`]: the flow itself

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod state;

#[cfg(test)]
mod tests;

pub use actions::{BookingAction, FailedRequest};
pub use environment::BookingEnvironment;
pub use reducer::BookingReducer;
pub use state::{BookingState, BookingSummary, InFlight, Notification, NotificationKind, Request};
