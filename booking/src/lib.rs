//! Futsal court booking - slot soft-locks and the guest booking wizard
//!
//! A guest books a court in seven steps:
//!
//! ```text
//! 1 date ─▶ 2 shift ─▶ 3 slot + details ─┬─▶ 4 OTP ─┬─▶ 5 payment ─▶ 6 tracking code ─▶ 7 summary
//!                                        └──────────┘
//!                                     (phone already verified)
//! ```
//!
//! # Key Features
//!
//! ## 1. Server-side slot soft-locks
//!
//! Selecting a slot on step 3 asks the server to move it from `available` to
//! `pending` for this session. At most one slot is held at a time: picking
//! another slot releases the previous one first, and going back or leaving
//! the wizard hands the hold back. Before the guest leaves step 3 the slot
//! status is re-read; a hold that lapsed sends the guest back to the listing.
//!
//! ## 2. Pricing
//!
//! A date-specific special price beats a recurring weekday price, which
//! beats a time-of-day price, which beats the futsal's base rate. See
//! [`pricing::resolve`].
//!
//! ## 3. Resumable progress
//!
//! Every change is saved as a versioned JSON snapshot per futsal and
//! restored when the wizard is opened again. Restoring never re-reserves.
//!
//! # Architecture
//!
//! The wizard is a [`futsal_core::reducer::Reducer`] driven by a
//! [`futsal_runtime::Store`]. All I/O happens in effects through the
//! [`api::BookingApi`] and [`progress::ProgressStore`] seams.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod machine;
pub mod mocks;
pub mod otp;
pub mod pricing;
pub mod progress;
pub mod session;
pub mod types;
pub mod wizard;

pub use api::{BookingApi, ReserveOutcome};
pub use config::BookingConfig;
pub use error::{ApiError, ApiResult, GuestError, Rejection, StorageError};
pub use http::HttpBookingApi;
pub use machine::{Route, Step, StepEvent, transition};
pub use pricing::{PriceQuote, SpecialPrice, resolve, resolve_for_display};
pub use progress::{BookingProgress, FileProgressStore, MemoryProgressStore, ProgressRepository, ProgressStore};
pub use session::BookingSession;
pub use types::{
    Booking, FutsalContext, FutsalId, GuestDetails, Money, Shift, Slot, SlotId, SlotStatus, TrackingCode,
};
pub use wizard::{BookingAction, BookingEnvironment, BookingReducer, BookingState};
