//! Backend collaborators used by the wizard.
//!
//! [`BookingApi`] is the only way the wizard talks to the outside world. The
//! slot calls implement the soft-lock protocol: `reserve_slot` asks the server
//! to move a slot from available to pending for this session, `release_slot`
//! gives it back, and `slot_status` is the authoritative check before anything
//! depends on a hold.
//!
//! Implementations: [`crate::http::HttpBookingApi`] for a real backend and
//! [`crate::mocks::SimulatedApi`] for tests and the demo.

use crate::error::ApiResult;
use crate::pricing::{PriceQuote, SpecialPrice};
use crate::types::{Booking, FutsalId, NewBooking, Shift, Slot, SlotId, SlotStatus, TrackingCode};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// `otp_type` sent with OTP requests
pub const OTP_TYPE: &str = "phone_verification";

/// Result of asking the server to soft-lock a slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveOutcome {
    /// The slot is now pending for this session
    Reserved,
    /// Someone else got there first, or the slot cannot be booked
    Rejected {
        /// Status the server reported for the slot
        status: Option<SlotStatus>,
        /// Server-provided explanation
        message: Option<String>,
    },
}

impl ReserveOutcome {
    /// Whether the hold was granted
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved)
    }

    /// Guest-facing explanation of a rejection
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Reserved => None,
            Self::Rejected {
                status: Some(status),
                ..
            } => Some(reject_message(*status).to_string()),
            Self::Rejected {
                status: None,
                message: Some(message),
            } if !message.trim().is_empty() => Some(message.clone()),
            Self::Rejected { .. } => Some(GENERIC_REJECTION.to_string()),
        }
    }
}

const GENERIC_REJECTION: &str = "Could not reserve this slot. Please try again.";

/// Guest-facing sentence for a slot the server would not reserve
#[must_use]
pub const fn reject_message(status: SlotStatus) -> &'static str {
    match status {
        SlotStatus::Booked => "Slot already booked. Please choose another time slot.",
        SlotStatus::Pending => {
            "Slot is being booked by someone else. Please choose another time slot."
        },
        SlotStatus::Disabled => "Slot is not available for booking. Please choose another time slot.",
        SlotStatus::Available => GENERIC_REJECTION,
    }
}

/// REST operations the booking wizard depends on.
///
/// Every method is one independent request. Nothing retries automatically.
pub trait BookingApi: Clone + Send + Sync + 'static {
    /// Slots for a futsal, date and shift
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn list_slots(
        &self,
        futsal_id: FutsalId,
        date: NaiveDate,
        shift: Shift,
    ) -> impl Future<Output = ApiResult<Vec<Slot>>> + Send;

    /// Authoritative status of one slot
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn slot_status(&self, slot_id: SlotId) -> impl Future<Output = ApiResult<SlotStatus>> + Send;

    /// Soft-lock a slot for this session
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] when the request fails for reasons
    /// other than the slot being unavailable.
    fn reserve_slot(&self, slot_id: SlotId) -> impl Future<Output = ApiResult<ReserveOutcome>> + Send;

    /// Give a soft-locked slot back
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on failure; callers treat this as
    /// best effort.
    fn release_slot(&self, slot_id: SlotId) -> impl Future<Output = ApiResult<()>> + Send;

    /// Server-side price calculation for a date and optional slot start
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn price_quote(
        &self,
        futsal_id: FutsalId,
        date: NaiveDate,
        start_time: Option<NaiveTime>,
    ) -> impl Future<Output = ApiResult<PriceQuote>> + Send;

    /// Every special-price rule of a futsal
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn special_prices(
        &self,
        futsal_id: FutsalId,
    ) -> impl Future<Output = ApiResult<Vec<SpecialPrice>>> + Send;

    /// Whether the phone belongs to a registered account
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn is_registered(&self, phone: &str) -> impl Future<Output = ApiResult<bool>> + Send;

    /// Whether the phone has already passed OTP verification
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn is_otp_verified(&self, phone: &str) -> impl Future<Output = ApiResult<bool>> + Send;

    /// Issue a one-time code to the phone.
    ///
    /// Returns the code when the backend echoes it (development setups).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn generate_otp(&self, phone: &str) -> impl Future<Output = ApiResult<Option<String>>> + Send;

    /// Check a one-time code; `false` means the code was refused
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] when the server could not decide.
    fn verify_otp(&self, phone: &str, code: &str) -> impl Future<Output = ApiResult<bool>> + Send;

    /// Turn a held slot into a durable booking
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport, status or decode failure.
    fn create_booking(&self, booking: NewBooking) -> impl Future<Output = ApiResult<Booking>> + Send;

    /// Cancel a booking by tracking code
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ApiError`] on transport or status failure.
    fn cancel_booking(&self, tracking_code: &TrackingCode) -> impl Future<Output = ApiResult<()>> + Send;
}
