//! State owned by the booking wizard reducer.

use crate::cache::SlotBoard;
use crate::error::Rejection;
use crate::machine::{Gates, Step};
use crate::otp::OtpState;
use crate::pricing::{PriceQuote, SpecialPrice, resolve_for_display};
use crate::progress::BookingProgress;
use crate::types::{Booking, DisplayStatus, FutsalContext, GuestDetails, Money, Slot, minutes_between};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Severity of a guest-facing message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Advisory (special prices, code sent)
    Info,
    /// Something completed
    Success,
    /// The guest needs to act (slot taken, expired code)
    Warning,
    /// A request failed
    Error,
}

/// Transient guest-facing message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity
    pub kind: NotificationKind,
    /// Text
    pub message: String,
}

impl Notification {
    /// Build a notification
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Kinds of request the wizard allows only one of at a time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Request {
    /// Slot reservation (with its preceding release)
    Reserve,
    /// Step 3 submission chain
    Submit,
    /// OTP verification
    Verify,
    /// OTP resend
    Resend,
    /// Booking creation
    Payment,
    /// Booking cancellation
    CancelBooking,
}

/// Requests currently waiting on the server
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InFlight(Vec<Request>);

impl InFlight {
    /// Mark `request` as started; `false` if one is already running
    pub fn begin(&mut self, request: Request) -> bool {
        if self.0.contains(&request) {
            return false;
        }
        self.0.push(request);
        true
    }

    /// Mark `request` as finished
    pub fn finish(&mut self, request: Request) {
        self.0.retain(|running| *running != request);
    }

    /// Whether `request` is running
    #[must_use]
    pub fn contains(&self, request: Request) -> bool {
        self.0.contains(&request)
    }

    /// Whether nothing is running
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Data shown on the final step
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingSummary {
    /// The booking
    pub booking: Booking,
    /// Displayed hourly rate
    pub rate: PriceQuote,
    /// Price for the whole slot at the displayed rate
    pub total: Money,
    /// Still owed at the venue
    pub balance_due: Money,
}

/// Wizard state for one futsal
#[derive(Clone, Debug)]
pub struct BookingState {
    /// Venue being booked
    pub futsal: FutsalContext,
    /// Persisted part of the wizard
    pub progress: BookingProgress,
    /// Advisory slot listing
    pub slots: SlotBoard,
    /// Code entry and countdown
    pub otp: OtpState,
    /// Rate preview for the selected date
    pub date_quote: Option<PriceQuote>,
    /// Price for the held slot
    pub quote: Option<PriceQuote>,
    /// Venue special-price rules
    pub special_prices: Vec<SpecialPrice>,
    /// Requests waiting on the server
    pub in_flight: InFlight,
    /// Current step 3 submission; answers to older ones are dropped
    pub submission: u64,
    /// Messages not yet shown
    pub notifications: Vec<Notification>,
    /// Most recent refusal
    pub last_rejection: Option<Rejection>,
    /// Bumped on every snapshot write
    pub revision: u64,
    /// Cancelled or returned home; nothing is persisted any more
    pub exited: bool,
}

impl BookingState {
    /// Fresh or restored wizard for `futsal`
    #[must_use]
    pub fn new(futsal: FutsalContext, progress: BookingProgress) -> Self {
        let mut slots = SlotBoard::default();
        if let (Some(date), Some(shift)) = (progress.selected_date, progress.selected_shift) {
            slots.rescope(date, shift);
            slots.load(date, shift, progress.available_slots.clone());
            // Restored listings are only a hint until re-read
            slots.mark_stale();
        }

        Self {
            futsal,
            progress,
            slots,
            otp: OtpState::default(),
            date_quote: None,
            quote: None,
            special_prices: Vec::new(),
            in_flight: InFlight::default(),
            submission: 0,
            notifications: Vec::new(),
            last_rejection: None,
            revision: 0,
            exited: false,
        }
    }

    /// Current step
    #[must_use]
    pub const fn step(&self) -> Step {
        self.progress.step
    }

    /// Whether this session holds a slot reservation
    #[must_use]
    pub fn holds_slot(&self) -> bool {
        self.progress.selected_slot().is_some()
    }

    /// Facts for [`crate::machine::transition`]
    #[must_use]
    pub fn gates<'a>(&'a self, today: NaiveDate, guest: &'a GuestDetails) -> Gates<'a> {
        Gates {
            today,
            date: self.progress.selected_date,
            shift: self.progress.selected_shift,
            holding_slot: self.holds_slot(),
            guest,
            payment_id: &self.progress.payment_id,
        }
    }

    /// Slots with the status to display at `now` (venue time)
    #[must_use]
    pub fn slot_view(&self, now: NaiveDateTime) -> Vec<(Slot, DisplayStatus)> {
        let Some((date, _)) = self.slots.scope() else {
            return Vec::new();
        };
        self.slots
            .slots()
            .iter()
            .map(|slot| (slot.clone(), slot.display_status(date, now)))
            .collect()
    }

    /// Summary data once a booking exists
    #[must_use]
    pub fn summary(&self) -> Option<BookingSummary> {
        let booking = self.progress.booking.clone()?;
        let rate = resolve_for_display(booking.price_per_hour, booking.booking_date, &self.special_prices);
        let minutes = minutes_between(booking.start_time, booking.end_time);
        let total = rate.effective_price.prorate_minutes(minutes);
        let balance_due = total.saturating_sub(booking.amount_paid);
        Some(BookingSummary {
            booking,
            rate,
            total,
            balance_due,
        })
    }

    pub(crate) fn notify(&mut self, kind: NotificationKind, message: impl Into<String>) {
        self.notifications.push(Notification::new(kind, message));
    }

    pub(crate) fn reject(&mut self, rejection: Rejection) {
        tracing::debug!(step = %self.progress.step, %rejection, "Rejected");
        self.notify(NotificationKind::Warning, rejection.to_string());
        self.last_rejection = Some(rejection);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::types::FutsalId;

    #[test]
    fn test_in_flight_allows_one_of_each() {
        let mut in_flight = InFlight::default();
        assert!(in_flight.begin(Request::Submit));
        assert!(!in_flight.begin(Request::Submit));
        assert!(in_flight.begin(Request::Reserve));

        in_flight.finish(Request::Submit);
        assert!(!in_flight.contains(Request::Submit));
        assert!(in_flight.contains(Request::Reserve));
        in_flight.clear();
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_restored_listing_is_stale() {
        let futsal = FutsalContext {
            id: FutsalId::new(1),
            name: "Arena".to_string(),
            price_per_hour: Money::new(1500),
        };
        let progress = BookingProgress {
            selected_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            selected_shift: Some(crate::types::Shift::Evening),
            ..BookingProgress::default()
        };
        let state = BookingState::new(futsal, progress);
        assert!(state.slots.is_stale());
        assert!(state.slots.scope().is_some());
        assert!(state.summary().is_none());
    }
}
