//! Actions for the booking wizard.

use crate::api::ReserveOutcome;
use crate::machine::Route;
use crate::pricing::{PriceQuote, SpecialPrice};
use crate::types::{Booking, GuestDetails, Shift, Slot, SlotId, SlotStatus};
use chrono::NaiveDate;

/// Inputs to the booking wizard reducer
///
/// Commands come from the guest. Events are produced by effects once the
/// backend has answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    // ========== Commands ==========
    /// Session started; load rules and revalidate a restored listing
    Opened,

    /// Pick the day (step 1)
    SelectDate {
        /// Chosen day
        date: NaiveDate,
    },

    /// Leave step 1
    ConfirmDate,

    /// Pick the shift (step 2)
    SelectShift {
        /// Chosen shift
        shift: Shift,
    },

    /// Leave step 2 and list slots
    ConfirmShift,

    /// Re-read the slot listing
    RefreshSlots,

    /// Reserve a slot, or release it if it is the one held (step 3)
    ToggleSlot {
        /// Slot pressed
        slot_id: SlotId,
    },

    /// Replace the guest details (step 3)
    UpdateGuest {
        /// Details as typed
        guest: GuestDetails,
    },

    /// Leave step 3 through the remote guards
    SubmitDetails,

    /// Type the one-time code (step 4)
    EnterOtp {
        /// Code as typed
        code: String,
    },

    /// Check the typed code with the server
    VerifyOtp,

    /// Ask for a new code once the countdown ran out
    ResendOtp,

    /// One countdown second elapsed
    OtpTick {
        /// Generation of the code the tick belongs to
        generation: u64,
    },

    /// Type the payment reference (step 5)
    SetPaymentId {
        /// Reference as typed
        payment_id: String,
    },

    /// Pay the advance and create the booking
    ConfirmPayment,

    /// Tracking code seen (step 6)
    Acknowledge,

    /// One step back
    Back,

    /// Abandon the wizard, releasing any held slot
    Cancel,

    /// Leave after finishing
    ReturnHome,

    /// Cancel the created booking
    CancelBooking,

    /// Forget the first `count` notifications (they were shown)
    DismissNotifications {
        /// How many to drop
        count: usize,
    },

    // ========== Events ==========
    /// Special-price rules loaded
    SpecialPricesLoaded {
        /// Venue rules
        rules: Vec<SpecialPrice>,
    },

    /// Listing arrived for a date and shift
    SlotsLoaded {
        /// Date listed
        date: NaiveDate,
        /// Shift listed
        shift: Shift,
        /// Slots as the server sees them
        slots: Vec<Slot>,
    },

    /// A previously held slot was handed back
    SlotReleased {
        /// Released slot
        slot_id: SlotId,
        /// Whether the server acknowledged it
        acknowledged: bool,
    },

    /// Reserve request answered
    ReserveAnswered {
        /// Requested slot
        slot_id: SlotId,
        /// Server verdict
        outcome: ReserveOutcome,
    },

    /// Rate preview for the chosen day
    DatePriced {
        /// Day quoted
        date: NaiveDate,
        /// Server quote, or the local resolution when the server failed
        quote: PriceQuote,
    },

    /// Price quote for the held slot
    PriceQuoted {
        /// Held slot
        slot_id: SlotId,
        /// Server quote, or the local resolution when the server failed
        quote: PriceQuote,
    },

    /// Status check found the held slot booked or disabled
    SlotWentStale {
        /// Submission the check belongs to
        submission: u64,
        /// Held slot
        slot_id: SlotId,
        /// Status the server reported
        status: SlotStatus,
    },

    /// Phone belongs to an account
    PhoneAlreadyRegistered {
        /// Submission the check belongs to
        submission: u64,
    },

    /// Guards passed; where to go next
    DetailsAccepted {
        /// Submission the checks belong to
        submission: u64,
        /// Skip OTP or not
        route: Route,
    },

    /// A code was sent after a resend request
    OtpResent,

    /// Server answered a verification attempt
    OtpChecked {
        /// Whether the code matched
        accepted: bool,
    },

    /// Booking created from the held slot
    BookingCreated {
        /// Durable record
        booking: Booking,
    },

    /// Booking cancelled on the server
    BookingCancelled,

    /// A request failed
    RequestFailed {
        /// Which request
        request: FailedRequest,
        /// Diagnostic text (logged, not shown)
        reason: String,
        /// Server-provided message safe to show, if any
        message: Option<String>,
    },
}

/// Request kinds that report failures through [`BookingAction::RequestFailed`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailedRequest {
    /// Special-price rules
    SpecialPrices,
    /// Slot listing
    Slots,
    /// Reservation
    Reserve {
        /// Requested slot
        slot_id: SlotId,
    },
    /// Step 3 submission chain
    Submit {
        /// Submission that failed
        submission: u64,
    },
    /// OTP verification
    Verify,
    /// OTP resend
    Resend,
    /// Booking creation
    Payment,
    /// Booking cancellation
    CancelBooking,
}
