//! The seven wizard steps and the single function that moves between them.
//!
//! [`transition`] is pure: the reducer gathers the facts it needs into
//! [`Gates`], asks for the next step, and either applies it or surfaces the
//! [`Rejection`]. Remote guards (slot status, registration, OTP checks) run
//! before the event is fired; by the time an event reaches this module the
//! server has already answered.

use crate::error::Rejection;
use crate::types::{GuestDetails, Shift};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wizard position, persisted as its number `1..=7`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Step {
    /// 1: pick a date
    #[default]
    SelectDate,
    /// 2: pick a shift
    SelectShift,
    /// 3: pick a slot and enter guest details
    SelectSlotAndDetails,
    /// 4: enter the one-time code
    VerifyOtp,
    /// 5: pay the advance
    Payment,
    /// 6: show the tracking code
    TrackingCodeDisplay,
    /// 7: booking summary (terminal)
    Summary,
}

impl Step {
    /// Every step in order
    pub const ALL: [Self; 7] = [
        Self::SelectDate,
        Self::SelectShift,
        Self::SelectSlotAndDetails,
        Self::VerifyOtp,
        Self::Payment,
        Self::TrackingCodeDisplay,
        Self::Summary,
    ];

    /// 1-based step number
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::SelectDate => 1,
            Self::SelectShift => 2,
            Self::SelectSlotAndDetails => 3,
            Self::VerifyOtp => 4,
            Self::Payment => 5,
            Self::TrackingCodeDisplay => 6,
            Self::Summary => 7,
        }
    }

    /// Step for a 1-based number
    #[must_use]
    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.number() == number)
    }

    /// No transition leaves this step except cancel/return home
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Summary)
    }

    /// The booking exists once this step is reached
    #[must_use]
    pub const fn is_booked(self) -> bool {
        matches!(self, Self::TrackingCodeDisplay | Self::Summary)
    }

    const fn title(self) -> &'static str {
        match self {
            Self::SelectDate => "select date",
            Self::SelectShift => "select shift",
            Self::SelectSlotAndDetails => "select slot and details",
            Self::VerifyOtp => "verify OTP",
            Self::Payment => "payment",
            Self::TrackingCodeDisplay => "tracking code",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.title())
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> Self {
        step.number()
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::from_number(number).ok_or_else(|| format!("step must be 1-7, got {number}"))
    }
}

/// Where step 3 goes once the guest is accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Phone not yet verified: send a code and wait for it
    VerifyOtp,
    /// Phone already verified: go straight to payment
    SkipToPayment,
}

/// Input to [`transition`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepEvent {
    /// Leave step 1 with the selected date
    ConfirmDate,
    /// Leave step 2 with the selected shift
    ConfirmShift,
    /// Step 3 passed all local and remote guards
    DetailsAccepted(Route),
    /// Server accepted the one-time code
    OtpVerified,
    /// Server created the booking
    PaymentConfirmed,
    /// Guest has seen the tracking code
    Acknowledge,
    /// One step back
    Back,
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConfirmDate => "confirm the date",
            Self::ConfirmShift => "confirm the shift",
            Self::DetailsAccepted(_) => "submit guest details",
            Self::OtpVerified => "verify the code",
            Self::PaymentConfirmed => "confirm payment",
            Self::Acknowledge => "acknowledge the tracking code",
            Self::Back => "go back",
        })
    }
}

/// Facts a transition may depend on
#[derive(Clone, Copy, Debug)]
pub struct Gates<'a> {
    /// Today in venue time
    pub today: NaiveDate,
    /// Selected date, if any
    pub date: Option<NaiveDate>,
    /// Selected shift, if any
    pub shift: Option<Shift>,
    /// This session holds a reservation
    pub holding_slot: bool,
    /// Guest details as entered
    pub guest: &'a GuestDetails,
    /// Payment reference as entered
    pub payment_id: &'a str,
}

/// Next step for `event` fired on `step`.
///
/// # Errors
///
/// Returns the [`Rejection`] that keeps the wizard on `step`.
pub fn transition(step: Step, event: StepEvent, gates: &Gates<'_>) -> Result<Step, Rejection> {
    match (step, event) {
        (Step::SelectDate, StepEvent::ConfirmDate) => {
            check_date(gates)?;
            Ok(Step::SelectShift)
        },
        (Step::SelectShift, StepEvent::ConfirmShift) => {
            check_date(gates)?;
            if gates.shift.is_none() {
                return Err(Rejection::MissingShift);
            }
            Ok(Step::SelectSlotAndDetails)
        },
        (Step::SelectSlotAndDetails, StepEvent::DetailsAccepted(route)) => {
            if !gates.holding_slot {
                return Err(Rejection::NoSlotHeld);
            }
            gates.guest.validate()?;
            Ok(match route {
                Route::VerifyOtp => Step::VerifyOtp,
                Route::SkipToPayment => Step::Payment,
            })
        },
        (Step::VerifyOtp, StepEvent::OtpVerified) => Ok(Step::Payment),
        (Step::Payment, StepEvent::PaymentConfirmed) => {
            if gates.payment_id.trim().is_empty() {
                return Err(Rejection::MissingPaymentId);
            }
            Ok(Step::TrackingCodeDisplay)
        },
        (Step::TrackingCodeDisplay, StepEvent::Acknowledge) => Ok(Step::Summary),
        (Step::SelectShift, StepEvent::Back) => Ok(Step::SelectDate),
        (Step::SelectSlotAndDetails, StepEvent::Back) => Ok(Step::SelectShift),
        (Step::VerifyOtp, StepEvent::Back) => Ok(Step::SelectSlotAndDetails),
        (from, event) => Err(Rejection::IllegalTransition { from, event }),
    }
}

fn check_date(gates: &Gates<'_>) -> Result<(), Rejection> {
    match gates.date {
        None => Err(Rejection::MissingDate),
        Some(date) if date < gates.today => Err(Rejection::DateInPast),
        Some(_) => Ok(()),
    }
}
