//! Error types for the booking wizard.

use crate::machine::{Step, StepEvent};
use crate::types::Shift;
use thiserror::Error;

/// Result type alias for REST calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors returned by the booking backend client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, TLS)
    #[error("Request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message from the response body, if any
        message: String,
    },

    /// The response body did not match the expected shape
    #[error("Response parsing failed: {0}")]
    Decode(String),

    /// The configured base URL cannot be used
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Whether the backend rejected the request (as opposed to being unreachable)
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status >= 400 && *status < 500)
    }
}

/// Errors from persisted wizard progress.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("Progress storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded
    #[error("Progress snapshot is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shared in-memory store was poisoned by a panicking writer
    #[error("Progress storage lock poisoned")]
    Poisoned,
}

/// Reasons guest contact details are refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuestError {
    /// Phone is not 10 digits starting with 9
    #[error("Phone number must be 10 digits and start with 9")]
    InvalidPhone,

    /// Name is blank
    #[error("Name is required")]
    MissingName,

    /// Player count outside 1..=10
    #[error("Number of players must be between 1 and 10 (got {0})")]
    PlayersOutOfRange(u8),

    /// Team name longer than allowed
    #[error("Team name must be at most {max} characters")]
    TeamNameTooLong {
        /// Maximum accepted length
        max: usize,
    },
}

/// Why the wizard refused to fire a transition.
///
/// A rejection never changes the current step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No date chosen
    #[error("Please select a date")]
    MissingDate,

    /// Date lies before today in venue time
    #[error("Bookings cannot be made for past dates")]
    DateInPast,

    /// No shift chosen
    #[error("Please select a shift")]
    MissingShift,

    /// Shift has already ended, or is not offered on the date
    #[error("The {0} shift is not available for the selected date")]
    ShiftUnavailable(Shift),

    /// No slot reservation held by this session
    #[error("Please select a time slot")]
    NoSlotHeld,

    /// Guest details failed validation
    #[error(transparent)]
    InvalidGuest(#[from] GuestError),

    /// The phone belongs to a registered account
    #[error("This phone number is registered. Please log in to book")]
    PhoneRegistered,

    /// Payment was confirmed without a payment identifier
    #[error("Please enter the payment reference")]
    MissingPaymentId,

    /// Verify pressed with an empty code
    #[error("Please enter the verification code")]
    MissingOtp,

    /// Verify pressed after the countdown ran out
    #[error("The verification code has expired. Please request a new one")]
    OtpExpired,

    /// OTP resend requested before the countdown finished
    #[error("Please wait {0} seconds before requesting a new code")]
    ResendTooSoon(u32),

    /// A request of the same kind is already waiting on the server
    #[error("Request already in progress")]
    RequestInFlight,

    /// Command only makes sense on another step
    #[error("Only possible on {expected} (currently on {actual})")]
    WrongStep {
        /// Step the command belongs to
        expected: Step,
        /// Step the wizard is on
        actual: Step,
    },

    /// The event has no meaning in the current step
    #[error("Cannot {event} from {from}")]
    IllegalTransition {
        /// Step the wizard was on
        from: Step,
        /// Event that was refused
        event: StepEvent,
    },
}
