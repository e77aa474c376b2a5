//! Configuration management for the booking wizard.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::types::Money;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Advance collected at booking time unless configured otherwise
pub const DEFAULT_ADVANCE_AMOUNT: u64 = 100;

/// Seconds before a fresh one-time code may be re-requested
pub const DEFAULT_OTP_RESEND_SECONDS: u32 = 60;

/// Venue local time offset (UTC+05:45)
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 345;

/// Configuration for the booking wizard, loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Backend origin; REST calls go to `{api_url}/api`
    pub api_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Directory holding persisted wizard progress (one file per futsal)
    pub progress_dir: PathBuf,
    /// Offset of venue local time from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// Fixed advance payment
    pub advance_amount: Money,
    /// OTP resend countdown in seconds
    pub otp_resend_seconds: u32,
}

impl BookingConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:5000".to_string()),
            request_timeout_secs: env::var("BOOKING_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            progress_dir: env::var("BOOKING_PROGRESS_DIR")
                .map_or_else(|_| PathBuf::from(".booking-progress"), PathBuf::from),
            utc_offset_minutes: env::var("BOOKING_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_UTC_OFFSET_MINUTES),
            advance_amount: Money::new(
                env::var("BOOKING_ADVANCE_AMOUNT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_ADVANCE_AMOUNT),
            ),
            otp_resend_seconds: env::var("BOOKING_OTP_RESEND_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_OTP_RESEND_SECONDS),
        }
    }

    /// REST base path (`{api_url}/api`)
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}/api", self.api_url.trim_end_matches('/'))
    }

    /// Request timeout as a `Duration`
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Venue time zone; an out-of-range offset falls back to UTC
    #[must_use]
    pub fn venue_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 15,
            progress_dir: PathBuf::from(".booking-progress"),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            advance_amount: Money::new(DEFAULT_ADVANCE_AMOUNT),
            otp_resend_seconds: DEFAULT_OTP_RESEND_SECONDS,
        }
    }
}
