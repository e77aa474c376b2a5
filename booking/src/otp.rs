//! One-time code entry and its resend countdown.
//!
//! Every issued code starts a new generation. Countdown ticks are scheduled
//! one second apart and carry the generation they belong to, so ticks left
//! over from a previous code are ignored instead of speeding up the count.

use serde::{Deserialize, Serialize};

/// State of the code entry on the verification step
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpState {
    /// Code as typed by the guest
    pub code: String,
    /// Seconds left before a resend is allowed
    pub countdown_seconds: u32,
    /// Incremented on every issue
    pub generation: u64,
}

impl OtpState {
    /// A code was just issued; clears the input and restarts the countdown.
    ///
    /// Returns the generation the countdown ticks must carry.
    pub fn start(&mut self, seconds: u32) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.code.clear();
        self.countdown_seconds = seconds;
        self.generation
    }

    /// Apply one tick.
    ///
    /// Returns `true` when the tick belonged to the current generation and
    /// the countdown is still running afterwards, meaning another tick should
    /// be scheduled.
    pub fn tick(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.countdown_seconds == 0 {
            return false;
        }
        self.countdown_seconds -= 1;
        self.countdown_seconds > 0
    }

    /// Resend is offered only after the countdown reaches zero
    #[must_use]
    pub const fn can_resend(&self) -> bool {
        self.countdown_seconds == 0
    }

    /// Verify is offered while the countdown runs
    #[must_use]
    pub const fn can_verify(&self) -> bool {
        self.countdown_seconds > 0
    }

    /// Forget the code and stop the countdown; outstanding ticks become stale
    pub fn clear(&mut self) {
        self.code.clear();
        self.countdown_seconds = 0;
        self.generation = self.generation.wrapping_add(1);
    }
}
