//! Domain types for futsal court booking.
//!
//! Identifiers, money, shifts, slots, guest details and the durable booking
//! record. Slot state is owned by the backend; the types here are the
//! client's mirror of it.

use crate::error::GuestError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted team name
pub const MAX_TEAM_NAME_LEN: usize = 50;

/// Inclusive bounds for the number of players on a booking
pub const PLAYERS_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! server_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend identifier
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// The raw backend identifier
            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

server_id!(
    /// Identifier of a futsal venue
    FutsalId
);
server_id!(
    /// Identifier of a bookable time slot
    SlotId
);
server_id!(
    /// Identifier of a durable booking
    BookingId
);

/// Server-issued code that lets a guest find their booking later
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    /// Length of a well-formed code
    pub const LEN: usize = 8;

    const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Wrap a code as received
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generate a random well-formed code
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..Self::LEN)
            .map(|_| char::from(Self::ALPHABET[rng.gen_range(0..Self::ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Eight characters, each an uppercase ASCII letter or a digit
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// The code as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Amount in whole currency units
///
/// Decodes from integers, decimals (rounded) and numeric strings, since
/// backends disagree on how they render money.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(u64);

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Whole(u64),
            Decimal(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Whole(value) => Ok(Self(value)),
            Raw::Decimal(value) => money_from_decimal(value),
            Raw::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("invalid amount: {text}")))
                .and_then(money_from_decimal),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range checked
fn money_from_decimal<E: serde::de::Error>(value: f64) -> Result<Money, E> {
    if value.is_finite() && (0.0..1e15).contains(&value) {
        Ok(Money(value.round() as u64))
    } else {
        Err(E::custom(format!("invalid amount: {value}")))
    }
}

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// The amount in whole units
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts, stopping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Hourly rate applied to a duration in minutes, rounded down
    #[must_use]
    pub const fn prorate_minutes(self, minutes: u64) -> Self {
        Self(self.0.saturating_mul(minutes) / 60)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rs. {}", self.0)
    }
}

// ============================================================================
// Shifts and slots
// ============================================================================

/// Named block of hours used to group slots for selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shift {
    /// 06:00–10:00
    Morning,
    /// 10:00–14:00
    Day,
    /// 14:00–18:00
    Evening,
    /// 18:00–22:00
    Night,
}

impl Shift {
    /// Every shift, in day order
    pub const ALL: [Self; 4] = [Self::Morning, Self::Day, Self::Evening, Self::Night];

    /// Display/wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "Morning",
            Self::Day => "Day",
            Self::Evening => "Evening",
            Self::Night => "Night",
        }
    }

    /// Half-open `[start, end)` hours covered by the shift
    #[must_use]
    pub fn window(self) -> (NaiveTime, NaiveTime) {
        let (start, end) = match self {
            Self::Morning => (6, 10),
            Self::Day => (10, 14),
            Self::Evening => (14, 18),
            Self::Night => (18, 22),
        };
        (hour(start), hour(end))
    }

    /// Shifts still bookable on `date` when it is `now` in venue time.
    ///
    /// Future dates offer every shift; today drops shifts that have ended;
    /// past dates offer none.
    #[must_use]
    pub fn available_on(date: NaiveDate, now: NaiveDateTime) -> Vec<Self> {
        if date < now.date() {
            return Vec::new();
        }
        Self::ALL
            .into_iter()
            .filter(|shift| date > now.date() || shift.window().1 > now.time())
            .collect()
    }
}

fn hour(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shift {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|shift| shift.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown shift: {s}"))
    }
}

/// Server-authoritative slot status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    /// Free to reserve
    Available,
    /// Soft-locked by some session
    Pending,
    /// Durably booked
    Booked,
    /// Taken out of service by the venue
    Disabled,
}

impl SlotStatus {
    /// Lower-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Booked => "booked",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status shown to the guest; adds `Expired` for slots already started today
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    /// Free to reserve
    Available,
    /// Held by a session
    Pending,
    /// Durably booked
    Booked,
    /// Out of service
    Disabled,
    /// Start time already passed today
    Expired,
}

/// A bookable interval at a venue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identifier
    pub slot_id: SlotId,
    /// Start, venue local time
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    /// End, venue local time
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    /// Shift this slot belongs to
    pub shift_category: Shift,
    /// Status as last read from the server
    pub status: SlotStatus,
}

impl Slot {
    /// Derive the status to display for a slot on `date` when it is `now`
    /// in venue time.
    #[must_use]
    pub fn display_status(&self, date: NaiveDate, now: NaiveDateTime) -> DisplayStatus {
        let started = date < now.date() || (date == now.date() && self.start_time <= now.time());
        match self.status {
            SlotStatus::Booked => DisplayStatus::Booked,
            SlotStatus::Disabled => DisplayStatus::Disabled,
            SlotStatus::Available | SlotStatus::Pending if started => DisplayStatus::Expired,
            SlotStatus::Available => DisplayStatus::Available,
            SlotStatus::Pending => DisplayStatus::Pending,
        }
    }

    /// Length of the slot in minutes
    #[must_use]
    pub fn duration_minutes(&self) -> u64 {
        minutes_between(self.start_time, self.end_time)
    }

    /// `"14:00 - 16:00"`
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Minutes from `start` to `end`, crossing midnight when `end` is not later
pub(crate) fn minutes_between(start: NaiveTime, end: NaiveTime) -> u64 {
    let minutes = (end - start).num_minutes();
    let minutes = if minutes <= 0 { minutes + 24 * 60 } else { minutes };
    u64::try_from(minutes).unwrap_or(0)
}

// ============================================================================
// Guest details
// ============================================================================

/// Contact and party details for a guest (non-account) booking
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDetails {
    /// 10-digit mobile number starting with 9
    pub phone: String,
    /// Guest name
    pub name: String,
    /// Party size
    pub number_of_players: u8,
    /// Optional team name
    pub team_name: Option<String>,
}

impl GuestDetails {
    /// Check every field
    ///
    /// # Errors
    ///
    /// Returns the first [`GuestError`] found, checking phone, name,
    /// player count and team name in that order.
    pub fn validate(&self) -> Result<(), GuestError> {
        if !is_valid_phone(&self.phone) {
            return Err(GuestError::InvalidPhone);
        }
        if self.name.trim().is_empty() {
            return Err(GuestError::MissingName);
        }
        if !PLAYERS_RANGE.contains(&self.number_of_players) {
            return Err(GuestError::PlayersOutOfRange(self.number_of_players));
        }
        if self
            .team_name
            .as_deref()
            .is_some_and(|team| team.trim().chars().count() > MAX_TEAM_NAME_LEN)
        {
            return Err(GuestError::TeamNameTooLong {
                max: MAX_TEAM_NAME_LEN,
            });
        }
        Ok(())
    }
}

/// Ten ASCII digits, the first being `9`
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10 && phone.starts_with('9') && phone.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// Venue and bookings
// ============================================================================

/// The venue a wizard session books against
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutsalContext {
    /// Venue identifier
    pub id: FutsalId,
    /// Display name
    pub name: String,
    /// Base hourly rate
    pub price_per_hour: Money,
}

/// Lifecycle of a durable booking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Advance paid, slot held
    #[default]
    Confirmed,
    /// Played
    Completed,
    /// Cancelled by the guest or the venue
    Cancelled,
}

/// Durable booking record returned by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier
    #[serde(alias = "booking_id")]
    pub id: BookingId,
    /// Guest-facing lookup code
    pub tracking_code: TrackingCode,
    /// Venue
    pub futsal_id: FutsalId,
    /// Booked slot
    pub slot_id: SlotId,
    /// Day of play
    pub booking_date: NaiveDate,
    /// Start, venue local time
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    /// End, venue local time
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    /// Hourly rate decided by the server at booking time
    pub price_per_hour: Money,
    /// Advance collected
    pub amount_paid: Money,
    /// Payment reference supplied by the guest
    pub payment_id: String,
    /// Guest name
    pub name: String,
    /// Guest phone
    pub phone: String,
    /// Party size
    pub number_of_players: u8,
    /// Optional team name
    #[serde(default)]
    pub team_name: Option<String>,
    /// Booking lifecycle
    #[serde(default)]
    pub status: BookingStatus,
    /// Creation time, when the backend reports it
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Full price for the booked interval at the stored rate
    #[must_use]
    pub fn total_price(&self) -> Money {
        self.price_per_hour
            .prorate_minutes(minutes_between(self.start_time, self.end_time))
    }

    /// Amount still owed at the venue
    #[must_use]
    pub fn balance_due(&self) -> Money {
        self.total_price().saturating_sub(self.amount_paid)
    }
}

/// Payload for creating a guest booking from a held reservation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    /// Venue
    pub futsal_id: FutsalId,
    /// Reserved slot to convert
    pub slot_id: SlotId,
    /// Day of play
    pub booking_date: NaiveDate,
    /// Guest name
    pub name: String,
    /// Guest phone
    pub phone: String,
    /// Party size
    pub number_of_players: u8,
    /// Optional team name
    pub team_name: Option<String>,
    /// Payment reference
    pub payment_id: String,
    /// Advance paid
    pub amount_paid: Money,
}

/// `HH:MM[:SS]` wall-clock times as used by the backend
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Parse `HH:MM` or `HH:MM:SS`
    #[must_use]
    pub fn parse(text: &str) -> Option<NaiveTime> {
        let text = text.trim();
        NaiveTime::parse_from_str(text, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .ok()
    }

    /// Serialize as `HH:MM:SS`
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    /// Deserialize from `HH:MM` or `HH:MM:SS`
    ///
    /// # Errors
    ///
    /// Fails when the text is not a wall-clock time.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| serde::de::Error::custom(format!("invalid time: {text}")))
    }

    /// Same format for optional fields
    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize `Some` as `HH:MM:SS`, `None` as null
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        #[allow(clippy::ref_option)] // serde `with` signature
        pub fn serialize<S: Serializer>(
            time: &Option<NaiveTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(time) => super::serialize(time, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional `HH:MM[:SS]`
        ///
        /// # Errors
        ///
        /// Fails when present text is not a wall-clock time.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveTime>, D::Error> {
            let text = Option::<String>::deserialize(deserializer)?;
            match text {
                None => Ok(None),
                Some(text) if text.trim().is_empty() => Ok(None),
                Some(text) => super::parse(&text)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {text}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDate::from_str(date)
            .unwrap()
            .and_time(clock_time::parse(time).unwrap())
    }

    fn slot(start: &str, end: &str, status: SlotStatus) -> Slot {
        Slot {
            slot_id: SlotId::new(1),
            start_time: clock_time::parse(start).unwrap(),
            end_time: clock_time::parse(end).unwrap(),
            shift_category: Shift::Evening,
            status,
        }
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("9812345678"));
        assert!(!is_valid_phone("8812345678"));
        assert!(!is_valid_phone("981234567"));
        assert!(!is_valid_phone("98123456789"));
        assert!(!is_valid_phone("98123a5678"));
    }

    #[test]
    fn test_guest_validation_order() {
        let mut guest = GuestDetails {
            phone: "9812345678".to_string(),
            name: "Sita".to_string(),
            number_of_players: 10,
            team_name: None,
        };
        assert_eq!(guest.validate(), Ok(()));

        guest.number_of_players = 0;
        assert_eq!(guest.validate(), Err(GuestError::PlayersOutOfRange(0)));

        guest.name = "   ".to_string();
        assert_eq!(guest.validate(), Err(GuestError::MissingName));

        guest.phone = "12345".to_string();
        assert_eq!(guest.validate(), Err(GuestError::InvalidPhone));
    }

    #[test]
    fn test_team_name_limit() {
        let guest = GuestDetails {
            phone: "9812345678".to_string(),
            name: "Ram".to_string(),
            number_of_players: 5,
            team_name: Some("x".repeat(MAX_TEAM_NAME_LEN + 1)),
        };
        assert_eq!(
            guest.validate(),
            Err(GuestError::TeamNameTooLong {
                max: MAX_TEAM_NAME_LEN
            })
        );
    }

    #[test]
    fn test_generated_tracking_codes_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(TrackingCode::generate(&mut rng).is_well_formed());
        }
        assert!(!TrackingCode::new("abc12345").is_well_formed());
        assert!(!TrackingCode::new("ABC1234").is_well_formed());
    }

    #[test]
    fn test_expired_only_for_started_slots_today() {
        let now = at("2025-06-01", "14:30");
        let today = now.date();
        let tomorrow = today.succ_opt().unwrap();

        let started = slot("14:00", "16:00", SlotStatus::Available);
        assert_eq!(started.display_status(today, now), DisplayStatus::Expired);
        assert_eq!(started.display_status(tomorrow, now), DisplayStatus::Available);

        let later = slot("16:00", "18:00", SlotStatus::Available);
        assert_eq!(later.display_status(today, now), DisplayStatus::Available);

        let booked = slot("14:00", "16:00", SlotStatus::Booked);
        assert_eq!(booked.display_status(today, now), DisplayStatus::Booked);
    }

    #[test]
    fn test_available_shifts_today_drop_finished_ones() {
        let now = at("2025-06-01", "14:30");
        assert_eq!(
            Shift::available_on(now.date(), now),
            vec![Shift::Evening, Shift::Night]
        );
        assert_eq!(
            Shift::available_on(now.date().succ_opt().unwrap(), now),
            Shift::ALL.to_vec()
        );
        assert!(Shift::available_on(now.date().pred_opt().unwrap(), now).is_empty());
    }

    #[test]
    fn test_shift_parse_is_case_insensitive() {
        assert_eq!("evening".parse::<Shift>(), Ok(Shift::Evening));
        assert_eq!(" NIGHT ".parse::<Shift>(), Ok(Shift::Night));
        assert!("afternoon".parse::<Shift>().is_err());
    }

    #[test]
    fn test_slot_wire_format() {
        let json = r#"{"slot_id":42,"start_time":"14:00","end_time":"16:00:00","shift_category":"Evening","status":"pending"}"#;
        let parsed: Slot = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.slot_id, SlotId::new(42));
        assert_eq!(parsed.status, SlotStatus::Pending);
        assert_eq!(parsed.duration_minutes(), 120);
        assert_eq!(parsed.label(), "14:00 - 16:00");

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["start_time"], "14:00:00");
    }

    #[test]
    fn test_money_accepts_backend_renderings() {
        let parsed: Vec<Money> = serde_json::from_str(r#"[1500, 1500.4, "1500.00"]"#).unwrap();
        assert_eq!(parsed, vec![Money::new(1500); 3]);
        assert!(serde_json::from_str::<Money>("-5").is_err());
        assert!(serde_json::from_str::<Money>(r#""free""#).is_err());
    }

    #[test]
    fn test_booking_balance() {
        let booking = Booking {
            id: BookingId::new(1),
            tracking_code: TrackingCode::new("AB12CD34"),
            futsal_id: FutsalId::new(3),
            slot_id: SlotId::new(42),
            booking_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            start_time: clock_time::parse("14:00").unwrap(),
            end_time: clock_time::parse("16:00").unwrap(),
            price_per_hour: Money::new(1500),
            amount_paid: Money::new(100),
            payment_id: "9812345678".to_string(),
            name: "Sita".to_string(),
            phone: "9812345678".to_string(),
            number_of_players: 8,
            team_name: None,
            status: BookingStatus::Confirmed,
            created_at: None,
        };
        assert_eq!(booking.total_price(), Money::new(3000));
        assert_eq!(booking.balance_due(), Money::new(2900));
    }
}
