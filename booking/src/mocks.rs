//! In-process stand-in for the booking backend.
//!
//! [`SimulatedBackend`] keeps the server side of the slot soft-lock
//! protocol in memory: reservations are atomic and owned by the client that
//! made them, so several wizard sessions can race for one slot the same way
//! browsers race against the real server. Each [`SimulatedApi`] handed out
//! by [`SimulatedBackend::client`] is one such session.
//!
//! Used by the tests and the demo binary. Not meant for production.

use crate::api::{BookingApi, ReserveOutcome};
use crate::error::{ApiError, ApiResult};
use crate::pricing::{PriceQuote, SpecialPrice, resolve};
use crate::types::{
    Booking, BookingId, BookingStatus, FutsalId, Money, NewBooking, Shift, Slot, SlotId, SlotStatus,
    TrackingCode,
};
use chrono::{Duration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hourly rate used when a futsal has none configured
pub const DEFAULT_RATE: Money = Money::new(1500);

/// Backend operations, for call logs and scripted failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_slots`
    ListSlots,
    /// `slot_status`
    SlotStatus,
    /// `reserve_slot`
    Reserve,
    /// `release_slot`
    Release,
    /// `price_quote`
    PriceQuote,
    /// `special_prices`
    SpecialPrices,
    /// `is_registered`
    IsRegistered,
    /// `is_otp_verified`
    IsOtpVerified,
    /// `generate_otp`
    GenerateOtp,
    /// `verify_otp`
    VerifyOtp,
    /// `create_booking`
    CreateBooking,
    /// `cancel_booking`
    CancelBooking,
}

#[derive(Debug)]
struct SlotRecord {
    futsal_id: FutsalId,
    date: NaiveDate,
    slot: Slot,
    holder: Option<u64>,
}

#[derive(Debug)]
struct Backend {
    listings: HashMap<(FutsalId, NaiveDate, Shift), Vec<SlotId>>,
    slots: HashMap<SlotId, SlotRecord>,
    rates: HashMap<FutsalId, Money>,
    special_prices: HashMap<FutsalId, Vec<SpecialPrice>>,
    registered: HashSet<String>,
    verified: HashSet<String>,
    otps: HashMap<String, String>,
    echo_otp: bool,
    bookings: HashMap<TrackingCode, Booking>,
    next_slot_id: u64,
    next_booking_id: u64,
    failures: HashMap<Operation, u32>,
    calls: Vec<Operation>,
    rng: StdRng,
}

impl Backend {
    fn new() -> Self {
        Self {
            listings: HashMap::new(),
            slots: HashMap::new(),
            rates: HashMap::new(),
            special_prices: HashMap::new(),
            registered: HashSet::new(),
            verified: HashSet::new(),
            otps: HashMap::new(),
            echo_otp: true,
            bookings: HashMap::new(),
            next_slot_id: 100,
            next_booking_id: 1,
            failures: HashMap::new(),
            calls: Vec::new(),
            rng: StdRng::seed_from_u64(7),
        }
    }

    fn record(&mut self, operation: Operation) -> ApiResult<()> {
        self.calls.push(operation);
        match self.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ApiError::Transport("simulated network failure".to_string()))
            },
            _ => Ok(()),
        }
    }

    fn slot_mut(&mut self, slot_id: SlotId) -> ApiResult<&mut SlotRecord> {
        self.slots.get_mut(&slot_id).ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("Time slot {slot_id} not found"),
        })
    }

    fn rate(&self, futsal_id: FutsalId) -> Money {
        self.rates.get(&futsal_id).copied().unwrap_or(DEFAULT_RATE)
    }

    fn quote(&self, futsal_id: FutsalId, date: NaiveDate, start_time: Option<NaiveTime>) -> PriceQuote {
        let rules = self
            .special_prices
            .get(&futsal_id)
            .map_or(&[][..], Vec::as_slice);
        resolve(self.rate(futsal_id), date, start_time, rules)
    }
}

/// Shared in-memory backend
#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Mutex<Backend>>,
    next_client: Arc<AtomicU64>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// Empty backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Backend::new())),
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A new session talking to this backend
    #[must_use]
    pub fn client(&self) -> SimulatedApi {
        SimulatedApi {
            backend: self.clone(),
            client_id: self.next_client.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Add an available slot to a listing
    pub fn add_slot(
        &self,
        futsal_id: FutsalId,
        date: NaiveDate,
        shift: Shift,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> SlotId {
        let mut backend = self.lock();
        let slot_id = SlotId::new(backend.next_slot_id);
        backend.next_slot_id += 1;
        backend.slots.insert(
            slot_id,
            SlotRecord {
                futsal_id,
                date,
                slot: Slot {
                    slot_id,
                    start_time,
                    end_time,
                    shift_category: shift,
                    status: SlotStatus::Available,
                },
                holder: None,
            },
        );
        backend
            .listings
            .entry((futsal_id, date, shift))
            .or_default()
            .push(slot_id);
        slot_id
    }

    /// Fill a shift with back-to-back two-hour slots
    pub fn seed_shift(&self, futsal_id: FutsalId, date: NaiveDate, shift: Shift) -> Vec<SlotId> {
        let (start, end) = shift.window();
        let mut slot_ids = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let next = cursor + Duration::hours(2);
            slot_ids.push(self.add_slot(futsal_id, date, shift, cursor, next));
            cursor = next;
        }
        slot_ids
    }

    /// Base hourly rate for a futsal
    pub fn set_rate(&self, futsal_id: FutsalId, rate: Money) {
        self.lock().rates.insert(futsal_id, rate);
    }

    /// Add a special-price rule
    pub fn add_special_price(&self, futsal_id: FutsalId, rule: SpecialPrice) {
        self.lock().special_prices.entry(futsal_id).or_default().push(rule);
    }

    /// Mark a phone as belonging to an account
    pub fn register_phone(&self, phone: &str) {
        self.lock().registered.insert(phone.to_string());
    }

    /// Mark a phone as already verified
    pub fn mark_verified(&self, phone: &str) {
        self.lock().verified.insert(phone.to_string());
    }

    /// Whether generated codes are echoed back to the caller
    pub fn echo_otp(&self, echo: bool) {
        self.lock().echo_otp = echo;
    }

    /// Code most recently sent to `phone`
    #[must_use]
    pub fn otp_for(&self, phone: &str) -> Option<String> {
        self.lock().otps.get(phone).cloned()
    }

    /// Overwrite a slot's status, dropping any hold
    pub fn force_status(&self, slot_id: SlotId, status: SlotStatus) {
        if let Some(record) = self.lock().slots.get_mut(&slot_id) {
            record.slot.status = status;
            record.holder = None;
        }
    }

    /// Current server-side status of a slot
    #[must_use]
    pub fn status_of(&self, slot_id: SlotId) -> Option<SlotStatus> {
        self.lock().slots.get(&slot_id).map(|record| record.slot.status)
    }

    /// Client currently holding a slot
    #[must_use]
    pub fn holder_of(&self, slot_id: SlotId) -> Option<u64> {
        self.lock().slots.get(&slot_id).and_then(|record| record.holder)
    }

    /// Fail the next `times` calls of `operation` with a transport error
    pub fn fail_next(&self, operation: Operation, times: u32) {
        *self.lock().failures.entry(operation).or_default() += times;
    }

    /// Every operation received, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.clone()
    }

    /// How often `operation` was called
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.lock().calls.iter().filter(|call| **call == operation).count()
    }

    /// Booking by tracking code
    #[must_use]
    pub fn booking(&self, tracking_code: &TrackingCode) -> Option<Booking> {
        self.lock().bookings.get(tracking_code).cloned()
    }

    /// Number of bookings created
    #[must_use]
    pub fn booking_count(&self) -> usize {
        self.lock().bookings.len()
    }
}

/// One session's view of a [`SimulatedBackend`]
#[derive(Clone)]
pub struct SimulatedApi {
    backend: SimulatedBackend,
    client_id: u64,
}

impl SimulatedApi {
    /// Identifier the backend uses as this session's hold owner
    #[must_use]
    pub const fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Backend this session talks to
    #[must_use]
    pub const fn backend(&self) -> &SimulatedBackend {
        &self.backend
    }

    async fn call<T>(
        &self,
        operation: Operation,
        handle: impl FnOnce(&mut Backend, u64) -> ApiResult<T>,
    ) -> ApiResult<T> {
        // Let concurrently running sessions interleave between requests
        tokio::task::yield_now().await;
        let mut backend = self.backend.lock();
        backend.record(operation)?;
        handle(&mut backend, self.client_id)
    }
}

impl BookingApi for SimulatedApi {
    async fn list_slots(&self, futsal_id: FutsalId, date: NaiveDate, shift: Shift) -> ApiResult<Vec<Slot>> {
        self.call(Operation::ListSlots, |backend, _| {
            let ids = backend
                .listings
                .get(&(futsal_id, date, shift))
                .cloned()
                .unwrap_or_default();
            Ok(ids
                .iter()
                .filter_map(|slot_id| backend.slots.get(slot_id))
                .map(|record| record.slot.clone())
                .collect())
        })
        .await
    }

    async fn slot_status(&self, slot_id: SlotId) -> ApiResult<SlotStatus> {
        self.call(Operation::SlotStatus, |backend, _| {
            Ok(backend.slot_mut(slot_id)?.slot.status)
        })
        .await
    }

    async fn reserve_slot(&self, slot_id: SlotId) -> ApiResult<ReserveOutcome> {
        self.call(Operation::Reserve, |backend, client| {
            let record = backend.slot_mut(slot_id)?;
            if record.slot.status == SlotStatus::Available {
                record.slot.status = SlotStatus::Pending;
                record.holder = Some(client);
                return Ok(ReserveOutcome::Reserved);
            }
            Ok(ReserveOutcome::Rejected {
                status: Some(record.slot.status),
                message: Some(format!("Slot is {}", record.slot.status)),
            })
        })
        .await
    }

    async fn release_slot(&self, slot_id: SlotId) -> ApiResult<()> {
        self.call(Operation::Release, |backend, client| {
            let record = backend.slot_mut(slot_id)?;
            if record.slot.status == SlotStatus::Pending && record.holder == Some(client) {
                record.slot.status = SlotStatus::Available;
                record.holder = None;
            }
            Ok(())
        })
        .await
    }

    async fn price_quote(
        &self,
        futsal_id: FutsalId,
        date: NaiveDate,
        start_time: Option<NaiveTime>,
    ) -> ApiResult<PriceQuote> {
        self.call(Operation::PriceQuote, |backend, _| {
            Ok(backend.quote(futsal_id, date, start_time))
        })
        .await
    }

    async fn special_prices(&self, futsal_id: FutsalId) -> ApiResult<Vec<SpecialPrice>> {
        self.call(Operation::SpecialPrices, |backend, _| {
            Ok(backend.special_prices.get(&futsal_id).cloned().unwrap_or_default())
        })
        .await
    }

    async fn is_registered(&self, phone: &str) -> ApiResult<bool> {
        self.call(Operation::IsRegistered, |backend, _| Ok(backend.registered.contains(phone)))
            .await
    }

    async fn is_otp_verified(&self, phone: &str) -> ApiResult<bool> {
        self.call(Operation::IsOtpVerified, |backend, _| Ok(backend.verified.contains(phone)))
            .await
    }

    async fn generate_otp(&self, phone: &str) -> ApiResult<Option<String>> {
        self.call(Operation::GenerateOtp, |backend, _| {
            let code = format!("{:06}", backend.rng.gen_range(0..1_000_000));
            backend.otps.insert(phone.to_string(), code.clone());
            Ok(backend.echo_otp.then_some(code))
        })
        .await
    }

    async fn verify_otp(&self, phone: &str, code: &str) -> ApiResult<bool> {
        self.call(Operation::VerifyOtp, |backend, _| {
            if backend.otps.get(phone).is_some_and(|expected| expected == code) {
                backend.otps.remove(phone);
                backend.verified.insert(phone.to_string());
                return Ok(true);
            }
            Ok(false)
        })
        .await
    }

    async fn create_booking(&self, request: NewBooking) -> ApiResult<Booking> {
        self.call(Operation::CreateBooking, |backend, client| {
            let record = backend.slot_mut(request.slot_id)?;
            if record.slot.status != SlotStatus::Pending || record.holder != Some(client) {
                return Err(ApiError::Status {
                    status: 409,
                    message: "Slot is not reserved for this booking".to_string(),
                });
            }
            if record.futsal_id != request.futsal_id || record.date != request.booking_date {
                return Err(ApiError::Status {
                    status: 400,
                    message: "Slot does not belong to this futsal and date".to_string(),
                });
            }
            record.slot.status = SlotStatus::Booked;
            record.holder = None;
            let (start_time, end_time) = (record.slot.start_time, record.slot.end_time);

            let price_per_hour = backend
                .quote(request.futsal_id, request.booking_date, Some(start_time))
                .effective_price;
            let tracking_code = TrackingCode::generate(&mut backend.rng);
            let id = BookingId::new(backend.next_booking_id);
            backend.next_booking_id += 1;

            let booking = Booking {
                id,
                tracking_code: tracking_code.clone(),
                futsal_id: request.futsal_id,
                slot_id: request.slot_id,
                booking_date: request.booking_date,
                start_time,
                end_time,
                price_per_hour,
                amount_paid: request.amount_paid,
                payment_id: request.payment_id,
                name: request.name,
                phone: request.phone,
                number_of_players: request.number_of_players,
                team_name: request.team_name,
                status: BookingStatus::Confirmed,
                created_at: None,
            };
            backend.bookings.insert(tracking_code, booking.clone());
            Ok(booking)
        })
        .await
    }

    async fn cancel_booking(&self, tracking_code: &TrackingCode) -> ApiResult<()> {
        self.call(Operation::CancelBooking, |backend, _| {
            let Some(booking) = backend.bookings.get_mut(tracking_code) else {
                return Err(ApiError::Status {
                    status: 404,
                    message: "Booking not found".to_string(),
                });
            };
            booking.status = BookingStatus::Cancelled;
            let slot_id = booking.slot_id;
            if let Some(record) = backend.slots.get_mut(&slot_id) {
                record.slot.status = SlotStatus::Available;
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_reservation_belongs_to_its_client() {
        let backend = SimulatedBackend::new();
        let slots = backend.seed_shift(FutsalId::new(1), date(), Shift::Evening);
        let (alice, bob) = (backend.client(), backend.client());

        assert!(alice.reserve_slot(slots[0]).await.unwrap().is_reserved());
        let second = bob.reserve_slot(slots[0]).await.unwrap();
        assert_eq!(
            second,
            ReserveOutcome::Rejected {
                status: Some(SlotStatus::Pending),
                message: Some("Slot is pending".to_string()),
            }
        );

        // Only the holder can hand it back
        bob.release_slot(slots[0]).await.unwrap();
        assert_eq!(backend.holder_of(slots[0]), Some(alice.client_id()));
        alice.release_slot(slots[0]).await.unwrap();
        assert_eq!(backend.status_of(slots[0]), Some(SlotStatus::Available));
    }

    #[tokio::test]
    async fn test_evening_shift_is_seeded_with_two_slots() {
        let backend = SimulatedBackend::new();
        backend.seed_shift(FutsalId::new(1), date(), Shift::Evening);
        let listed = backend
            .client()
            .list_slots(FutsalId::new(1), date(), Shift::Evening)
            .await
            .unwrap();
        let labels: Vec<String> = listed.iter().map(Slot::label).collect();
        assert_eq!(labels, ["14:00 - 16:00", "16:00 - 18:00"]);
    }

    #[tokio::test]
    async fn test_scripted_failure_hits_once() {
        let backend = SimulatedBackend::new();
        let api = backend.client();
        backend.fail_next(Operation::IsRegistered, 1);

        assert!(matches!(
            api.is_registered("9812345678").await,
            Err(ApiError::Transport(_))
        ));
        assert!(!api.is_registered("9812345678").await.unwrap());
        assert_eq!(backend.count(Operation::IsRegistered), 2);
    }

    #[tokio::test]
    async fn test_otp_is_single_use() {
        let backend = SimulatedBackend::new();
        let api = backend.client();
        let code = api.generate_otp("9812345678").await.unwrap().unwrap();
        assert_eq!(backend.otp_for("9812345678"), Some(code.clone()));

        assert!(!api.verify_otp("9812345678", "000000x").await.unwrap());
        assert!(api.verify_otp("9812345678", &code).await.unwrap());
        assert!(!api.verify_otp("9812345678", &code).await.unwrap());
        assert!(api.is_otp_verified("9812345678").await.unwrap());
    }

    #[tokio::test]
    async fn test_booking_requires_own_hold() {
        let backend = SimulatedBackend::new();
        let slots = backend.seed_shift(FutsalId::new(1), date(), Shift::Evening);
        let api = backend.client();
        let request = NewBooking {
            futsal_id: FutsalId::new(1),
            slot_id: slots[0],
            booking_date: date(),
            name: "Sita".to_string(),
            phone: "9812345678".to_string(),
            number_of_players: 8,
            team_name: None,
            payment_id: "9812345678".to_string(),
            amount_paid: Money::new(100),
        };

        let refused = api.create_booking(request.clone()).await.unwrap_err();
        assert!(refused.is_client_error());

        api.reserve_slot(slots[0]).await.unwrap();
        let booking = api.create_booking(request).await.unwrap();
        assert!(booking.tracking_code.is_well_formed());
        assert_eq!(booking.price_per_hour, DEFAULT_RATE);
        assert_eq!(backend.status_of(slots[0]), Some(SlotStatus::Booked));

        api.cancel_booking(&booking.tracking_code).await.unwrap();
        assert_eq!(
            backend.booking(&booking.tracking_code).unwrap().status,
            BookingStatus::Cancelled
        );
    }
}
