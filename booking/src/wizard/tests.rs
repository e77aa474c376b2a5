//! Reducer tests for the booking wizard.
//!
//! Effects are only inspected here, never run; the flows against a backend
//! live in `tests/booking_flow.rs`.

#![allow(clippy::unwrap_used)] // Test code

use super::*;
use crate::api::ReserveOutcome;
use crate::config::BookingConfig;
use crate::error::{GuestError, Rejection};
use crate::machine::{Route, Step};
use crate::mocks::{SimulatedApi, SimulatedBackend};
use crate::pricing::{AppliedRule, PriceQuote, RuleKind};
use crate::progress::{BookingProgress, MemoryProgressStore};
use crate::types::{
    Booking, BookingId, BookingStatus, FutsalContext, FutsalId, GuestDetails, Money, Shift, Slot, SlotId,
    SlotStatus, TrackingCode,
};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use futsal_core::effect::Effect;
use futsal_testing::{FixedClock, ReducerTest, assertions};
use std::sync::Arc;

type Env = BookingEnvironment<SimulatedApi, MemoryProgressStore>;

fn reducer() -> BookingReducer<SimulatedApi, MemoryProgressStore> {
    BookingReducer::new()
}

/// 2025-06-01 15:00 at the venue (UTC+05:45)
fn env() -> Env {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 15, 0).unwrap());
    BookingEnvironment::new(
        SimulatedBackend::new().client(),
        MemoryProgressStore::new(),
        Arc::new(clock),
        BookingConfig::default(),
    )
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

fn tomorrow() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

fn futsal() -> FutsalContext {
    FutsalContext {
        id: FutsalId::new(1),
        name: "Kathmandu Futsal Arena".to_string(),
        price_per_hour: Money::new(1500),
    }
}

fn slot(id: u64, start_hour: u32, status: SlotStatus) -> Slot {
    Slot {
        slot_id: SlotId::new(id),
        start_time: NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(start_hour + 2, 0, 0).unwrap(),
        shift_category: Shift::Evening,
        status,
    }
}

fn guest() -> GuestDetails {
    GuestDetails {
        phone: "9812345678".to_string(),
        name: "Sita".to_string(),
        number_of_players: 8,
        team_name: Some("Thunder FC".to_string()),
    }
}

fn at_step(step: Step) -> BookingState {
    BookingState::new(
        futsal(),
        BookingProgress {
            step,
            ..BookingProgress::default()
        },
    )
}

/// Step 3 on `date`, evening listing loaded
fn at_slot_step(date: NaiveDate) -> BookingState {
    let progress = BookingProgress {
        step: Step::SelectSlotAndDetails,
        selected_date: Some(date),
        selected_shift: Some(Shift::Evening),
        ..BookingProgress::default()
    };
    let mut state = BookingState::new(futsal(), progress);
    state.slots.load(
        date,
        Shift::Evening,
        vec![
            slot(1, 14, SlotStatus::Available),
            slot(2, 16, SlotStatus::Available),
            slot(3, 16, SlotStatus::Booked),
        ],
    );
    state
}

/// Step 3 tomorrow, holding slot 1, valid guest
fn holding_slot() -> BookingState {
    let mut state = at_slot_step(tomorrow());
    state.progress.selected_slot_ids = vec![SlotId::new(1)];
    state.slots.set_status(SlotId::new(1), SlotStatus::Pending);
    state.progress.set_guest(guest());
    state
}

fn booking() -> Booking {
    Booking {
        id: BookingId::new(7),
        tracking_code: TrackingCode::new("AB12CD34"),
        futsal_id: FutsalId::new(1),
        slot_id: SlotId::new(1),
        booking_date: tomorrow(),
        start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        price_per_hour: Money::new(1500),
        amount_paid: Money::new(100),
        payment_id: "9812345678".to_string(),
        name: "Sita".to_string(),
        phone: "9812345678".to_string(),
        number_of_players: 8,
        team_name: None,
        status: BookingStatus::Confirmed,
        created_at: None,
    }
}

/// Date-wide rule quoted by the server
fn date_offer() -> PriceQuote {
    PriceQuote {
        normal_price: Money::new(1500),
        effective_price: Money::new(1200),
        applied_rule: Some(AppliedRule {
            kind: RuleKind::Date,
            price: Money::new(1200),
            message: Some("Dashain offer".to_string()),
        }),
    }
}

fn last_message(state: &BookingState) -> String {
    state
        .notifications
        .last()
        .map(|notification| notification.message.clone())
        .unwrap_or_default()
}

// ========== Steps 1-2 ==========

#[test]
fn test_past_date_is_rejected() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::SelectDate {
            date: NaiveDate::from_ymd_opt(2025, 5, 31).unwrap(),
        })
        .then_state(|state| {
            assert_eq!(state.last_rejection, Some(Rejection::DateInPast));
            assert_eq!(state.progress.selected_date, None);
            assert_eq!(state.step(), Step::SelectDate);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_today_offers_only_shifts_that_have_not_ended() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::SelectDate { date: today() })
        .when_action(BookingAction::ConfirmDate)
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectShift);
            assert_eq!(state.progress.available_shifts, [Shift::Evening, Shift::Night]);
        })
        .then_effects(|effects| assertions::assert_effects_count(effects, 1))
        .run();
}

#[test]
fn test_ended_shift_cannot_be_selected() {
    let mut state = at_step(Step::SelectShift);
    state.progress.selected_date = Some(today());

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::SelectShift {
            shift: Shift::Morning,
        })
        .then_state(|state| {
            assert_eq!(
                state.last_rejection,
                Some(Rejection::ShiftUnavailable(Shift::Morning))
            );
            assert_eq!(state.progress.selected_shift, None);
        })
        .run();
}

#[test]
fn test_changing_date_drops_a_shift_that_is_over() {
    let mut state = at_step(Step::SelectDate);
    state.progress.selected_date = Some(tomorrow());
    state.progress.selected_shift = Some(Shift::Day);

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::SelectDate { date: today() })
        .then_state(|state| {
            assert_eq!(state.progress.selected_date, Some(today()));
            assert_eq!(state.progress.selected_shift, None);
        })
        .run();
}

#[test]
fn test_select_date_only_on_first_step() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectShift))
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .then_state(|state| {
            assert_eq!(
                state.last_rejection,
                Some(Rejection::WrongStep {
                    expected: Step::SelectDate,
                    actual: Step::SelectShift,
                })
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_choosing_a_date_asks_for_a_rate_preview() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .then_state(|state| {
            assert_eq!(state.progress.selected_date, Some(tomorrow()));
            assert!(state.date_quote.is_none());
            assert!(state.notifications.is_empty());
        })
        // Rate preview plus snapshot write
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 2);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_date_rule_is_announced_before_any_slot_is_held() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .when_action(BookingAction::DatePriced {
            date: tomorrow(),
            quote: date_offer(),
        })
        .when_action(BookingAction::DatePriced {
            date: tomorrow(),
            quote: date_offer(),
        })
        .then_state(|state| {
            assert!(!state.holds_slot());
            assert_eq!(state.date_quote, Some(date_offer()));
            assert_eq!(state.notifications.len(), 1);
            assert_eq!(state.notifications[0].kind, NotificationKind::Info);
            assert!(last_message(state).starts_with("Dashain offer"));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_same_date_is_not_previewed_twice() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .when_action(BookingAction::DatePriced {
            date: tomorrow(),
            quote: date_offer(),
        })
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .then_state(|state| assert_eq!(state.date_quote, Some(date_offer())))
        // Snapshot write only
        .then_effects(|effects| assertions::assert_effects_count(effects, 1))
        .run();
}

#[test]
fn test_preview_for_a_previous_date_is_ignored() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .when_action(BookingAction::SelectDate { date: today() })
        .when_action(BookingAction::DatePriced {
            date: tomorrow(),
            quote: date_offer(),
        })
        .then_state(|state| {
            assert_eq!(state.progress.selected_date, Some(today()));
            assert!(state.date_quote.is_none());
            assert!(state.notifications.is_empty());
        })
        .run();
}

#[test]
fn test_confirm_shift_lists_slots_for_the_new_scope() {
    let mut state = at_step(Step::SelectShift);
    state.progress.selected_date = Some(tomorrow());

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::SelectShift {
            shift: Shift::Evening,
        })
        .when_action(BookingAction::ConfirmShift)
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
            assert_eq!(state.slots.scope(), Some((tomorrow(), Shift::Evening)));
            assert!(state.slots.is_stale());
        })
        // Listing request plus snapshot write
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 2);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_listing_for_an_old_scope_is_ignored() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::SlotsLoaded {
            date: tomorrow(),
            shift: Shift::Night,
            slots: Vec::new(),
        })
        .then_state(|state| assert_eq!(state.slots.slots().len(), 3))
        .then_effects(assertions::assert_no_effects)
        .run();
}

// ========== Step 3: reservation ==========

#[test]
fn test_selecting_a_slot_reserves_it_optimistically() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .then_state(|state| {
            assert_eq!(state.progress.selected_slot(), Some(SlotId::new(1)));
            assert_eq!(
                state.slots.get(SlotId::new(1)).unwrap().status,
                SlotStatus::Pending
            );
            assert!(state.in_flight.contains(Request::Reserve));
        })
        .then_effects(|effects| assertions::assert_has_sequential_effect(effects, 1))
        .run();
}

#[test]
fn test_switching_slots_releases_before_reserving() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(2),
        })
        .then_state(|state| {
            assert_eq!(state.progress.selected_slot_ids, [SlotId::new(2)]);
            assert_eq!(
                state.slots.get(SlotId::new(1)).unwrap().status,
                SlotStatus::Available
            );
        })
        .then_effects(|effects| assertions::assert_has_sequential_effect(effects, 2))
        .run();
}

#[test]
fn test_pressing_the_held_slot_releases_it() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .then_state(|state| {
            assert!(!state.holds_slot());
            assert!(state.quote.is_none());
        })
        .then_effects(|effects| assertions::assert_effects_count(effects, 2))
        .run();
}

#[test]
fn test_started_slot_cannot_be_selected() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(today()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .then_state(|state| {
            assert!(!state.holds_slot());
            assert!(last_message(state).contains("already started"));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_booked_slot_cannot_be_selected() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(3),
        })
        .then_state(|state| {
            assert!(!state.holds_slot());
            assert_eq!(
                last_message(state),
                "Slot already booked. Please choose another time slot."
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_stale_listing_leaves_the_decision_to_the_server() {
    let mut state = at_slot_step(tomorrow());
    state.slots.mark_stale();

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(3),
        })
        .then_state(|state| {
            assert_eq!(state.progress.selected_slot(), Some(SlotId::new(3)));
            assert!(state.in_flight.contains(Request::Reserve));
            assert!(state.notifications.is_empty());
        })
        .then_effects(|effects| assertions::assert_has_sequential_effect(effects, 1))
        .run();

    let mut state = at_slot_step(tomorrow());
    state.slots.mark_stale();

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(3),
        })
        .when_action(BookingAction::ReserveAnswered {
            slot_id: SlotId::new(3),
            outcome: ReserveOutcome::Reserved,
        })
        .then_state(|state| {
            assert!(state.holds_slot());
            assert_eq!(
                state.slots.get(SlotId::new(3)).unwrap().status,
                SlotStatus::Pending
            );
            assert!(state.in_flight.is_empty());
        })
        .run();
}

#[test]
fn test_second_toggle_waits_for_the_first_reservation() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(2),
        })
        .then_state(|state| {
            assert_eq!(state.last_rejection, Some(Rejection::RequestInFlight));
            assert_eq!(state.progress.selected_slot_ids, [SlotId::new(1)]);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_submit_waits_for_the_pending_reservation() {
    let mut state = at_slot_step(tomorrow());
    state.progress.set_guest(guest());

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .when_action(BookingAction::SubmitDetails)
        .then_state(|state| {
            assert_eq!(state.last_rejection, Some(Rejection::RequestInFlight));
            assert_eq!(state.progress.selected_slot(), Some(SlotId::new(1)));
            assert!(state.in_flight.contains(Request::Reserve));
            assert!(!state.in_flight.contains(Request::Submit));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_granted_reservation_fetches_a_quote() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .when_action(BookingAction::ReserveAnswered {
            slot_id: SlotId::new(1),
            outcome: ReserveOutcome::Reserved,
        })
        .then_state(|state| {
            assert!(state.holds_slot());
            assert!(state.in_flight.is_empty());
        })
        .then_effects(|effects| assertions::assert_effects_count(effects, 2))
        .run();
}

#[test]
fn test_rejected_reservation_clears_selection_and_refreshes() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .when_action(BookingAction::ReserveAnswered {
            slot_id: SlotId::new(1),
            outcome: ReserveOutcome::Rejected {
                status: Some(SlotStatus::Booked),
                message: None,
            },
        })
        .then_state(|state| {
            assert!(!state.holds_slot());
            assert_eq!(
                state.slots.get(SlotId::new(1)).unwrap().status,
                SlotStatus::Booked
            );
            assert!(state.slots.is_stale());
            assert_eq!(
                last_message(state),
                "Slot already booked. Please choose another time slot."
            );
        })
        // Fresh listing plus snapshot write
        .then_effects(|effects| assertions::assert_effects_count(effects, 2))
        .run();
}

#[test]
fn test_reservation_landing_after_going_back_is_released() {
    let mut state = at_step(Step::SelectShift);
    state.in_flight.begin(Request::Reserve);

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::ReserveAnswered {
            slot_id: SlotId::new(1),
            outcome: ReserveOutcome::Reserved,
        })
        .then_state(|state| {
            assert!(!state.holds_slot());
            assert!(state.in_flight.is_empty());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_failed_reservation_keeps_the_step() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_slot_step(tomorrow()))
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(1),
        })
        .when_action(BookingAction::RequestFailed {
            request: FailedRequest::Reserve {
                slot_id: SlotId::new(1),
            },
            reason: "Request failed: connection refused".to_string(),
            message: None,
        })
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
            assert!(!state.holds_slot());
            assert!(state.in_flight.is_empty());
            assert_eq!(
                state.notifications.last().unwrap().kind,
                NotificationKind::Error
            );
        })
        .run();
}

#[test]
fn test_special_quote_raises_one_notice() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::PriceQuoted {
            slot_id: SlotId::new(1),
            quote: date_offer(),
        })
        .then_state(|state| {
            assert_eq!(state.quote, Some(date_offer()));
            assert_eq!(state.notifications.len(), 1);
            assert!(last_message(state).starts_with("Dashain offer"));
        })
        .run();
}

#[test]
fn test_slot_quote_does_not_repeat_the_date_notice() {
    let mut state = holding_slot();
    state.date_quote = Some(date_offer());

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::PriceQuoted {
            slot_id: SlotId::new(1),
            quote: date_offer(),
        })
        .then_state(|state| {
            assert_eq!(state.quote, Some(date_offer()));
            assert!(state.notifications.is_empty());
        })
        .run();
}

// ========== Step 3: submission ==========

#[test]
fn test_submit_checks_guest_details_first() {
    let mut state = holding_slot();
    state.progress.phone = "8812345678".to_string();

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::SubmitDetails)
        .then_state(|state| {
            assert_eq!(
                state.last_rejection,
                Some(Rejection::InvalidGuest(GuestError::InvalidPhone))
            );
            assert!(state.in_flight.is_empty());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_submit_without_a_hold_is_refused() {
    let mut state = at_slot_step(tomorrow());
    state.progress.set_guest(guest());

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::SubmitDetails)
        .then_state(|state| assert_eq!(state.last_rejection, Some(Rejection::NoSlotHeld)))
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_valid_submit_starts_the_remote_checks() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .then_state(|state| {
            assert!(state.in_flight.contains(Request::Submit));
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn test_stale_hold_sends_guest_back_to_the_listing() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .when_action(BookingAction::SlotWentStale {
            submission: 1,
            slot_id: SlotId::new(1),
            status: SlotStatus::Booked,
        })
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
            assert!(!state.holds_slot());
            assert!(last_message(state).contains("no longer available"));
        })
        .then_effects(|effects| assertions::assert_effects_count(effects, 2))
        .run();
}

#[test]
fn test_registered_phone_is_refused() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .when_action(BookingAction::PhoneAlreadyRegistered { submission: 1 })
        .then_state(|state| {
            assert_eq!(state.last_rejection, Some(Rejection::PhoneRegistered));
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
            assert!(state.holds_slot());
        })
        .run();
}

#[test]
fn test_unverified_phone_goes_to_otp_with_countdown() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .when_action(BookingAction::DetailsAccepted {
            submission: 1,
            route: Route::VerifyOtp,
        })
        .then_state(|state| {
            assert_eq!(state.step(), Step::VerifyOtp);
            assert_eq!(state.otp.countdown_seconds, 60);
            assert!(state.in_flight.is_empty());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 2);
            assertions::assert_has_delay_effect(effects);
        })
        .run();
}

#[test]
fn test_verified_phone_skips_otp() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .when_action(BookingAction::DetailsAccepted {
            submission: 1,
            route: Route::SkipToPayment,
        })
        .then_state(|state| assert_eq!(state.step(), Step::Payment))
        .run();
}

#[test]
fn test_answer_to_an_abandoned_submission_is_ignored() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .when_action(BookingAction::Back)
        .when_action(BookingAction::ConfirmShift)
        .when_action(BookingAction::SlotsLoaded {
            date: tomorrow(),
            shift: Shift::Evening,
            slots: vec![
                slot(1, 14, SlotStatus::Available),
                slot(2, 16, SlotStatus::Available),
            ],
        })
        .when_action(BookingAction::ToggleSlot {
            slot_id: SlotId::new(2),
        })
        .when_action(BookingAction::ReserveAnswered {
            slot_id: SlotId::new(2),
            outcome: ReserveOutcome::Reserved,
        })
        .when_action(BookingAction::DetailsAccepted {
            submission: 1,
            route: Route::VerifyOtp,
        })
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
            assert_eq!(state.progress.selected_slot(), Some(SlotId::new(2)));
            assert_eq!(state.otp.countdown_seconds, 0);
            assert!(state.in_flight.is_empty());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_failure_of_an_abandoned_submission_is_ignored() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::SubmitDetails)
        .when_action(BookingAction::Back)
        .when_action(BookingAction::RequestFailed {
            request: FailedRequest::Submit { submission: 1 },
            reason: "Request failed: connection reset".to_string(),
            message: None,
        })
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectShift);
            assert!(
                state
                    .notifications
                    .iter()
                    .all(|notification| notification.kind != NotificationKind::Error)
            );
        })
        .run();
}

// ========== Step 4 ==========

fn at_otp_step() -> BookingState {
    let mut state = holding_slot();
    state.progress.step = Step::VerifyOtp;
    state.otp.start(60);
    state
}

#[test]
fn test_ticks_from_an_old_code_are_ignored() {
    let state = at_otp_step();
    let stale = state.otp.generation - 1;

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::OtpTick { generation: stale })
        .then_state(|state| assert_eq!(state.otp.countdown_seconds, 60))
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_current_tick_counts_down_and_reschedules() {
    let state = at_otp_step();
    let generation = state.otp.generation;

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::OtpTick { generation })
        .then_state(|state| assert_eq!(state.otp.countdown_seconds, 59))
        .then_effects(assertions::assert_has_delay_effect)
        .run();
}

#[test]
fn test_verify_needs_a_code() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_otp_step())
        .when_action(BookingAction::VerifyOtp)
        .then_state(|state| assert_eq!(state.last_rejection, Some(Rejection::MissingOtp)))
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_verify_after_countdown_is_refused() {
    let mut state = at_otp_step();
    state.otp.countdown_seconds = 0;

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::EnterOtp {
            code: " 123456 ".to_string(),
        })
        .when_action(BookingAction::VerifyOtp)
        .then_state(|state| {
            assert_eq!(state.otp.code, "123456");
            assert_eq!(state.last_rejection, Some(Rejection::OtpExpired));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_resend_waits_for_the_countdown() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_otp_step())
        .when_action(BookingAction::ResendOtp)
        .then_state(|state| assert_eq!(state.last_rejection, Some(Rejection::ResendTooSoon(60))))
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_refused_code_stays_on_otp_step() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_otp_step())
        .when_action(BookingAction::EnterOtp {
            code: "000000".to_string(),
        })
        .when_action(BookingAction::VerifyOtp)
        .when_action(BookingAction::OtpChecked { accepted: false })
        .then_state(|state| {
            assert_eq!(state.step(), Step::VerifyOtp);
            assert!(state.otp.code.is_empty());
            assert_eq!(
                state.notifications.last().unwrap().kind,
                NotificationKind::Error
            );
        })
        .run();
}

#[test]
fn test_accepted_code_moves_to_payment() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_otp_step())
        .when_action(BookingAction::EnterOtp {
            code: "123456".to_string(),
        })
        .when_action(BookingAction::VerifyOtp)
        .when_action(BookingAction::OtpChecked { accepted: true })
        .then_state(|state| {
            assert_eq!(state.step(), Step::Payment);
            assert_eq!(state.otp.countdown_seconds, 0);
        })
        .run();
}

// ========== Steps 5-7 ==========

fn at_payment_step() -> BookingState {
    let mut state = holding_slot();
    state.progress.step = Step::Payment;
    state
}

#[test]
fn test_payment_needs_a_reference() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_payment_step())
        .when_action(BookingAction::ConfirmPayment)
        .then_state(|state| {
            assert_eq!(state.last_rejection, Some(Rejection::MissingPaymentId));
            assert_eq!(state.step(), Step::Payment);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_confirmed_payment_creates_the_booking() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_payment_step())
        .when_action(BookingAction::SetPaymentId {
            payment_id: "9812345678".to_string(),
        })
        .when_action(BookingAction::ConfirmPayment)
        .then_state(|state| assert!(state.in_flight.contains(Request::Payment)))
        .then_effects(assertions::assert_has_future_effect)
        .run();
}

#[test]
fn test_created_booking_shows_the_tracking_code() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_payment_step())
        .when_action(BookingAction::BookingCreated { booking: booking() })
        .then_state(|state| {
            assert_eq!(state.step(), Step::TrackingCodeDisplay);
            assert_eq!(
                state.progress.generated_tracking_code,
                Some(TrackingCode::new("AB12CD34"))
            );
            assert!(!state.holds_slot());
            let summary = state.summary().unwrap();
            assert_eq!(summary.total, Money::new(3000));
            assert_eq!(summary.balance_due, Money::new(2900));
        })
        .run();
}

#[test]
fn test_failed_payment_keeps_the_step() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_payment_step())
        .when_action(BookingAction::SetPaymentId {
            payment_id: "9812345678".to_string(),
        })
        .when_action(BookingAction::ConfirmPayment)
        .when_action(BookingAction::RequestFailed {
            request: FailedRequest::Payment,
            reason: "API error (status 409): Slot is not reserved".to_string(),
            message: Some("Slot is not reserved".to_string()),
        })
        .then_state(|state| {
            assert_eq!(state.step(), Step::Payment);
            assert!(state.holds_slot());
            assert_eq!(last_message(state), "Slot is not reserved");
        })
        .run();
}

#[test]
fn test_cancelling_a_cancelled_booking_is_a_no_op() {
    let mut state = at_step(Step::Summary);
    let mut cancelled = booking();
    cancelled.status = BookingStatus::Cancelled;
    state.progress.booking = Some(cancelled);

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(state)
        .when_action(BookingAction::CancelBooking)
        .then_state(|state| assert!(state.in_flight.is_empty()))
        .then_effects(assertions::assert_no_effects)
        .run();
}

// ========== Navigation ==========

#[test]
fn test_back_from_slot_step_releases_the_hold() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::Back)
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectShift);
            assert!(!state.holds_slot());
        })
        .then_effects(|effects| assertions::assert_effects_count(effects, 2))
        .run();
}

#[test]
fn test_back_from_otp_keeps_nothing_running() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_otp_step())
        .when_action(BookingAction::Back)
        .then_state(|state| {
            assert_eq!(state.step(), Step::SelectSlotAndDetails);
            assert_eq!(state.otp.countdown_seconds, 0);
        })
        .run();
}

#[test]
fn test_back_from_payment_is_refused() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_payment_step())
        .when_action(BookingAction::Back)
        .then_state(|state| {
            assert_eq!(state.step(), Step::Payment);
            assert!(state.holds_slot());
            assert!(matches!(
                state.last_rejection,
                Some(Rejection::IllegalTransition { .. })
            ));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_cancel_releases_and_forgets_progress_once() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::Cancel)
        .then_state(|state| {
            assert!(state.exited);
            assert_eq!(state.progress, BookingProgress::default());
        })
        .then_effects(|effects| assertions::assert_has_sequential_effect(effects, 2))
        .run();

    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(holding_slot())
        .when_action(BookingAction::Cancel)
        .when_action(BookingAction::Cancel)
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn test_nothing_is_persisted_after_exit() {
    ReducerTest::new(reducer())
        .with_env(env())
        .given_state(at_step(Step::SelectDate))
        .when_action(BookingAction::ReturnHome)
        .when_action(BookingAction::SelectDate { date: tomorrow() })
        .then_state(|state| assert_eq!(state.progress.selected_date, None))
        .then_effects(|effects: &[Effect<BookingAction>]| assert!(effects.is_empty()))
        .run();
}
