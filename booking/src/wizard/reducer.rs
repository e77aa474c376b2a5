//! Reducer for the booking wizard.
//!
//! Step changes go through [`transition`]; everything the server has to
//! confirm is an effect whose answer comes back as an event action. Every
//! change to persisted progress schedules a snapshot write, tagged with a
//! revision so late writes never clobber newer ones.

use super::actions::{BookingAction, FailedRequest};
use super::environment::BookingEnvironment;
use super::state::{BookingState, NotificationKind, Request};
use crate::api::{BookingApi, ReserveOutcome, reject_message};
use crate::error::{ApiError, Rejection};
use crate::machine::{Route, Step, StepEvent, transition};
use crate::pricing::{PriceQuote, resolve};
use crate::progress::{BookingProgress, ProgressStore};
use crate::types::{BookingStatus, DisplayStatus, NewBooking, Shift, SlotId, SlotStatus};
use chrono::{NaiveDate, NaiveTime};
use futsal_core::{SmallVec, async_effect, delay, effect::Effect, reducer::Reducer, smallvec};
use std::marker::PhantomData;
use std::time::Duration;

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

const NETWORK_FAILURE: &str = "Something went wrong. Please check your connection and try again.";
const SLOT_WENT_STALE: &str =
    "Your selected slot is no longer available. Please choose another time slot.";
const SLOT_EXPIRED: &str = "This time slot has already started. Please choose another one.";
const OTP_MISMATCH: &str = "Invalid verification code. Please try again.";

/// Reducer for the booking wizard
pub struct BookingReducer<A, P> {
    _marker: PhantomData<fn() -> (A, P)>,
}

impl<A, P> BookingReducer<A, P> {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<A, P> Default for BookingReducer<A, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, P> Clone for BookingReducer<A, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A: BookingApi, P: ProgressStore> Reducer for BookingReducer<A, P> {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment<A, P>;

    #[allow(clippy::too_many_lines)] // One arm per wizard action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if state.exited {
            return Self::after_exit(state, action, env);
        }

        match action {
            // ========== Session ==========
            BookingAction::Opened => Self::opened(state, env),

            BookingAction::DismissNotifications { count } => {
                let count = count.min(state.notifications.len());
                state.notifications.drain(..count);
                SmallVec::new()
            },

            BookingAction::SpecialPricesLoaded { rules } => {
                tracing::debug!(rules = rules.len(), "Special prices loaded");
                state.special_prices = rules;
                SmallVec::new()
            },

            // ========== Steps 1-2: date and shift ==========
            BookingAction::SelectDate { date } => {
                if let Err(rejection) = Self::expect_step(state, Step::SelectDate) {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                if date < env.today() {
                    state.reject(Rejection::DateInPast);
                    return SmallVec::new();
                }

                let shifts = Shift::available_on(date, env.local_now());
                if shifts.is_empty() {
                    state.notify(
                        NotificationKind::Warning,
                        "No shifts are left on this date. Please pick another day.",
                    );
                }
                if state
                    .progress
                    .selected_shift
                    .is_some_and(|shift| !shifts.contains(&shift))
                {
                    state.progress.selected_shift = None;
                }
                if state.progress.selected_date != Some(date) {
                    state.date_quote = None;
                }
                state.progress.selected_date = Some(date);
                state.progress.available_shifts = shifts;

                let mut effects = Effects::new();
                if state.date_quote.is_none() {
                    effects.push(Self::preview_date(state, env, date));
                }
                effects.push(Self::persist(state, env));
                effects
            },

            BookingAction::ConfirmDate => {
                if !Self::fire(state, env, StepEvent::ConfirmDate) {
                    return SmallVec::new();
                }
                if let Some(date) = state.progress.selected_date {
                    state.progress.available_shifts = Shift::available_on(date, env.local_now());
                }
                smallvec![Self::persist(state, env)]
            },

            BookingAction::SelectShift { shift } => {
                if let Err(rejection) = Self::expect_step(state, Step::SelectShift)
                    .and_then(|()| Self::check_shift_open(state, env, shift))
                {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                state.progress.selected_shift = Some(shift);
                smallvec![Self::persist(state, env)]
            },

            BookingAction::ConfirmShift => {
                if let Some(shift) = state.progress.selected_shift
                    && state.step() == Step::SelectShift
                    && let Err(rejection) = Self::check_shift_open(state, env, shift)
                {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                if !Self::fire(state, env, StepEvent::ConfirmShift) {
                    return SmallVec::new();
                }
                if let (Some(date), Some(shift)) =
                    (state.progress.selected_date, state.progress.selected_shift)
                {
                    state.slots.rescope(date, shift);
                    state.progress.available_slots = state.slots.slots().to_vec();
                }
                state.quote = None;
                let mut effects = Self::load_slots(state, env);
                effects.push(Self::persist(state, env));
                effects
            },

            // ========== Step 3: slot and guest ==========
            BookingAction::RefreshSlots => {
                state.slots.mark_stale();
                Self::load_slots(state, env)
            },

            BookingAction::SlotsLoaded { date, shift, slots } => {
                if !state.slots.load(date, shift, slots) {
                    tracing::trace!(%date, %shift, "Ignoring listing for a previous date or shift");
                    return SmallVec::new();
                }
                state.progress.available_slots = state.slots.slots().to_vec();
                smallvec![Self::persist(state, env)]
            },

            BookingAction::ToggleSlot { slot_id } => Self::toggle_slot(state, env, slot_id),

            BookingAction::ReserveAnswered { slot_id, outcome } => {
                Self::reserve_answered(state, env, slot_id, outcome)
            },

            BookingAction::SlotReleased {
                slot_id,
                acknowledged,
            } => {
                tracing::debug!(%slot_id, acknowledged, "Slot release finished");
                SmallVec::new()
            },

            BookingAction::DatePriced { date, quote } => {
                if state.progress.selected_date != Some(date) {
                    tracing::trace!(%date, "Ignoring rate preview for a previous date");
                    return SmallVec::new();
                }
                if state.date_quote.as_ref() == Some(&quote) {
                    return SmallVec::new();
                }
                tracing::debug!(%date, rate = %quote.effective_price, "Rate preview");
                if let Some(notice) = quote.notice() {
                    state.notify(NotificationKind::Info, notice);
                }
                state.date_quote = Some(quote);
                SmallVec::new()
            },

            BookingAction::PriceQuoted { slot_id, quote } => {
                if state.progress.selected_slot() != Some(slot_id) {
                    return SmallVec::new();
                }
                // The date preview already announced a date-wide rule
                let previewed = state.date_quote.as_ref().and_then(PriceQuote::notice);
                if let Some(notice) = quote.notice()
                    && previewed.as_ref() != Some(&notice)
                {
                    state.notify(NotificationKind::Info, notice);
                }
                state.quote = Some(quote);
                SmallVec::new()
            },

            BookingAction::UpdateGuest { guest } => {
                if let Err(rejection) = Self::expect_step(state, Step::SelectSlotAndDetails) {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                state.progress.set_guest(guest);
                smallvec![Self::persist(state, env)]
            },

            BookingAction::SubmitDetails => Self::submit_details(state, env),

            BookingAction::SlotWentStale {
                submission,
                slot_id,
                status,
            } => {
                if !Self::current_submission(state, submission) {
                    return SmallVec::new();
                }
                state.in_flight.finish(Request::Submit);
                tracing::info!(%slot_id, %status, "Held slot is no longer ours");
                if state.progress.selected_slot() == Some(slot_id) {
                    state.progress.selected_slot_ids.clear();
                    state.quote = None;
                }
                state.slots.set_status(slot_id, status);
                state.slots.mark_stale();
                state.notify(NotificationKind::Warning, SLOT_WENT_STALE);
                let mut effects = Self::load_slots(state, env);
                effects.push(Self::persist(state, env));
                effects
            },

            BookingAction::PhoneAlreadyRegistered { submission } => {
                if !Self::current_submission(state, submission) {
                    return SmallVec::new();
                }
                state.in_flight.finish(Request::Submit);
                state.reject(Rejection::PhoneRegistered);
                SmallVec::new()
            },

            BookingAction::DetailsAccepted { submission, route } => {
                if !Self::current_submission(state, submission) {
                    return SmallVec::new();
                }
                state.in_flight.finish(Request::Submit);
                if state.step() != Step::SelectSlotAndDetails {
                    tracing::debug!(step = %state.step(), "Guest details accepted after leaving step 3");
                    return SmallVec::new();
                }
                if !Self::fire(state, env, StepEvent::DetailsAccepted(route)) {
                    return SmallVec::new();
                }
                match route {
                    Route::VerifyOtp => {
                        let generation = state.otp.start(env.config.otp_resend_seconds);
                        state.notify(
                            NotificationKind::Info,
                            format!("A verification code has been sent to {}", state.progress.phone),
                        );
                        smallvec![Self::tick(generation), Self::persist(state, env)]
                    },
                    Route::SkipToPayment => {
                        state.notify(NotificationKind::Info, "Phone number already verified");
                        smallvec![Self::persist(state, env)]
                    },
                }
            },

            // ========== Step 4: one-time code ==========
            BookingAction::EnterOtp { code } => {
                if let Err(rejection) = Self::expect_step(state, Step::VerifyOtp) {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                state.otp.code = code.trim().to_string();
                SmallVec::new()
            },

            BookingAction::OtpTick { generation } => {
                if state.step() == Step::VerifyOtp && state.otp.tick(generation) {
                    smallvec![Self::tick(generation)]
                } else {
                    SmallVec::new()
                }
            },

            BookingAction::VerifyOtp => Self::verify_otp(state, env),

            BookingAction::OtpChecked { accepted } => {
                state.in_flight.finish(Request::Verify);
                if state.step() != Step::VerifyOtp {
                    return SmallVec::new();
                }
                if !accepted {
                    state.otp.code.clear();
                    state.notify(NotificationKind::Error, OTP_MISMATCH);
                    return SmallVec::new();
                }
                if !Self::fire(state, env, StepEvent::OtpVerified) {
                    return SmallVec::new();
                }
                state.otp.clear();
                state.notify(NotificationKind::Success, "Phone number verified");
                smallvec![Self::persist(state, env)]
            },

            BookingAction::ResendOtp => {
                if let Err(rejection) = Self::expect_step(state, Step::VerifyOtp) {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                if !state.otp.can_resend() {
                    state.reject(Rejection::ResendTooSoon(state.otp.countdown_seconds));
                    return SmallVec::new();
                }
                if !state.in_flight.begin(Request::Resend) {
                    state.reject(Rejection::RequestInFlight);
                    return SmallVec::new();
                }
                let api = env.api.clone();
                let phone = state.progress.phone.clone();
                smallvec![async_effect! {
                    match api.generate_otp(&phone).await {
                        Ok(_) => Some(BookingAction::OtpResent),
                        Err(error) => Some(Self::failed(FailedRequest::Resend, &error)),
                    }
                }]
            },

            BookingAction::OtpResent => {
                state.in_flight.finish(Request::Resend);
                if state.step() != Step::VerifyOtp {
                    return SmallVec::new();
                }
                let generation = state.otp.start(env.config.otp_resend_seconds);
                state.notify(NotificationKind::Info, "A new verification code has been sent");
                smallvec![Self::tick(generation)]
            },

            // ========== Steps 5-7: payment and result ==========
            BookingAction::SetPaymentId { payment_id } => {
                if let Err(rejection) = Self::expect_step(state, Step::Payment) {
                    state.reject(rejection);
                    return SmallVec::new();
                }
                state.progress.payment_id = payment_id.trim().to_string();
                smallvec![Self::persist(state, env)]
            },

            BookingAction::ConfirmPayment => Self::confirm_payment(state, env),

            BookingAction::BookingCreated { booking } => {
                state.in_flight.finish(Request::Payment);
                tracing::info!(
                    booking_id = %booking.id,
                    tracking_code = %booking.tracking_code,
                    "Booking created"
                );
                state.slots.set_status(booking.slot_id, SlotStatus::Booked);
                state.progress.selected_slot_ids.clear();
                state.progress.generated_tracking_code = Some(booking.tracking_code.clone());
                state.notify(
                    NotificationKind::Success,
                    format!("Booking confirmed! Your tracking code is {}", booking.tracking_code),
                );
                state.progress.booking = Some(booking);
                state.otp.clear();
                if state.step() == Step::Payment {
                    state.progress.step = Step::TrackingCodeDisplay;
                }
                smallvec![Self::persist(state, env)]
            },

            BookingAction::Acknowledge => {
                if !Self::fire(state, env, StepEvent::Acknowledge) {
                    return SmallVec::new();
                }
                smallvec![Self::persist(state, env)]
            },

            BookingAction::CancelBooking => Self::cancel_booking(state, env),

            BookingAction::BookingCancelled => {
                state.in_flight.finish(Request::CancelBooking);
                if let Some(booking) = state.progress.booking.as_mut() {
                    booking.status = BookingStatus::Cancelled;
                    state.slots.set_status(booking.slot_id, SlotStatus::Available);
                }
                state.notify(NotificationKind::Success, "Your booking has been cancelled");
                smallvec![Self::persist(state, env)]
            },

            // ========== Navigation and exit ==========
            BookingAction::Back => Self::back(state, env),

            BookingAction::Cancel => {
                state.notify(NotificationKind::Info, "Booking cancelled");
                Self::exit(state, env)
            },

            BookingAction::ReturnHome => Self::exit(state, env),

            // ========== Failures ==========
            BookingAction::RequestFailed {
                request,
                reason,
                message,
            } => Self::request_failed(state, env, request, &reason, message),
        }
    }
}

impl<A: BookingApi, P: ProgressStore> BookingReducer<A, P> {
    // ========== Validation ==========

    fn expect_step(state: &BookingState, expected: Step) -> Result<(), Rejection> {
        if state.step() == expected {
            Ok(())
        } else {
            Err(Rejection::WrongStep {
                expected,
                actual: state.step(),
            })
        }
    }

    fn check_shift_open(
        state: &BookingState,
        env: &BookingEnvironment<A, P>,
        shift: Shift,
    ) -> Result<(), Rejection> {
        let date = state.progress.selected_date.ok_or(Rejection::MissingDate)?;
        if Shift::available_on(date, env.local_now()).contains(&shift) {
            Ok(())
        } else {
            Err(Rejection::ShiftUnavailable(shift))
        }
    }

    /// What `event` would do, without applying it
    fn dry_run(
        state: &BookingState,
        env: &BookingEnvironment<A, P>,
        event: StepEvent,
    ) -> Result<Step, Rejection> {
        let guest = state.progress.guest();
        transition(state.step(), event, &state.gates(env.today(), &guest))
    }

    /// Whether an answer belongs to the submission still waited on
    fn current_submission(state: &BookingState, submission: u64) -> bool {
        if submission == state.submission {
            return true;
        }
        tracing::debug!(
            submission,
            current = state.submission,
            "Ignoring answer to an earlier submission"
        );
        false
    }

    /// Apply `event`; a rejection is recorded and leaves the step unchanged
    fn fire(state: &mut BookingState, env: &BookingEnvironment<A, P>, event: StepEvent) -> bool {
        match Self::dry_run(state, env, event) {
            Ok(next) => {
                tracing::info!(from = %state.step(), to = %next, %event, "Wizard step changed");
                state.progress.step = next;
                state.last_rejection = None;
                true
            },
            Err(rejection) => {
                state.reject(rejection);
                false
            },
        }
    }

    // ========== Effects ==========

    fn persist(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effect<BookingAction> {
        state.revision += 1;
        let revision = state.revision;
        let futsal_id = state.futsal.id;
        let snapshot = state.progress.clone();
        let repository = env.progress.clone();
        async_effect! {
            let written = tokio::task::spawn_blocking(move || {
                repository.persist_revision(futsal_id, revision, &snapshot)
            })
            .await;
            match written {
                Ok(Ok(_)) => {},
                Ok(Err(error)) => {
                    tracing::warn!(%futsal_id, %error, "Failed to save booking progress");
                },
                Err(error) => tracing::warn!(%futsal_id, %error, "Progress write task failed"),
            }
            None
        }
    }

    fn clear_progress(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effect<BookingAction> {
        state.revision += 1;
        let revision = state.revision;
        let futsal_id = state.futsal.id;
        let repository = env.progress.clone();
        async_effect! {
            let cleared =
                tokio::task::spawn_blocking(move || repository.clear_revision(futsal_id, revision)).await;
            match cleared {
                Ok(Ok(_)) => {},
                Ok(Err(error)) => {
                    tracing::warn!(%futsal_id, %error, "Failed to delete booking progress");
                },
                Err(error) => tracing::warn!(%futsal_id, %error, "Progress delete task failed"),
            }
            None
        }
    }

    fn tick(generation: u64) -> Effect<BookingAction> {
        delay! {
            duration: Duration::from_secs(1),
            action: BookingAction::OtpTick { generation }
        }
    }

    fn release(env: &BookingEnvironment<A, P>, slot_id: SlotId) -> Effect<BookingAction> {
        let api = env.api.clone();
        async_effect! {
            let acknowledged = match api.release_slot(slot_id).await {
                Ok(()) => {
                    metrics::counter!("booking.slot.release", "outcome" => "released").increment(1);
                    true
                },
                Err(error) => {
                    metrics::counter!("booking.slot.release", "outcome" => "failed").increment(1);
                    tracing::warn!(%slot_id, %error, "Failed to release slot");
                    false
                },
            };
            Some(BookingAction::SlotReleased { slot_id, acknowledged })
        }
    }

    fn reserve(env: &BookingEnvironment<A, P>, slot_id: SlotId) -> Effect<BookingAction> {
        let api = env.api.clone();
        async_effect! {
            match api.reserve_slot(slot_id).await {
                Ok(outcome) => {
                    let label = if outcome.is_reserved() { "reserved" } else { "rejected" };
                    metrics::counter!("booking.slot.reserve", "outcome" => label).increment(1);
                    Some(BookingAction::ReserveAnswered { slot_id, outcome })
                },
                Err(error) => {
                    metrics::counter!("booking.slot.reserve", "outcome" => "failed").increment(1);
                    Some(Self::failed(FailedRequest::Reserve { slot_id }, &error))
                },
            }
        }
    }

    fn load_slots(state: &BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        let Some((date, shift)) = state.slots.scope() else {
            return SmallVec::new();
        };
        let api = env.api.clone();
        let futsal_id = state.futsal.id;
        smallvec![async_effect! {
            match api.list_slots(futsal_id, date, shift).await {
                Ok(slots) => Some(BookingAction::SlotsLoaded { date, shift, slots }),
                Err(error) => Some(Self::failed(FailedRequest::Slots, &error)),
            }
        }]
    }

    fn load_special_prices(state: &BookingState, env: &BookingEnvironment<A, P>) -> Effect<BookingAction> {
        let api = env.api.clone();
        let futsal_id = state.futsal.id;
        async_effect! {
            match api.special_prices(futsal_id).await {
                Ok(rules) => Some(BookingAction::SpecialPricesLoaded { rules }),
                Err(error) => Some(Self::failed(FailedRequest::SpecialPrices, &error)),
            }
        }
    }

    /// Server quote for the held slot
    fn quote(state: &BookingState, env: &BookingEnvironment<A, P>, slot_id: SlotId) -> Effects {
        let Some(date) = state.progress.selected_date else {
            return SmallVec::new();
        };
        let start_time = state.slots.get(slot_id).map(|slot| slot.start_time);
        smallvec![Self::price(state, env, date, start_time, move |quote| {
            BookingAction::PriceQuoted { slot_id, quote }
        })]
    }

    /// Server rate for the whole day, before any slot is chosen
    fn preview_date(
        state: &BookingState,
        env: &BookingEnvironment<A, P>,
        date: NaiveDate,
    ) -> Effect<BookingAction> {
        Self::price(state, env, date, None, move |quote| BookingAction::DatePriced { date, quote })
    }

    /// Ask the server for a price, falling back to local rules
    fn price(
        state: &BookingState,
        env: &BookingEnvironment<A, P>,
        date: NaiveDate,
        start_time: Option<NaiveTime>,
        answer: impl FnOnce(PriceQuote) -> BookingAction + Send + 'static,
    ) -> Effect<BookingAction> {
        let api = env.api.clone();
        let futsal_id = state.futsal.id;
        let base = state.futsal.price_per_hour;
        let rules = state.special_prices.clone();
        async_effect! {
            let quote = match api.price_quote(futsal_id, date, start_time).await {
                Ok(quote) => quote,
                Err(error) => {
                    tracing::warn!(%error, "Price quote failed, using local rules");
                    resolve(base, date, start_time, &rules)
                },
            };
            Some(answer(quote))
        }
    }

    fn failed(request: FailedRequest, error: &ApiError) -> BookingAction {
        let message = match error {
            ApiError::Status { message, .. } if error.is_client_error() && !message.is_empty() => {
                Some(message.clone())
            },
            _ => None,
        };
        BookingAction::RequestFailed {
            request,
            reason: error.to_string(),
            message,
        }
    }

    // ========== Handlers ==========

    fn opened(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        tracing::debug!(futsal_id = %state.futsal.id, step = %state.step(), "Booking wizard opened");
        let mut effects: Effects = smallvec![Self::load_special_prices(state, env)];

        if state.step() <= Step::SelectShift
            && let Some(date) = state.progress.selected_date
        {
            state.progress.available_shifts = Shift::available_on(date, env.local_now());
            effects.push(Self::preview_date(state, env, date));
        }
        if state.step() == Step::SelectSlotAndDetails {
            effects.extend(Self::load_slots(state, env));
        }
        if let Some(slot_id) = state.progress.selected_slot()
            && !state.step().is_booked()
        {
            effects.extend(Self::quote(state, env, slot_id));
        }
        effects.push(Self::persist(state, env));
        effects
    }

    fn toggle_slot(state: &mut BookingState, env: &BookingEnvironment<A, P>, slot_id: SlotId) -> Effects {
        if let Err(rejection) = Self::expect_step(state, Step::SelectSlotAndDetails) {
            state.reject(rejection);
            return SmallVec::new();
        }
        if state.in_flight.contains(Request::Reserve) || state.in_flight.contains(Request::Submit) {
            state.reject(Rejection::RequestInFlight);
            return SmallVec::new();
        }

        let held = state.progress.selected_slot();
        if held == Some(slot_id) {
            tracing::debug!(%slot_id, "Deselecting held slot");
            state.progress.selected_slot_ids.clear();
            state.slots.set_status(slot_id, SlotStatus::Available);
            state.quote = None;
            return smallvec![Self::release(env, slot_id), Self::persist(state, env)];
        }

        let (Some((date, _)), Some(slot)) = (state.slots.scope(), state.slots.get(slot_id)) else {
            state.notify(
                NotificationKind::Warning,
                "This time slot is no longer listed. Refreshing available slots.",
            );
            return Self::load_slots(state, env);
        };
        match slot.display_status(date, env.local_now()) {
            DisplayStatus::Available => {},
            DisplayStatus::Expired => {
                state.notify(NotificationKind::Warning, SLOT_EXPIRED);
                return SmallVec::new();
            },
            // A stale listing is only a hint; the reservation decides
            DisplayStatus::Pending | DisplayStatus::Booked | DisplayStatus::Disabled
                if state.slots.is_stale() =>
            {
                tracing::debug!(%slot_id, status = %slot.status, "Listing is stale, asking the server");
            },
            DisplayStatus::Pending | DisplayStatus::Booked | DisplayStatus::Disabled => {
                let message = reject_message(slot.status);
                state.notify(NotificationKind::Warning, message);
                return SmallVec::new();
            },
        }

        state.in_flight.begin(Request::Reserve);
        state.progress.selected_slot_ids = vec![slot_id];
        state.slots.set_status(slot_id, SlotStatus::Pending);
        state.quote = None;

        let mut steps = Vec::with_capacity(2);
        if let Some(previous) = held {
            tracing::debug!(%previous, %slot_id, "Releasing held slot before reserving another");
            state.slots.set_status(previous, SlotStatus::Available);
            steps.push(Self::release(env, previous));
        }
        steps.push(Self::reserve(env, slot_id));
        smallvec![Effect::chain(steps)]
    }

    fn reserve_answered(
        state: &mut BookingState,
        env: &BookingEnvironment<A, P>,
        slot_id: SlotId,
        outcome: ReserveOutcome,
    ) -> Effects {
        state.in_flight.finish(Request::Reserve);
        let on_slot_step = state.step() == Step::SelectSlotAndDetails;
        let wanted = on_slot_step && state.progress.selected_slot() == Some(slot_id);

        let ReserveOutcome::Rejected { status, .. } = &outcome else {
            if !wanted {
                tracing::debug!(%slot_id, "Reservation no longer wanted, releasing");
                return smallvec![Self::release(env, slot_id)];
            }
            tracing::info!(%slot_id, "Slot reserved");
            state.slots.set_status(slot_id, SlotStatus::Pending);
            let mut effects = Self::quote(state, env, slot_id);
            effects.push(Self::persist(state, env));
            return effects;
        };

        tracing::info!(%slot_id, ?status, "Slot reservation rejected");
        if state.progress.selected_slot() == Some(slot_id) {
            state.progress.selected_slot_ids.clear();
        }
        if let Some(status) = *status {
            state.slots.set_status(slot_id, status);
        }
        state.slots.mark_stale();
        if !on_slot_step {
            return smallvec![Self::persist(state, env)];
        }

        if let Some(message) = outcome.message() {
            state.notify(NotificationKind::Warning, message);
        }
        let mut effects = Self::load_slots(state, env);
        effects.push(Self::persist(state, env));
        effects
    }

    fn submit_details(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        if state.in_flight.contains(Request::Submit) || state.in_flight.contains(Request::Reserve) {
            state.reject(Rejection::RequestInFlight);
            return SmallVec::new();
        }
        if let Err(rejection) = Self::dry_run(state, env, StepEvent::DetailsAccepted(Route::VerifyOtp)) {
            state.reject(rejection);
            return SmallVec::new();
        }
        let Some(slot_id) = state.progress.selected_slot() else {
            state.reject(Rejection::NoSlotHeld);
            return SmallVec::new();
        };

        state.in_flight.begin(Request::Submit);
        state.submission += 1;
        let submission = state.submission;
        let guest = state.progress.guest();
        state.progress.set_guest(guest.clone());
        let api = env.api.clone();
        let phone = guest.phone;

        smallvec![async_effect! {
            let outcome = async {
                // A restored selection may read `available` again; only a
                // slot that is gone for good stops the submission
                let status = api.slot_status(slot_id).await?;
                if !matches!(status, SlotStatus::Available | SlotStatus::Pending) {
                    return Ok(BookingAction::SlotWentStale { submission, slot_id, status });
                }
                if api.is_registered(&phone).await? {
                    return Ok(BookingAction::PhoneAlreadyRegistered { submission });
                }
                if api.is_otp_verified(&phone).await? {
                    return Ok(BookingAction::DetailsAccepted {
                        submission,
                        route: Route::SkipToPayment,
                    });
                }
                if let Some(code) = api.generate_otp(&phone).await? {
                    tracing::debug!(%code, "Backend echoed the one-time code");
                }
                Ok::<_, ApiError>(BookingAction::DetailsAccepted {
                    submission,
                    route: Route::VerifyOtp,
                })
            }
            .await;
            Some(outcome.unwrap_or_else(|error| {
                Self::failed(FailedRequest::Submit { submission }, &error)
            }))
        }]
    }

    fn verify_otp(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        let checked = Self::expect_step(state, Step::VerifyOtp).and_then(|()| {
            if state.otp.code.is_empty() {
                Err(Rejection::MissingOtp)
            } else if !state.otp.can_verify() {
                Err(Rejection::OtpExpired)
            } else {
                Ok(())
            }
        });
        if let Err(rejection) = checked {
            state.reject(rejection);
            return SmallVec::new();
        }
        if !state.in_flight.begin(Request::Verify) {
            state.reject(Rejection::RequestInFlight);
            return SmallVec::new();
        }

        let api = env.api.clone();
        let phone = state.progress.phone.clone();
        let code = state.otp.code.clone();
        smallvec![async_effect! {
            match api.verify_otp(&phone, &code).await {
                Ok(accepted) => {
                    let label = if accepted { "accepted" } else { "refused" };
                    metrics::counter!("booking.otp.verify", "outcome" => label).increment(1);
                    Some(BookingAction::OtpChecked { accepted })
                },
                Err(error) => Some(Self::failed(FailedRequest::Verify, &error)),
            }
        }]
    }

    fn confirm_payment(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        if state.in_flight.contains(Request::Payment) {
            state.reject(Rejection::RequestInFlight);
            return SmallVec::new();
        }
        if let Err(rejection) = Self::dry_run(state, env, StepEvent::PaymentConfirmed) {
            state.reject(rejection);
            return SmallVec::new();
        }
        let (Some(slot_id), Some(booking_date)) =
            (state.progress.selected_slot(), state.progress.selected_date)
        else {
            state.reject(Rejection::NoSlotHeld);
            return SmallVec::new();
        };

        state.in_flight.begin(Request::Payment);
        let guest = state.progress.guest();
        let request = NewBooking {
            futsal_id: state.futsal.id,
            slot_id,
            booking_date,
            name: guest.name,
            phone: guest.phone,
            number_of_players: guest.number_of_players,
            team_name: guest.team_name,
            payment_id: state.progress.payment_id.clone(),
            amount_paid: env.config.advance_amount,
        };
        tracing::info!(%slot_id, amount = %request.amount_paid, "Creating booking");

        let api = env.api.clone();
        smallvec![async_effect! {
            match api.create_booking(request).await {
                Ok(booking) => {
                    metrics::counter!("booking.created").increment(1);
                    Some(BookingAction::BookingCreated { booking })
                },
                Err(error) => Some(Self::failed(FailedRequest::Payment, &error)),
            }
        }]
    }

    fn cancel_booking(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        if !state.step().is_booked() {
            state.reject(Rejection::WrongStep {
                expected: Step::Summary,
                actual: state.step(),
            });
            return SmallVec::new();
        }
        let Some(booking) = state.progress.booking.as_ref() else {
            return SmallVec::new();
        };
        if booking.status == BookingStatus::Cancelled {
            state.notify(NotificationKind::Info, "This booking is already cancelled");
            return SmallVec::new();
        }
        let tracking_code = booking.tracking_code.clone();
        if !state.in_flight.begin(Request::CancelBooking) {
            state.reject(Rejection::RequestInFlight);
            return SmallVec::new();
        }

        let api = env.api.clone();
        smallvec![async_effect! {
            match api.cancel_booking(&tracking_code).await {
                Ok(()) => Some(BookingAction::BookingCancelled),
                Err(error) => Some(Self::failed(FailedRequest::CancelBooking, &error)),
            }
        }]
    }

    fn back(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        let next = match Self::dry_run(state, env, StepEvent::Back) {
            Ok(next) => next,
            Err(rejection) => {
                state.reject(rejection);
                return SmallVec::new();
            },
        };

        let mut effects = Effects::new();
        if let Some(slot_id) = state.progress.selected_slot() {
            tracing::debug!(%slot_id, "Releasing held slot before going back");
            state.progress.selected_slot_ids.clear();
            state.slots.set_status(slot_id, SlotStatus::Available);
            effects.push(Self::release(env, slot_id));
        }
        if state.step() == Step::VerifyOtp {
            state.otp.clear();
        }
        state.quote = None;
        if state.in_flight.contains(Request::Submit) {
            state.in_flight.finish(Request::Submit);
            state.submission += 1;
        }

        tracing::info!(from = %state.step(), to = %next, "Wizard stepped back");
        state.progress.step = next;
        state.last_rejection = None;
        effects.push(Self::persist(state, env));
        effects
    }

    /// Leave the wizard: hand back any hold, then delete the snapshot
    fn exit(state: &mut BookingState, env: &BookingEnvironment<A, P>) -> Effects {
        let held = state.progress.selected_slot();
        tracing::info!(step = %state.step(), ?held, "Leaving booking wizard");

        let mut steps = Vec::with_capacity(2);
        if let Some(slot_id) = held {
            steps.push(Self::release(env, slot_id));
        }
        steps.push(Self::clear_progress(state, env));

        state.progress = BookingProgress::default();
        state.slots.clear();
        state.otp.clear();
        state.date_quote = None;
        state.quote = None;
        state.in_flight.clear();
        state.last_rejection = None;
        state.exited = true;

        smallvec![Effect::chain(steps)]
    }

    fn request_failed(
        state: &mut BookingState,
        env: &BookingEnvironment<A, P>,
        request: FailedRequest,
        reason: &str,
        message: Option<String>,
    ) -> Effects {
        tracing::warn!(?request, %reason, "Booking request failed");
        let shown = message.unwrap_or_else(|| NETWORK_FAILURE.to_string());

        match request {
            FailedRequest::SpecialPrices => SmallVec::new(),
            FailedRequest::Slots => {
                state.notify(NotificationKind::Error, shown);
                SmallVec::new()
            },
            FailedRequest::Reserve { slot_id } => {
                state.in_flight.finish(Request::Reserve);
                if state.progress.selected_slot() == Some(slot_id) {
                    state.progress.selected_slot_ids.clear();
                    state.slots.set_status(slot_id, SlotStatus::Available);
                }
                state.slots.mark_stale();
                state.notify(NotificationKind::Error, shown);
                smallvec![Self::persist(state, env)]
            },
            FailedRequest::Submit { submission } => {
                if !Self::current_submission(state, submission) {
                    return SmallVec::new();
                }
                state.in_flight.finish(Request::Submit);
                state.notify(NotificationKind::Error, shown);
                SmallVec::new()
            },
            FailedRequest::Verify => {
                state.in_flight.finish(Request::Verify);
                state.notify(NotificationKind::Error, shown);
                SmallVec::new()
            },
            FailedRequest::Resend => {
                state.in_flight.finish(Request::Resend);
                state.notify(NotificationKind::Error, shown);
                SmallVec::new()
            },
            FailedRequest::Payment => {
                state.in_flight.finish(Request::Payment);
                state.notify(NotificationKind::Error, shown);
                SmallVec::new()
            },
            FailedRequest::CancelBooking => {
                state.in_flight.finish(Request::CancelBooking);
                state.notify(NotificationKind::Error, shown);
                SmallVec::new()
            },
        }
    }

    /// After cancel or return home only stray reservations need handling
    fn after_exit(state: &mut BookingState, action: BookingAction, env: &BookingEnvironment<A, P>) -> Effects {
        match action {
            BookingAction::ReserveAnswered {
                slot_id,
                outcome: ReserveOutcome::Reserved,
            } => {
                tracing::debug!(%slot_id, "Reservation landed after exit, releasing");
                smallvec![Self::release(env, slot_id)]
            },
            BookingAction::DismissNotifications { count } => {
                let count = count.min(state.notifications.len());
                state.notifications.drain(..count);
                SmallVec::new()
            },
            BookingAction::BookingCreated { booking } => {
                tracing::warn!(
                    tracking_code = %booking.tracking_code,
                    "Booking was created after the wizard was closed"
                );
                SmallVec::new()
            },
            other => {
                tracing::trace!(action = ?other, "Ignoring action after exit");
                SmallVec::new()
            },
        }
    }
}
