//! Booking Wizard Demo
//!
//! Walks one guest through the whole wizard against an in-process backend:
//! - Date and shift selection with saved progress
//! - Resuming the wizard in a new session
//! - A second guest losing the race for the same slot
//! - OTP verification, advance payment and the tracking code
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin booking-demo
//! ```

use chrono::{Days, NaiveDate};
use futsal_booking::mocks::{SimulatedApi, SimulatedBackend};
use futsal_booking::pricing::{PriceRule, SpecialPrice};
use futsal_booking::progress::FileProgressStore;
use futsal_booking::types::{FutsalContext, FutsalId, GuestDetails, Money, Shift};
use futsal_booking::wizard::BookingAction;
use futsal_booking::{BookingConfig, BookingEnvironment, BookingSession};
use futsal_core::environment::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Session = BookingSession<SimulatedApi, FileProgressStore>;

const PHONE: &str = "9812345678";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,futsal_booking=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    println!("\n⚽ ============================================");
    println!("   Futsal Booking Wizard - Live Demo");
    println!("============================================\n");

    let config = BookingConfig::from_env();
    let futsal = FutsalContext {
        id: FutsalId::new(1),
        name: "Kathmandu Futsal Arena".to_string(),
        price_per_hour: Money::new(1500),
    };

    // Each guest keeps progress in their own directory, like separate browsers
    let guest_dir = config.progress_dir.join("guest");
    let rival_dir = config.progress_dir.join("rival");
    let environment = |backend: &SimulatedBackend, dir: &PathBuf| {
        BookingEnvironment::new(
            backend.client(),
            FileProgressStore::new(dir),
            Arc::new(SystemClock),
            config.clone(),
        )
    };

    let backend = SimulatedBackend::new();
    let probe = environment(&backend, &guest_dir);
    let play_date = probe
        .today()
        .checked_add_days(Days::new(1))
        .ok_or_else(|| anyhow::anyhow!("calendar overflow"))?;
    probe.progress.clear(futsal.id)?;
    environment(&backend, &rival_dir).progress.clear(futsal.id)?;

    let slots = backend.seed_shift(futsal.id, play_date, Shift::Evening);
    backend.set_rate(futsal.id, futsal.price_per_hour);
    backend.add_special_price(
        futsal.id,
        SpecialPrice {
            id: Some(1),
            rule: PriceRule::Date {
                special_date: play_date,
            },
            special_price: Money::new(1200),
            message: Some("Launch week offer".to_string()),
            is_active: true,
        },
    );

    println!("📋 Venue: {}", futsal.name);
    println!("   Play date: {play_date}");
    println!("   Evening slots: {}", slots.len());
    println!("   Progress saved under {}\n", config.progress_dir.display());

    // Step 1: date and shift, then leave without finishing
    println!("1️⃣  Picking date and shift...");
    let session = BookingSession::open(futsal.clone(), environment(&backend, &guest_dir)).await?;
    to_slot_step(&session, play_date).await?;
    println!("   ✓ Now at {:?}", session.step().await);
    session.shutdown(Duration::from_secs(5)).await?;
    println!("   ✓ Session closed with progress saved\n");

    // Step 2: resume
    println!("2️⃣  Reopening the wizard...");
    let session = BookingSession::open(futsal.clone(), environment(&backend, &guest_dir)).await?;
    println!("   ✓ Resumed at {:?}", session.step().await);
    for (slot, status) in session.slot_view().await {
        println!("   • {} {status:?}", slot.label());
    }
    println!();

    // Step 3: hold a slot
    println!("3️⃣  Holding the first evening slot...");
    session
        .dispatch(BookingAction::ToggleSlot { slot_id: slots[0] })
        .await?;
    println!("   ✓ Server status: {:?}", backend.status_of(slots[0]));
    report(&session).await?;

    // Step 4: a second guest tries the same slot
    println!("4️⃣  Another guest tries the same slot...");
    let rival = BookingSession::open(futsal.clone(), environment(&backend, &rival_dir)).await?;
    to_slot_step(&rival, play_date).await?;
    rival
        .dispatch(BookingAction::ToggleSlot { slot_id: slots[0] })
        .await?;
    report(&rival).await?;
    rival.dispatch(BookingAction::Cancel).await?;
    rival.shutdown(Duration::from_secs(5)).await?;

    // Step 5: guest details and OTP
    println!("5️⃣  Submitting guest details...");
    session
        .dispatch(BookingAction::UpdateGuest {
            guest: GuestDetails {
                phone: PHONE.to_string(),
                name: "Sita Sharma".to_string(),
                number_of_players: 8,
                team_name: Some("Thunder FC".to_string()),
            },
        })
        .await?;
    session.dispatch(BookingAction::SubmitDetails).await?;
    println!("   ✓ Now at {:?}", session.step().await);

    let code = backend
        .otp_for(PHONE)
        .ok_or_else(|| anyhow::anyhow!("no code was issued"))?;
    println!("   ✓ Code received: {code}");
    session.dispatch(BookingAction::EnterOtp { code }).await?;
    session.dispatch(BookingAction::VerifyOtp).await?;
    report(&session).await?;

    // Step 6: advance payment
    println!("6️⃣  Paying the advance...");
    session
        .dispatch(BookingAction::SetPaymentId {
            payment_id: PHONE.to_string(),
        })
        .await?;
    session.dispatch(BookingAction::ConfirmPayment).await?;
    report(&session).await?;

    session.dispatch(BookingAction::Acknowledge).await?;
    if let Some(summary) = session.summary().await {
        println!("📄 Booking summary");
        println!("   Tracking code: {}", summary.booking.tracking_code);
        println!(
            "   Slot: {} {}",
            summary.booking.booking_date,
            summary.booking.start_time.format("%H:%M")
        );
        println!("   Rate: {} per hour", summary.rate.effective_price);
        println!("   Total: {}", summary.total);
        println!("   Paid: {}", summary.booking.amount_paid);
        println!("   Due at venue: {}\n", summary.balance_due);
    }

    session.dispatch(BookingAction::ReturnHome).await?;
    session.shutdown(Duration::from_secs(5)).await?;

    println!("✅ Demo complete ({} booking stored)", backend.booking_count());
    Ok(())
}

/// Steps 1 and 2: evening shift on `date`
async fn to_slot_step(session: &Session, date: NaiveDate) -> anyhow::Result<()> {
    for action in [
        BookingAction::SelectDate { date },
        BookingAction::ConfirmDate,
        BookingAction::SelectShift {
            shift: Shift::Evening,
        },
        BookingAction::ConfirmShift,
    ] {
        session.dispatch(action).await?;
    }
    Ok(())
}

/// Print and clear pending notifications
async fn report(session: &Session) -> anyhow::Result<()> {
    for notification in session.drain_notifications().await? {
        println!("   💬 [{:?}] {}", notification.kind, notification.message);
    }
    println!();
    Ok(())
}
