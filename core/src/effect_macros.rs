//! Declarative macros for ergonomic effect construction
//!
//! Reducers build a lot of `Effect::Future` and `Effect::Delay` values; these
//! macros keep the boxing and pinning out of the business logic.

/// Create an `Effect::Future` from an async block
///
/// The body is moved into an `async move` block and must evaluate to
/// `Option<Action>`.
///
/// # Example
///
/// ```rust,ignore
/// use futsal_core::async_effect;
///
/// async_effect! {
///     match api.slot_status(slot_id).await {
///         Ok(status) => Some(BookingAction::StatusChecked { slot_id, status }),
///         Err(error) => Some(BookingAction::RequestFailed { reason: error.to_string() }),
///     }
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use futsal_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(1),
///     action: BookingAction::OtpTick { generation }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
