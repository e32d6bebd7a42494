//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block body
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::async_effect;
///
/// async_effect! {
///     let ticket = repository.fetch(&ticket_id).await;
///     Some(WorkflowAction::LookupCompleted { ticket })
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
/// use turnstile_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(2),
///     action: WorkflowAction::ResetAfterCommit { flight }
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
