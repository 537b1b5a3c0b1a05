//! Metrics and observability infrastructure for snowdrift.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `recorder`: Prometheus recorder installation

pub mod events;
pub mod recorder;

pub use recorder::init;

/// Emit an internal event as a metric.
///
/// # Example
///
/// ```ignore
/// use snowdrift::metrics::events::EntityWritten;
///
/// emit!(EntityWritten);
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
