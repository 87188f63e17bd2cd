//! Metric instrument factories for storage-lock-events.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a registered provider every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for storage-lock-events instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("storage-lock-events")
}

/// Counter: events published.
/// Labels: `event_type`.
pub fn events_published() -> Counter<u64> {
    meter()
        .u64_counter("lock_events.event.published")
        .with_description("Number of lock events published")
        .build()
}

/// Counter: listener invocations that returned an error.
/// Labels: `listener`.
pub fn listener_failures() -> Counter<u64> {
    meter()
        .u64_counter("lock_events.listener.failures")
        .with_description("Number of failed listener invocations")
        .build()
}

/// Histogram: event duration (start to end) in milliseconds.
/// Labels: `event_type`.
pub fn event_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("lock_events.event.duration_ms")
        .with_description("Lock event duration in milliseconds")
        .with_unit("ms")
        .build()
}
