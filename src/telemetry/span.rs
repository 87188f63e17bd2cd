//! Span helpers for event publication.

use tracing::Span;

use crate::event::Event;

/// Start a span covering one [`Event::publish`] call.
///
/// The `publish.failures` field is declared empty and filled by
/// [`record_failures`] once every listener has run.
pub fn start_publish_span(event: &Event, listeners: usize) -> Span {
    tracing::info_span!(
        "lock_event.publish",
        "event.id" = event.id(),
        "event.root_id" = event.root_id(),
        "event.lock_id" = event.lock_id(),
        "event.type" = %event.event_type(),
        "event.listeners" = listeners,
        "publish.failures" = tracing::field::Empty,
    )
}

pub fn record_failures(span: &Span, failures: usize) {
    span.record("publish.failures", failures);
}
