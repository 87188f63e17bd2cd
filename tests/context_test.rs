//! Integration tests for the publish context.

use std::time::{Duration, Instant};

use storage_lock_events::PublishContext;
use tokio_util::sync::CancellationToken;

#[test]
fn background_context_is_never_done() {
    let ctx = PublishContext::background();
    assert!(!ctx.is_cancelled());
    assert!(!ctx.is_expired());
    assert!(!ctx.is_done());
    assert!(ctx.deadline().is_none());
    assert!(ctx.remaining().is_none());
}

#[test]
fn cancel_marks_context_done() {
    let ctx = PublishContext::background();
    let clone = ctx.clone();
    ctx.cancel();
    assert!(ctx.is_done());
    assert!(clone.is_cancelled());
}

#[test]
fn shared_token_cancels_context() {
    let token = CancellationToken::new();
    let ctx = PublishContext::with_cancellation(token.child_token());
    assert!(!ctx.is_done());
    token.cancel();
    assert!(ctx.is_cancelled());
}

#[test]
fn past_deadline_is_expired() {
    let ctx = PublishContext::with_deadline(Instant::now());
    assert!(ctx.is_expired());
    assert!(ctx.is_done());
    assert_eq!(ctx.remaining(), Some(Duration::ZERO));
}

#[test]
fn timeout_leaves_time_remaining() {
    let ctx = PublishContext::with_timeout(Duration::from_secs(60));
    assert!(!ctx.is_expired());
    let remaining = ctx.remaining().unwrap();
    assert!(remaining > Duration::from_secs(50));
    assert!(remaining <= Duration::from_secs(60));
}
