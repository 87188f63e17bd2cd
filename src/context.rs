//! Cancellation and deadline handle passed to listeners on publish.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// What a listener receives alongside the event.
///
/// Publishing never skips a listener because the context is done; slow
/// listeners are expected to check [`is_done`](Self::is_done) themselves.
#[derive(Debug, Clone)]
pub struct PublishContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for PublishContext {
    fn default() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }
}

impl PublishContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Share an existing token, e.g. one owned by the lock's shutdown path.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
