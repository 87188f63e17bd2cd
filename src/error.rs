//! Error types for storage-lock-events.

use thiserror::Error;

use crate::listener::ListenerFailure;

#[derive(Debug, Error)]
pub enum Error {
    #[error("payload {key:?} holds {found}, expected {expected}")]
    PayloadType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown event type: {0}")]
    UnknownEventType(u8),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("event json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} listener(s) failed: {}", .0.len(), join_failures(.0))]
    Listeners(Vec<ListenerFailure>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn join_failures(failures: &[ListenerFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
