//! # storage-lock-events
//!
//! Event model for instrumenting a storage-backed distributed lock client.
//!
//! Provides events organized into fork trees, timestamped actions with
//! typed payloads, a listener contract for fan-out on publish, and
//! OpenTelemetry/tracing setup for the ambient logging of the core itself.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod listener;
pub mod lock_info;
pub mod telemetry;

pub use action::{Action, BoundError, PayloadValue, RecordedError};
pub use context::PublishContext;
pub use error::{Error, Result};
pub use event::{EVENT_ID_PREFIX, Event, EventLink, EventType};
pub use listener::{Listener, ListenerFailure, ListenerFn};
pub use lock_info::LockInformation;
