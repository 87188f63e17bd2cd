//! Actions: timestamped sub-steps recorded inside an event.
//!
//! An action carries a name, start/end timestamps, at most one error and
//! a free-form payload map. Setters mutate in place and return `&mut Self`
//! so calls can be chained.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Well-known action names shared by the lock client and the listeners
/// that match on them.
pub mod names {
    pub const STORAGE_INIT: &str = "Storage.Init";
    pub const STORAGE_GET: &str = "Storage.Get";
    pub const STORAGE_CREATE_WITH_VERSION: &str = "Storage.CreateWithVersion";
    pub const STORAGE_UPDATE_WITH_VERSION: &str = "Storage.UpdateWithVersion";
    pub const STORAGE_DELETE_WITH_VERSION: &str = "Storage.DeleteWithVersion";
    pub const STORAGE_GET_TIME: &str = "Storage.GetTime";
    pub const STORAGE_LIST: &str = "Storage.List";
    pub const STORAGE_CLOSE: &str = "Storage.Close";
    pub const LOCK_RETRY: &str = "Lock.Retry";
    pub const LOCK_REENTRY: &str = "Lock.Reentry";
    pub const WATCH_DOG_START: &str = "WatchDog.Start";
    pub const WATCH_DOG_REFRESH: &str = "WatchDog.Refresh";
    pub const WATCH_DOG_STOP: &str = "WatchDog.Stop";
}

// ---------------------------------------------------------------------------
// Errors bound to records
// ---------------------------------------------------------------------------

/// An error attached to an [`Action`] or [`Event`](crate::Event) as data.
///
/// Cloning shares the underlying error. Serializes as its message only;
/// deserialized errors come back as [`RecordedError`].
#[derive(Clone)]
pub struct BoundError(Arc<dyn StdError + Send + Sync + 'static>);

impl BoundError {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    pub fn message(&self) -> String {
        self.0.to_string()
    }

    /// Borrow the bound error as a trait object.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }

    /// Walks the `source()` chain looking for an error of type `E` equal
    /// to `target`.
    pub fn is<E>(&self, target: &E) -> bool
    where
        E: StdError + PartialEq + 'static,
    {
        let root: &(dyn StdError + 'static) = &*self.0;
        let mut current = Some(root);
        while let Some(err) = current {
            if err.downcast_ref::<E>().is_some_and(|e| e == target) {
                return true;
            }
            current = err.source();
        }
        false
    }
}

impl<E> From<E> for BoundError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Debug for BoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundError({:?})", self.message())
    }
}

impl fmt::Display for BoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compares rendered messages; the concrete error type does not survive
/// serialization, so this is the only comparison that holds across it.
impl PartialEq for BoundError {
    fn eq(&self, other: &Self) -> bool {
        self.message() == other.message()
    }
}

impl Serialize for BoundError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.message())
    }
}

impl<'de> Deserialize<'de> for BoundError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let message = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(Self::new(RecordedError { message }))
    }
}

/// Message-only error produced when an error is read back from JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub message: String,
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for RecordedError {}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A payload entry.
///
/// Entries stored through [`Action::add_payload`] or
/// [`Action::set_payload_map`] are normalized so they equal what JSON reads
/// back. After that `Json` never wraps a bool, string or `i64`-sized number.
/// Non-finite floats are stored as `Json(Null)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl<'de> Deserialize<'de> for PayloadValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(PayloadValue::from)
    }
}

impl PayloadValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PayloadValue::Bool(_) => "bool",
            PayloadValue::Int(_) => "int",
            PayloadValue::Float(_) => "float",
            PayloadValue::String(_) => "string",
            PayloadValue::Json(_) => "json",
        }
    }

    /// Rewrite the value into its canonical form.
    pub fn normalize(self) -> Self {
        match self {
            PayloadValue::Float(f) => PayloadValue::from(f),
            PayloadValue::Json(v) => PayloadValue::from(v),
            other => other,
        }
    }
}

impl From<bool> for PayloadValue {
    fn from(v: bool) -> Self {
        PayloadValue::Bool(v)
    }
}

impl From<i64> for PayloadValue {
    fn from(v: i64) -> Self {
        PayloadValue::Int(v)
    }
}

impl From<i32> for PayloadValue {
    fn from(v: i32) -> Self {
        PayloadValue::Int(v.into())
    }
}

impl From<u32> for PayloadValue {
    fn from(v: u32) -> Self {
        PayloadValue::Int(v.into())
    }
}

impl From<f64> for PayloadValue {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            PayloadValue::Float(v)
        } else {
            PayloadValue::Json(serde_json::Value::Null)
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        PayloadValue::String(v.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(v: String) -> Self {
        PayloadValue::String(v)
    }
}

/// Scalars are unwrapped into their own variant. Integers that do not fit
/// `i64` stay as raw JSON rather than losing precision as a float.
impl From<serde_json::Value> for PayloadValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Bool(b) => PayloadValue::Bool(b),
            Value::String(s) => PayloadValue::String(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PayloadValue::Int(i),
                None if n.is_u64() => PayloadValue::Json(Value::Number(n)),
                None => n
                    .as_f64()
                    .map_or_else(|| PayloadValue::Json(Value::Number(n)), PayloadValue::Float),
            },
            other => PayloadValue::Json(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One sub-step of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(default)]
    pub err: Option<BoundError>,
    #[serde(default)]
    pub payload_map: Option<BTreeMap<String, PayloadValue>>,
}

impl Action {
    /// Create an action started now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start_time: Some(Utc::now()),
            end_time: None,
            name: name.into(),
            err: None,
            payload_map: None,
        }
    }

    /// Mark the action finished now. Calling again moves the end time.
    pub fn end(&mut self) -> &mut Self {
        self.end_time = Some(Utc::now());
        self
    }

    /// Time between start and end; zero unless both are set.
    pub fn cost(&self) -> Duration {
        elapsed(self.start_time, self.end_time)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn set_err(&mut self, err: impl Into<BoundError>) -> &mut Self {
        self.err = Some(err.into());
        self
    }

    pub fn clear_err(&mut self) -> &mut Self {
        self.err = None;
        self
    }

    pub fn err_msg(&self) -> String {
        self.err.as_ref().map(BoundError::message).unwrap_or_default()
    }

    /// True when the bound error, or anything in its source chain, equals
    /// `target`. False when no error is bound.
    pub fn error_is<E>(&self, target: &E) -> bool
    where
        E: StdError + PartialEq + 'static,
    {
        self.err.as_ref().is_some_and(|err| err.is(target))
    }

    /// Replace the payload map. Entries are normalized on the way in.
    pub fn set_payload_map(&mut self, payload: BTreeMap<String, PayloadValue>) -> &mut Self {
        self.payload_map = Some(
            payload
                .into_iter()
                .map(|(key, value)| (key, value.normalize()))
                .collect(),
        );
        self
    }

    pub fn add_payload(&mut self, key: impl Into<String>, value: impl Into<PayloadValue>) -> &mut Self {
        self.payload_map
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into().normalize());
        self
    }

    pub fn clear_payload_map(&mut self) -> &mut Self {
        self.payload_map = None;
        self
    }

    pub fn get_payload(&self, key: &str) -> Option<&PayloadValue> {
        self.payload_map.as_ref()?.get(key)
    }

    /// String payload under `key`, or `""` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadType`] if the entry is not a string.
    pub fn get_payload_as_string(&self, key: &str) -> Result<&str> {
        match self.get_payload(key) {
            None => Ok(""),
            Some(PayloadValue::String(s)) => Ok(s.as_str()),
            Some(other) => Err(type_mismatch(key, "string", other)),
        }
    }

    /// Integer payload under `key`, or `0` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadType`] if the entry is not an integer.
    pub fn get_payload_as_int(&self, key: &str) -> Result<i64> {
        match self.get_payload(key) {
            None => Ok(0),
            Some(PayloadValue::Int(i)) => Ok(*i),
            Some(other) => Err(type_mismatch(key, "int", other)),
        }
    }
}

fn type_mismatch(key: &str, expected: &'static str, found: &PayloadValue) -> Error {
    Error::PayloadType {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Duration between two optional timestamps. An end before the start is
/// clamped to zero.
pub(crate) fn elapsed(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Duration {
    let (Some(start), Some(end)) = (start, end) else {
        return Duration::ZERO;
    };
    (end - start).to_std().unwrap_or_else(|_| {
        tracing::warn!(%start, %end, "end time precedes start time, cost clamped to zero");
        Duration::ZERO
    })
}
