//! Events: records of one instrumented lock operation.
//!
//! Events form a tree. A root event is created with [`Event::new`]; related
//! sub-operations are [`fork`](Event::fork)ed from it and inherit its
//! correlation fields. When the operation is over the owner calls
//! [`publish`](Event::publish), which stamps the end time if needed and
//! hands the event to every listener.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{Action, BoundError, elapsed};
use crate::context::PublishContext;
use crate::error::{Error, Result};
use crate::listener::{Listener, ListenerFailure};
use crate::lock_info::LockInformation;
use crate::telemetry::{metrics, span};

/// Prefix of every event id, so an id can be recognized on sight.
pub const EVENT_ID_PREFIX: &str = "storage-lock-event-";

/// Whether `s` looks like an id produced by this crate.
pub fn is_event_id(s: &str) -> bool {
    s.len() > EVENT_ID_PREFIX.len() && s.starts_with(EVENT_ID_PREFIX)
}

fn new_event_id() -> String {
    format!("{EVENT_ID_PREFIX}{}", Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Event type
// ---------------------------------------------------------------------------

/// What kind of lock operation an event describes. Serialized as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventType {
    #[default]
    Unknown = 0,
    CreateLock = 1,
    Lock = 2,
    Unlock = 3,
    WatchDog = 4,
}

impl From<EventType> for u8 {
    fn from(t: EventType) -> Self {
        t as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(EventType::Unknown),
            1 => Ok(EventType::CreateLock),
            2 => Ok(EventType::Lock),
            3 => Ok(EventType::Unlock),
            4 => Ok(EventType::WatchDog),
            other => Err(Error::UnknownEventType(other)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Unknown => "unknown",
            EventType::CreateLock => "create_lock",
            EventType::Lock => "lock",
            EventType::Unlock => "unlock",
            EventType::WatchDog => "watch_dog",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Parent link
// ---------------------------------------------------------------------------

/// Identity an event exposes to its forks.
///
/// Children hold it through a `Weak`, so a child never keeps its parent
/// alive. Once the parent is dropped only the child's `parent_id` remains.
#[derive(Debug)]
pub struct EventLink {
    id: String,
}

impl EventLink {
    pub fn id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    id: String,
    root_id: String,
    parent_id: Option<String>,
    lock_id: String,
    owner_id: String,
    storage_name: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    event_type: EventType,
    actions: Vec<Action>,
    watch_dog_id: String,
    lock_information: Option<Arc<LockInformation>>,
    err: Option<BoundError>,

    #[serde(skip)]
    parent: Option<Weak<EventLink>>,
    #[serde(skip)]
    listeners: Arc<Vec<Arc<dyn Listener>>>,
    #[serde(skip)]
    link: Arc<EventLink>,
}

impl Event {
    /// Create a root event bound to `lock_id`.
    pub fn new(lock_id: impl Into<String>) -> Self {
        let id = new_event_id();
        Self {
            link: Arc::new(EventLink { id: id.clone() }),
            root_id: id.clone(),
            id,
            parent_id: None,
            lock_id: lock_id.into(),
            owner_id: String::new(),
            storage_name: String::new(),
            start_time: Utc::now(),
            end_time: None,
            event_type: EventType::Unknown,
            actions: Vec::new(),
            watch_dog_id: String::new(),
            lock_information: None,
            err: None,
            parent: None,
            listeners: Arc::default(),
        }
    }

    /// Create a child event.
    ///
    /// The child gets a fresh id and start time and inherits the root id,
    /// lock id, storage name, event type, lock information and listeners.
    /// Lock information and listeners are shared with the parent, not copied.
    pub fn fork(&self) -> Event {
        let id = new_event_id();
        Self {
            link: Arc::new(EventLink { id: id.clone() }),
            id,
            root_id: self.root_id.clone(),
            parent_id: Some(self.id.clone()),
            lock_id: self.lock_id.clone(),
            owner_id: String::new(),
            storage_name: self.storage_name.clone(),
            start_time: Utc::now(),
            end_time: None,
            event_type: self.event_type,
            actions: Vec::new(),
            watch_dog_id: String::new(),
            lock_information: self.lock_information.clone(),
            err: None,
            parent: Some(Arc::downgrade(&self.link)),
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Mark the event finished now. Calling again moves the end time.
    pub fn end(&mut self) -> &mut Self {
        self.end_time = Some(Utc::now());
        self
    }

    /// Time between start and end; zero until the event has ended.
    pub fn cost(&self) -> Duration {
        elapsed(Some(self.start_time), self.end_time)
    }

    // --- accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// The explicit parent id, if one is set.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// The parent's link, while the parent is still alive.
    pub fn parent(&self) -> Option<Arc<EventLink>> {
        self.parent.as_ref()?.upgrade()
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn watch_dog_id(&self) -> &str {
        &self.watch_dog_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The most recently appended action, e.g. to end it once its step is done.
    pub fn last_action_mut(&mut self) -> Option<&mut Action> {
        self.actions.last_mut()
    }

    pub fn lock_information(&self) -> Option<&Arc<LockInformation>> {
        self.lock_information.as_ref()
    }

    pub fn err(&self) -> Option<&BoundError> {
        self.err.as_ref()
    }

    pub fn err_msg(&self) -> String {
        self.err.as_ref().map(BoundError::message).unwrap_or_default()
    }

    pub fn listeners(&self) -> &[Arc<dyn Listener>] {
        &self.listeners
    }

    // --- setters ---

    pub fn set_root_id(&mut self, root_id: impl Into<String>) -> &mut Self {
        self.root_id = root_id.into();
        self
    }

    pub fn set_storage_name(&mut self, storage_name: impl Into<String>) -> &mut Self {
        self.storage_name = storage_name.into();
        self
    }

    pub fn set_lock_id(&mut self, lock_id: impl Into<String>) -> &mut Self {
        self.lock_id = lock_id.into();
        self
    }

    pub fn set_owner_id(&mut self, owner_id: impl Into<String>) -> &mut Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn set_type(&mut self, event_type: EventType) -> &mut Self {
        self.event_type = event_type;
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

    pub fn set_watch_dog_id(&mut self, watch_dog_id: impl Into<String>) -> &mut Self {
        self.watch_dog_id = watch_dog_id.into();
        self
    }

    pub fn set_lock_information(
        &mut self,
        info: impl Into<Option<Arc<LockInformation>>>,
    ) -> &mut Self {
        self.lock_information = info.into();
        self
    }

    pub fn clear_lock_information(&mut self) -> &mut Self {
        self.lock_information = None;
        self
    }

    /// Link this event under `parent`, setting both the id and the weak link.
    pub fn set_parent(&mut self, parent: &Event) -> &mut Self {
        self.parent_id = Some(parent.id.clone());
        self.parent = Some(Arc::downgrade(&parent.link));
        self
    }

    /// Override the explicit parent id without touching the weak link.
    pub fn set_parent_id(&mut self, parent_id: Option<String>) -> &mut Self {
        self.parent_id = parent_id;
        self
    }

    // --- actions ---

    pub fn append_action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    /// Append a bare action that only records its name and start time.
    pub fn append_action_by_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.actions.push(Action::new(name));
        self
    }

    /// Replace the whole action list.
    pub fn set_actions(&mut self, actions: Vec<Action>) -> &mut Self {
        self.actions = actions;
        self
    }

    pub fn clear_actions(&mut self) -> &mut Self {
        self.actions.clear();
        self
    }

    // --- listeners ---

    pub fn set_listeners(&mut self, listeners: Vec<Arc<dyn Listener>>) -> &mut Self {
        self.listeners = Arc::new(listeners);
        self
    }

    /// Bind one more listener. A sequence shared with a parent or fork is
    /// copied first, so the other events keep theirs unchanged.
    pub fn add_listener(&mut self, listener: Arc<dyn Listener>) -> &mut Self {
        Arc::make_mut(&mut self.listeners).push(listener);
        self
    }

    pub fn clear_listeners(&mut self) -> &mut Self {
        self.listeners = Arc::default();
        self
    }

    // --- tree ---

    pub fn is_root_event(&self) -> bool {
        self.parent.is_none() && self.parent_id.as_deref().is_none_or(str::is_empty)
    }

    /// The explicit parent id, else the linked parent's id, else `""`.
    pub fn get_parent_id(&self) -> String {
        if let Some(id) = self.parent_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        self.parent()
            .map(|link| link.id.clone())
            .unwrap_or_default()
    }

    // --- publish ---

    /// Finish the event and notify listeners.
    ///
    /// Sets the end time if it is unset, then calls every bound listener in
    /// order followed by every listener in `extra` in order, each exactly
    /// once, on the calling thread. A failing listener does not stop the
    /// rest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Listeners`] with every failure, in invocation order.
    pub fn publish(&mut self, ctx: &PublishContext, extra: &[&dyn Listener]) -> Result<()> {
        if self.end_time.is_none() {
            self.end();
        }
        let event = &*self;

        let span = span::start_publish_span(event, event.listeners.len() + extra.len());
        let _entered = span.enter();
        if ctx.is_done() {
            tracing::debug!("publishing with a cancelled or expired context");
        }

        let mut failures = Vec::new();
        for listener in event.listeners.iter() {
            notify(listener.as_ref(), ctx, event, &mut failures);
        }
        for listener in extra {
            notify(*listener, ctx, event, &mut failures);
        }

        let labels = [KeyValue::new("event_type", event.event_type.to_string())];
        metrics::events_published().add(1, &labels);
        metrics::event_duration_ms().record(event.cost().as_secs_f64() * 1000.0, &labels);
        span::record_failures(&span, failures.len());

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Listeners(failures))
        }
    }

    // --- json ---

    /// Serialize to JSON, or `""` if serialization fails.
    pub fn to_json_string(&self) -> String {
        self.to_json_string_strict().unwrap_or_default()
    }

    pub fn to_json_string_strict(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an event from JSON. The result has no parent link and no
    /// listeners; `parent_id` and `root_id` carry the tree linkage.
    pub fn from_json_str(json: &str) -> Result<Event> {
        Ok(serde_json::from_str(json)?)
    }
}

fn notify(
    listener: &dyn Listener,
    ctx: &PublishContext,
    event: &Event,
    failures: &mut Vec<ListenerFailure>,
) {
    if let Err(error) = listener.on(ctx, event) {
        tracing::warn!(listener = listener.name(), error = %format!("{error:#}"), "listener failed");
        metrics::listener_failures().add(1, &[KeyValue::new("listener", listener.name().to_string())]);
        failures.push(ListenerFailure {
            listener: listener.name().to_string(),
            error,
        });
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: Vec<&str> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("root_id", &self.root_id)
            .field("parent_id", &self.parent_id)
            .field("lock_id", &self.lock_id)
            .field("owner_id", &self.owner_id)
            .field("storage_name", &self.storage_name)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("event_type", &self.event_type)
            .field("actions", &self.actions)
            .field("watch_dog_id", &self.watch_dog_id)
            .field("lock_information", &self.lock_information)
            .field("err", &self.err)
            .field("listeners", &listeners)
            .finish()
    }
}

/// Wire form of an event, validated into [`Event`] on deserialize.
#[derive(Deserialize)]
struct EventRecord {
    id: String,
    #[serde(default)]
    root_id: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    lock_id: String,
    #[serde(default)]
    owner_id: String,
    #[serde(default)]
    storage_name: String,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    event_type: EventType,
    #[serde(default)]
    actions: Option<Vec<Action>>,
    #[serde(default)]
    watch_dog_id: String,
    #[serde(default)]
    lock_information: Option<Arc<LockInformation>>,
    #[serde(default)]
    err: Option<BoundError>,
}

impl TryFrom<EventRecord> for Event {
    type Error = Error;

    fn try_from(r: EventRecord) -> Result<Self> {
        if r.id.is_empty() {
            return Err(Error::InvalidEvent("event id is empty".to_string()));
        }
        let root_id = if r.root_id.is_empty() {
            r.id.clone()
        } else {
            r.root_id
        };
        // A missing start collapses onto the end so cost() reads zero.
        let start_time = r
            .start_time
            .or(r.end_time)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(Self {
            link: Arc::new(EventLink { id: r.id.clone() }),
            id: r.id,
            root_id,
            parent_id: r.parent_id.filter(|id| !id.is_empty()),
            lock_id: r.lock_id,
            owner_id: r.owner_id,
            storage_name: r.storage_name,
            start_time,
            end_time: r.end_time,
            event_type: r.event_type,
            actions: r.actions.unwrap_or_default(),
            watch_dog_id: r.watch_dog_id,
            lock_information: r.lock_information,
            err: r.err,
            parent: None,
            listeners: Arc::default(),
        })
    }
}
