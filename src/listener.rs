//! Listener contract and the closure adapter.
//!
//! A listener is invoked synchronously, once per published event. Failures
//! are reported through the returned `Result`; [`Event::publish`] runs every
//! listener regardless and hands the failures back together.
//!
//! [`Event::publish`]: crate::Event::publish

use std::fmt;

use crate::context::PublishContext;
use crate::event::Event;

pub trait Listener: Send + Sync {
    /// Distinguishes this listener among the ones bound to an event.
    fn name(&self) -> &str;

    fn on(&self, ctx: &PublishContext, event: &Event) -> anyhow::Result<()>;
}

/// Adapts a name and a closure into a [`Listener`].
pub struct ListenerFn<F> {
    name: String,
    func: F,
}

impl<F> ListenerFn<F>
where
    F: Fn(&PublishContext, &Event) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Listener for ListenerFn<F>
where
    F: Fn(&PublishContext, &Event) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&self, ctx: &PublishContext, event: &Event) -> anyhow::Result<()> {
        (self.func)(ctx, event)
    }
}

impl<F> fmt::Debug for ListenerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerFn").field("name", &self.name).finish()
    }
}

/// A listener that returned an error during publish.
#[derive(Debug)]
pub struct ListenerFailure {
    pub listener: String,
    pub error: anyhow::Error,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener {:?}: {:#}", self.listener, self.error)
    }
}
