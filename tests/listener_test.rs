//! Integration tests for listeners and publish fan-out.

use std::sync::{Arc, Mutex};

use storage_lock_events::{Error, Event, EventType, Listener, ListenerFn, PublishContext};

type Log = Arc<Mutex<Vec<String>>>;

/// A listener that records its own name plus the published event's id.
fn recorder(name: &str, log: &Log) -> Arc<dyn Listener> {
    let log = Arc::clone(log);
    let tag = name.to_string();
    Arc::new(ListenerFn::new(
        name,
        move |_ctx: &PublishContext, event: &Event| -> anyhow::Result<()> {
            log.lock().unwrap().push(format!("{tag}:{}", event.id()));
            Ok(())
        },
    ))
}

fn failing(name: &str, log: &Log) -> Arc<dyn Listener> {
    let log = Arc::clone(log);
    let tag = name.to_string();
    Arc::new(ListenerFn::new(
        name,
        move |_ctx: &PublishContext, _event: &Event| -> anyhow::Result<()> {
            log.lock().unwrap().push(tag.clone());
            anyhow::bail!("sink unavailable")
        },
    ))
}

fn names(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .map(|entry| entry.split(':').next().unwrap_or_default().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

#[test]
fn listener_fn_exposes_name_and_calls_closure() {
    let log = Log::default();
    let listener = recorder("metrics", &log);
    assert_eq!(listener.name(), "metrics");

    let event = Event::new("L1");
    listener.on(&PublishContext::background(), &event).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![format!("metrics:{}", event.id())]);
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[test]
fn publish_sets_end_time_when_missing() {
    let mut event = Event::new("L1");
    assert!(event.end_time().is_none());
    event.publish(&PublishContext::background(), &[]).unwrap();
    assert!(event.end_time().is_some());
}

#[test]
fn publish_keeps_explicit_end_time() {
    let mut event = Event::new("L1");
    event.end();
    let end = event.end_time();
    std::thread::sleep(std::time::Duration::from_millis(2));
    event.publish(&PublishContext::background(), &[]).unwrap();
    assert_eq!(event.end_time(), end);
}

#[test]
fn publish_calls_bound_then_extra_listeners_in_order() {
    let log = Log::default();
    let mut event = Event::new("L1");
    event
        .add_listener(recorder("bound-1", &log))
        .add_listener(recorder("bound-2", &log));

    let extra_1 = recorder("extra-1", &log);
    let extra_2 = recorder("extra-2", &log);
    event
        .publish(&PublishContext::background(), &[&*extra_1, &*extra_2])
        .unwrap();

    assert_eq!(names(&log), vec!["bound-1", "bound-2", "extra-1", "extra-2"]);
    assert!(
        log.lock()
            .unwrap()
            .iter()
            .all(|entry| entry.ends_with(event.id()))
    );
}

#[test]
fn set_and_clear_listeners() {
    let log = Log::default();
    let mut event = Event::new("L1");
    event.add_listener(recorder("old", &log));
    event.set_listeners(vec![recorder("a", &log), recorder("b", &log)]);
    assert_eq!(event.listeners().len(), 2);

    event.publish(&PublishContext::background(), &[]).unwrap();
    assert_eq!(names(&log), vec!["a", "b"]);

    event.clear_listeners();
    assert!(event.listeners().is_empty());
}

#[test]
fn failing_listener_does_not_stop_the_rest() {
    let log = Log::default();
    let mut event = Event::new("L1");
    event
        .add_listener(recorder("first", &log))
        .add_listener(failing("broken", &log))
        .add_listener(recorder("last", &log));
    let extra = failing("broken-extra", &log);

    let err = event
        .publish(&PublishContext::background(), &[&*extra])
        .unwrap_err();

    assert_eq!(names(&log), vec!["first", "broken", "last", "broken-extra"]);
    match err {
        Error::Listeners(failures) => {
            let failed: Vec<&str> = failures.iter().map(|f| f.listener.as_str()).collect();
            assert_eq!(failed, vec!["broken", "broken-extra"]);
            assert_eq!(failures[0].error.to_string(), "sink unavailable");
        }
        other => panic!("expected Listeners error, got {other:?}"),
    }
    assert!(event.end_time().is_some());
}

#[test]
fn listener_failure_error_message_names_listeners() {
    let log = Log::default();
    let mut event = Event::new("L1");
    event.add_listener(failing("broken", &log));
    let err = event
        .publish(&PublishContext::background(), &[])
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("1 listener(s) failed"), "{message}");
    assert!(message.contains("broken"), "{message}");
}

#[test]
fn listeners_receive_the_publish_context() {
    let seen = Arc::new(Mutex::new(None));
    let seen_in = Arc::clone(&seen);
    let listener = ListenerFn::new(
        "ctx",
        move |ctx: &PublishContext, _event: &Event| -> anyhow::Result<()> {
            *seen_in.lock().unwrap() = Some(ctx.is_done());
            Ok(())
        },
    );

    let ctx = PublishContext::background();
    ctx.cancel();
    let mut event = Event::new("L1");
    event.publish(&ctx, &[&listener]).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(true));
}

// ---------------------------------------------------------------------------
// Fork + listeners
// ---------------------------------------------------------------------------

#[test]
fn fork_shares_parent_listeners() {
    let log = Log::default();
    let mut parent = Event::new("L1");
    parent.add_listener(recorder("shared", &log));

    let mut child = parent.fork();
    assert_eq!(child.listeners().len(), 1);
    assert!(Arc::ptr_eq(&child.listeners()[0], &parent.listeners()[0]));

    child.publish(&PublishContext::background(), &[]).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![format!("shared:{}", child.id())]);
}

#[test]
fn adding_listener_to_fork_leaves_parent_sequence_alone() {
    let log = Log::default();
    let mut parent = Event::new("L1");
    parent.add_listener(recorder("shared", &log));

    let mut child = parent.fork();
    child.add_listener(recorder("child-only", &log));
    assert_eq!(child.listeners().len(), 2);
    assert_eq!(parent.listeners().len(), 1);

    child.clear_listeners();
    assert_eq!(parent.listeners().len(), 1);
}

#[test]
fn scenario_publish_forked_renew_event() {
    let received: Arc<Mutex<Vec<Event>>> = Arc::default();
    let sink = Arc::clone(&received);
    let listener = ListenerFn::new(
        "L",
        move |_ctx: &PublishContext, event: &Event| -> anyhow::Result<()> {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        },
    );

    let mut e1 = Event::new("L1");
    e1.set_type(EventType::Lock).append_action_by_name("acquire");
    let mut e2 = e1.fork();
    e2.append_action_by_name("renew");
    e2.publish(&PublishContext::background(), &[&listener])
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let got = &received[0];
    assert_eq!(got.root_id(), e1.id());
    assert_eq!(got.get_parent_id(), e1.id());
    let actions: Vec<&str> = got.actions().iter().map(|a| a.name.as_str()).collect();
    assert_eq!(actions, vec!["renew"]);
    assert!(got.end_time().is_some());
}
