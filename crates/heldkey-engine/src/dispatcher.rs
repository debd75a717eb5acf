//! Dispatcher thread: drains the hook event queue and starts action workers.
//!
//! The hook callback must return in microseconds, so it only enqueues; all
//! registry lookups, context checks, and thread spawning happen here, off the
//! hook's thread.

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, trace};

use crate::{EngineShared, runner};

/// How long one `recv` blocks before re-checking the shutdown flag.
pub(crate) const POLL_TIMEOUT_MS: u64 = 100;

/// A key-down event forwarded from the hook. Names arrive already normalized.
#[derive(Debug)]
pub(crate) struct InputEvent {
    pub(crate) name: String,
}

/// Dispatcher loop body. Runs until the shutdown flag is set or the sending
/// side of the queue is dropped.
pub(crate) fn run(shared: &Arc<EngineShared>, events: &Receiver<InputEvent>) {
    trace!("dispatcher started");
    while !shared.shutdown.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(POLL_TIMEOUT_MS)) {
            Ok(event) => handle_event(shared, &event.name),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    trace!("dispatcher exited");
}

fn handle_event(shared: &Arc<EngineShared>, name: &str) {
    // A pending capture callback consumes exactly one event. Taken out of
    // the slot before invocation so the callback can re-arm capture without
    // deadlocking on the slot lock.
    let capture = shared.capture.lock().take();
    if let Some(cb) = capture {
        trace!(key = name, "delivering captured key");
        cb(name);
        return;
    }

    for (id, trigger, spec) in shared.registry.lookup(name) {
        if !shared.context_allows() {
            debug!(id = %id, key = name, "context denied, action not started");
            continue;
        }
        let worker_shared = Arc::clone(shared);
        let worker_id = id.clone();
        let started = shared.runners.spawn_if_needed(&id, move |token| {
            runner::run_action(&worker_shared, &worker_id, &trigger, &spec, &token);
        });
        if !started {
            trace!(key = name, "worker already live, repeat event ignored");
        }
    }
}
