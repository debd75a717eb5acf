//! Hook-facing adapter and the fail-open safety mechanism.
//!
//! The platform hook (or a test harness) feeds raw key and mouse events into
//! [`HookAdapter`]; the adapter normalizes them, updates pressed state,
//! enqueues downs for the dispatcher, and tells the hook whether to suppress
//! the event. Any error on this path counts toward a threshold; reaching it
//! trips the adapter into a permanent pass-through mode so a broken engine
//! can never swallow the user's keyboard.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam_channel::TrySendError;
use keyname::MouseButton;
use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::{EngineShared, Error, Result, dispatcher::InputEvent};

/// Consecutive-lifetime error count at which the adapter fails open.
pub(crate) const ERROR_THRESHOLD: u32 = 10;
/// Minimum interval between logged hook errors.
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Emits synthetic input: taps and button transitions produced by actions.
///
/// Implementations treat key names they cannot map as no-ops, never errors;
/// a misconfigured output key must not stop an action loop.
pub trait OutputSink: Send + Sync {
    /// Press and release `key` once.
    fn press_tap(&self, key: &str);
    /// Press `button` down without releasing.
    fn button_down(&self, button: MouseButton);
    /// Release `button`.
    fn button_up(&self, button: MouseButton);
}

/// Installs and removes the platform input hook.
///
/// The backend owns whatever OS resources the hook needs and calls back into
/// the [`HookAdapter`] it was given for every event.
pub trait HookBackend: Send + Sync {
    /// Install the hook, routing events to `adapter`.
    fn install(&self, adapter: Arc<HookAdapter>) -> Result<()>;
    /// Remove the hook. Must be idempotent.
    fn remove(&self);
}

/// Backend that installs nothing. Used headless and in tests, where events
/// are fed straight into the adapter.
pub struct NullBackend;

impl HookBackend for NullBackend {
    fn install(&self, _adapter: Arc<HookAdapter>) -> Result<()> {
        Ok(())
    }

    fn remove(&self) {}
}

/// Error accounting for the hook path.
///
/// Trips once and never resets: a hook that has started failing is assumed
/// unreliable for the rest of the process lifetime.
pub(crate) struct FailSafe {
    errors: AtomicU32,
    tripped: AtomicBool,
    last_log: Mutex<Option<Instant>>,
}

impl FailSafe {
    pub(crate) fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
            last_log: Mutex::new(None),
        }
    }

    /// Record one error. Returns `true` on the call that trips the breaker.
    pub(crate) fn note_error(&self, source: &str, err: &Error) -> bool {
        let count = self.errors.fetch_add(1, Ordering::SeqCst) + 1;

        let mut last = self.last_log.lock();
        if last.is_none_or(|at| at.elapsed() >= ERROR_LOG_INTERVAL) {
            warn!(source, count, error = %err, "hook processing error");
            *last = Some(Instant::now());
        }
        drop(last);

        if count >= ERROR_THRESHOLD && !self.tripped.swap(true, Ordering::SeqCst) {
            error!(
                source,
                count, "hook error threshold reached, failing open: all events now pass through"
            );
            return true;
        }
        false
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// The event-ingestion surface handed to the hook backend.
///
/// Both entry points return whether the hook should suppress the event from
/// the rest of the system. Errors never escape to the hook: they are counted
/// by the fail-safe and the event passes through.
pub struct HookAdapter {
    shared: Arc<EngineShared>,
}

impl HookAdapter {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// Ingest a keyboard transition. Returns `true` to suppress.
    pub fn on_key_event(&self, name: &str, down: bool) -> bool {
        self.dispatch("key", name, down, false)
    }

    /// Ingest a mouse-button transition. Returns `true` to suppress.
    pub fn on_mouse_event(&self, name: &str, down: bool) -> bool {
        self.dispatch("mouse", name, down, true)
    }

    fn dispatch(&self, source: &str, name: &str, down: bool, is_mouse: bool) -> bool {
        match self.process(name, down, is_mouse) {
            Ok(suppress) => suppress,
            Err(err) => {
                self.shared.failsafe.note_error(source, &err);
                if self.shared.failsafe.is_tripped() {
                    self.shared.suppress.store(false, Ordering::SeqCst);
                }
                false
            }
        }
    }

    fn process(&self, name: &str, down: bool, is_mouse: bool) -> Result<bool> {
        // Once tripped, do nothing but pass events through.
        if self.shared.failsafe.is_tripped() {
            return Ok(false);
        }

        let norm = keyname::normalize(name);

        if is_mouse && let Some(button) = MouseButton::from_spec(&norm) {
            // Button state is tracked unconditionally; click actions consult
            // it even when no hotkey is bound to a button.
            self.shared.keys.set_button(button, down);
        }

        // Capture mode sees every down event, bound or not, and never
        // suppresses: the user is telling the configurator which key they
        // pressed, not invoking it.
        if self.shared.capture_active() {
            if down {
                trace!(key = %norm, "forwarding event to capture");
                self.enqueue(norm)?;
            }
            return Ok(false);
        }

        if !self.shared.registry.bound_keys().contains(&norm) {
            return Ok(false);
        }

        self.shared.keys.set_key_down(&norm, down);
        if down {
            self.enqueue(norm)?;
        }
        Ok(self.shared.suppress.load(Ordering::SeqCst))
    }

    fn enqueue(&self, name: String) -> Result<()> {
        self.shared
            .events_tx
            .try_send(InputEvent { name })
            .map_err(|err| match err {
                TrySendError::Full(_) => Error::QueueFull,
                TrySendError::Disconnected(_) => Error::QueueClosed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failsafe_trips_exactly_once_at_threshold() {
        let fs = FailSafe::new();
        let err = Error::QueueClosed;
        for _ in 0..ERROR_THRESHOLD - 1 {
            assert!(!fs.note_error("key", &err));
            assert!(!fs.is_tripped());
        }
        assert!(fs.note_error("key", &err));
        assert!(fs.is_tripped());
        // Further errors are counted but do not re-trip.
        assert!(!fs.note_error("key", &err));
        assert!(fs.is_tripped());
    }
}
