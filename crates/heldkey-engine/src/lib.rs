//! Hold-to-run input automation engine.
//!
//! The engine binds hotkey ids to actions that run while their trigger key is
//! held: key spam, mouse click cycles, key jitter, and a panic action that
//! cancels everything else. Events arrive through a [`HookAdapter`] fed by a
//! platform [`HookBackend`]; a dispatcher thread matches them against the
//! registry and starts one worker thread per active hotkey. All waits are
//! cancellable with millisecond resolution, and a fail-open breaker guarantees
//! the hook can never wedge the user's input if the engine misbehaves.

mod dispatcher;
mod error;
mod hook;
mod key_state;
mod registry;
mod runner;
mod timed_wait;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use tracing::{info, warn};

pub use error::{Error, Result};
pub use hook::{HookAdapter, HookBackend, NullBackend, OutputSink};
pub use key_state::KeyStateTracker;
pub use registry::HotkeyDef;
pub use runner::{ActionSpec, CancelToken, JITTER_MAX_KEYS};
pub use timed_wait::{WaitProfile, wait_cancellable, wait_with_profile};

use dispatcher::InputEvent;
use hook::FailSafe;
use registry::Registry;
use runner::{RunnerSet, STOP_POLL_INTERVAL_MS, STOP_WAIT_TIMEOUT_MS};

/// Capacity of the hook-to-dispatcher event queue. Sends never block; a full
/// queue is an error counted by the fail-safe.
const EVENT_QUEUE_CAP: usize = 512;

/// Context predicate: actions run only while this returns `true`.
pub type ContextFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// One-shot callback receiving the next key-down name during capture.
pub type CaptureFn = Box<dyn Fn(&str) + Send>;

/// State shared between the engine facade, the hook adapter, the dispatcher
/// thread, and every action worker. Owned behind one `Arc`; there are no
/// process-global singletons.
pub(crate) struct EngineShared {
    pub(crate) keys: KeyStateTracker,
    pub(crate) registry: Registry,
    pub(crate) runners: RunnerSet,
    pub(crate) context: ContextFn,
    pub(crate) output: Arc<dyn OutputSink>,
    /// Whether bound events are suppressed from the rest of the system.
    pub(crate) suppress: AtomicBool,
    pub(crate) shutdown: AtomicBool,
    pub(crate) failsafe: FailSafe,
    pub(crate) capture: Mutex<Option<CaptureFn>>,
    pub(crate) events_tx: Sender<InputEvent>,
    events_rx: Mutex<Option<Receiver<InputEvent>>>,
}

impl EngineShared {
    pub(crate) fn context_allows(&self) -> bool {
        (self.context)()
    }

    pub(crate) fn capture_active(&self) -> bool {
        self.capture.lock().is_some()
    }
}

/// Engine facade: construction, registry edits, lifecycle, and capture.
pub struct Engine {
    shared: Arc<EngineShared>,
    adapter: Arc<HookAdapter>,
    backend: Arc<dyn HookBackend>,
    dispatcher: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine around a context predicate, an output sink, and a
    /// hook backend. Nothing runs until [`Engine::start`].
    pub fn new(context: ContextFn, output: Arc<dyn OutputSink>, backend: Arc<dyn HookBackend>) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_CAP);
        let shared = Arc::new(EngineShared {
            keys: KeyStateTracker::new(),
            registry: Registry::new(),
            runners: RunnerSet::new(),
            context,
            output,
            suppress: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            failsafe: FailSafe::new(),
            capture: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        });
        let adapter = Arc::new(HookAdapter::new(Arc::clone(&shared)));
        Self {
            shared,
            adapter,
            backend,
            dispatcher: Mutex::new(None),
        }
    }

    /// Insert or replace a hotkey definition.
    pub fn define(&self, def: HotkeyDef) {
        self.shared.registry.define(def);
        self.refresh_blocking();
    }

    /// Rebind an existing hotkey to a new trigger key. Takes effect for the
    /// next key-down; an already-running worker keeps its old trigger.
    pub fn update_key(&self, id: &str, key_name: &str) -> Result<()> {
        self.shared.registry.update_key(id, key_name)?;
        self.refresh_blocking();
        Ok(())
    }

    /// Enable or disable an existing hotkey. Disabling does not stop a
    /// worker that is already running; use [`Engine::stop_hotkey`] for that.
    pub fn update_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        self.shared.registry.update_enabled(id, enabled)?;
        self.refresh_blocking();
        Ok(())
    }

    /// Registry mutations re-derive the blocking flag from the context, so
    /// a config edit made outside the target application leaves bound keys
    /// unsuppressed until the context allows again.
    fn refresh_blocking(&self) {
        self.set_key_blocking(self.shared.context_allows());
    }

    /// Whether the named key or button is physically down right now.
    pub fn is_pressed(&self, name: &str) -> bool {
        self.shared.keys.is_down(name)
    }

    /// Request cancellation of the worker for `id`, if one is running.
    pub fn stop_hotkey(&self, id: &str) {
        self.shared.runners.cancel(id);
    }

    /// Whether a worker for `id` is currently running.
    pub fn is_running(&self, id: &str) -> bool {
        self.shared.runners.is_running(id)
    }

    /// Arm (or with `None`, disarm) the one-shot key-capture callback. While
    /// armed, the next key-down is delivered to the callback instead of
    /// starting actions, and no events are suppressed.
    pub fn set_capture_callback(&self, callback: Option<CaptureFn>) {
        *self.shared.capture.lock() = callback;
    }

    /// Control whether bound key events are suppressed from the rest of the
    /// system. Forced off permanently once the fail-safe has tripped.
    pub fn set_key_blocking(&self, blocking: bool) {
        if blocking && self.shared.failsafe.is_tripped() {
            warn!("fail-safe tripped, key blocking stays off");
            return;
        }
        self.shared.suppress.store(blocking, Ordering::SeqCst);
    }

    /// Whether bound key events are currently suppressed.
    pub fn is_blocking(&self) -> bool {
        self.shared.suppress.load(Ordering::SeqCst)
    }

    /// The adapter the hook backend (or a test harness) feeds events into.
    pub fn adapter(&self) -> Arc<HookAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Start the dispatcher thread and install the hook. May be called once.
    pub fn start(&self) -> Result<()> {
        let events_rx = self
            .shared
            .events_rx
            .lock()
            .take()
            .ok_or(Error::AlreadyStarted)?;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("heldkey-dispatch".to_string())
            .spawn(move || dispatcher::run(&shared, &events_rx))
            .map_err(|err| Error::Msg(format!("failed to spawn dispatcher: {err}")))?;
        *self.dispatcher.lock() = Some(handle);
        self.backend.install(self.adapter())?;
        info!("engine started");
        Ok(())
    }

    /// Stop everything: cancel workers, stop the dispatcher, remove the hook.
    ///
    /// Workers are cancelled and joined within a bounded budget before the
    /// hook comes out, so no synthetic input is emitted after `stop` returns
    /// into a system that no longer observes it.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.runners.shutdown();
        self.backend.remove();
        if let Some(handle) = self.dispatcher.lock().take() {
            let deadline = Instant::now() + Duration::from_millis(STOP_WAIT_TIMEOUT_MS * 4);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(STOP_POLL_INTERVAL_MS));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("dispatcher did not stop within budget, detaching");
            }
        }
        info!("engine stopped");
    }
}
