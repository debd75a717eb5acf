//! Per-hotkey action workers: the action set, cancellation tokens, and the
//! worker-slot bookkeeping that guarantees at most one live loop per hotkey.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use keyname::MouseButton;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{EngineShared, hook::OutputSink, timed_wait::wait_cancellable};

/// Maximum time to wait for worker threads to acknowledge cancellation.
pub(crate) const STOP_WAIT_TIMEOUT_MS: u64 = 50;
/// Poll interval used while waiting for worker threads to finish.
pub(crate) const STOP_POLL_INTERVAL_MS: u64 = 2;

/// Jitter actions tap at most this many keys per cycle.
pub const JITTER_MAX_KEYS: usize = 5;

/// What a hotkey does while its trigger is held.
///
/// One tagged variant per action kind, interpreted by a single dispatch
/// function, so the whole action set is data and exhaustively testable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ActionSpec {
    /// Tap `output_key` every `delay_ms` while the trigger is held.
    Spam {
        /// Key to tap on every iteration.
        output_key: String,
        /// Delay between taps, in milliseconds.
        delay_ms: u64,
    },
    /// Hold and release a mouse button in a fixed cycle.
    ClickSequence {
        /// Button to hold.
        button: MouseButton,
        /// How long to hold the button per cycle.
        hold_ms: u64,
        /// Pause between release and the next hold.
        gap_ms: u64,
    },
    /// Tap each configured key in order with the same inter-tap delay.
    /// Only the first [`JITTER_MAX_KEYS`] keys are used.
    Jitter {
        /// Keys to cycle through.
        keys: Vec<String>,
        /// Delay between taps, in milliseconds.
        delay_ms: u64,
    },
    /// Cancel every other live action immediately. Not a loop.
    Panic,
}

/// Cooperative one-way cancellation signal shared between a worker loop and
/// everything that may stop it (release detection, panic, shutdown).
///
/// Setting an already-cancelled token is a no-op; a token is never reset.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent and terminal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A live worker: its token plus the thread handle used for bounded joins.
struct RunSlot {
    token: CancelToken,
    handle: thread::JoinHandle<()>,
}

/// Per-hotkey worker slots. At most one live slot per id at any instant.
pub(crate) struct RunnerSet {
    slots: Mutex<HashMap<String, RunSlot>>,
}

impl RunnerSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Start a worker for `id` unless one is still alive. The check-and-set
    /// happens under one lock, so two rapid repeat events for the same key
    /// cannot start two competing loops. Returns whether a worker started.
    pub(crate) fn spawn_if_needed(
        &self,
        id: &str,
        run: impl FnOnce(CancelToken) + Send + 'static,
    ) -> bool {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(id)
            && !slot.handle.is_finished()
        {
            return false;
        }
        let token = CancelToken::new();
        let worker_token = token.clone();
        match thread::Builder::new()
            .name(format!("action-{id}"))
            .spawn(move || run(worker_token))
        {
            Ok(handle) => {
                slots.insert(id.to_string(), RunSlot { token, handle });
                true
            }
            Err(err) => {
                warn!(id, error = %err, "failed to spawn action thread");
                false
            }
        }
    }

    /// Request cancellation of the worker for `id`, if one is live.
    pub(crate) fn cancel(&self, id: &str) {
        if let Some(slot) = self.slots.lock().get(id) {
            slot.token.cancel();
        }
    }

    /// Request cancellation of every live worker except `keep`.
    pub(crate) fn cancel_others(&self, keep: &str) {
        for (id, slot) in self.slots.lock().iter() {
            if id != keep {
                slot.token.cancel();
            }
        }
    }

    /// Whether a worker for `id` is currently alive.
    pub(crate) fn is_running(&self, id: &str) -> bool {
        self.slots
            .lock()
            .get(id)
            .is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Cancel every worker and wait, within a bounded budget, for the threads
    /// to exit. Threads still running past the budget are detached; they exit
    /// on their own at the next cancellation check.
    pub(crate) fn shutdown(&self) {
        let slots: Vec<RunSlot> = {
            let mut map = self.slots.lock();
            map.drain().map(|(_, slot)| slot).collect()
        };
        for slot in &slots {
            slot.token.cancel();
        }
        let deadline = Instant::now() + Duration::from_millis(STOP_WAIT_TIMEOUT_MS);
        for slot in slots {
            while !slot.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(STOP_POLL_INTERVAL_MS));
            }
            if slot.handle.is_finished() {
                let _ = slot.handle.join();
            }
        }
        trace!("runner shutdown complete");
    }
}

/// Run predicate shared by every loop: cancelled, trigger released, or
/// context withdrawn all stop the action. Evaluated fresh on every call,
/// never cached across a wait.
fn should_run(shared: &EngineShared, trigger: &str, token: &CancelToken) -> bool {
    !token.is_cancelled() && shared.keys.is_down(trigger) && shared.context_allows()
}

/// Tiered wait bound to the run predicate. Returns `false` as soon as the
/// predicate fails, `true` only if the full duration elapsed.
fn wait_run(shared: &EngineShared, ms: u64, trigger: &str, token: &CancelToken) -> bool {
    wait_cancellable(ms, || {
        token.is_cancelled() || !shared.keys.is_down(trigger) || !shared.context_allows()
    })
}

/// Entry point for every worker thread: interpret the action spec.
pub(crate) fn run_action(
    shared: &EngineShared,
    id: &str,
    trigger: &str,
    spec: &ActionSpec,
    token: &CancelToken,
) {
    trace!(id, trigger, "action started");
    match spec {
        ActionSpec::Spam {
            output_key,
            delay_ms,
        } => run_spam(shared, trigger, output_key, *delay_ms, token),
        ActionSpec::ClickSequence {
            button,
            hold_ms,
            gap_ms,
        } => run_click(shared, trigger, *button, *hold_ms, *gap_ms, token),
        ActionSpec::Jitter { keys, delay_ms } => {
            run_jitter(shared, trigger, keys, *delay_ms, token);
        }
        ActionSpec::Panic => run_panic(shared, id),
    }
    trace!(id, "action finished");
}

fn run_spam(shared: &EngineShared, trigger: &str, output_key: &str, delay_ms: u64, token: &CancelToken) {
    while should_run(shared, trigger, token) {
        shared.output.press_tap(output_key);
        if !wait_run(shared, delay_ms, trigger, token) {
            break;
        }
    }
}

/// Releases the bound button when dropped, so every exit path out of a click
/// loop (cancellation, break, or panic) leaves the button up.
struct ReleaseGuard<'a> {
    output: &'a dyn OutputSink,
    button: MouseButton,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.output.button_up(self.button);
    }
}

fn run_click(
    shared: &EngineShared,
    trigger: &str,
    button: MouseButton,
    hold_ms: u64,
    gap_ms: u64,
    token: &CancelToken,
) {
    // A button already held by the user (or a previous run) must be released
    // before this loop starts holding its own, so both buttons are never
    // down at once.
    let mut released_any = false;
    for b in [MouseButton::Left, MouseButton::Right] {
        if shared.keys.button_down(b) && trigger != b.as_spec() {
            debug!(button = %b, "releasing conflicting button before click loop");
            shared.output.button_up(b);
            released_any = true;
        }
    }
    if released_any && !wait_run(shared, gap_ms, trigger, token) {
        return;
    }

    let _release = ReleaseGuard {
        output: shared.output.as_ref(),
        button,
    };
    while should_run(shared, trigger, token) {
        shared.output.button_down(button);
        if !wait_run(shared, hold_ms, trigger, token) {
            break;
        }
        shared.output.button_up(button);
        if !wait_run(shared, gap_ms, trigger, token) {
            break;
        }
    }
}

fn run_jitter(
    shared: &EngineShared,
    trigger: &str,
    keys: &[String],
    delay_ms: u64,
    token: &CancelToken,
) {
    let keys = &keys[..keys.len().min(JITTER_MAX_KEYS)];
    if keys.is_empty() {
        return;
    }
    'cycle: while should_run(shared, trigger, token) {
        for key in keys {
            // Re-checked before every tap so a mid-cycle release stops here
            // rather than finishing the sequence.
            if !should_run(shared, trigger, token) {
                break 'cycle;
            }
            shared.output.press_tap(key);
            if !wait_run(shared, delay_ms, trigger, token) {
                break 'cycle;
            }
        }
    }
}

fn run_panic(shared: &EngineShared, id: &str) {
    info!(id, "panic: cancelling all other actions");
    shared.runners.cancel_others(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_one_way_and_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn spawn_if_needed_dedups_live_workers() {
        let runners = RunnerSet::new();
        assert!(runners.spawn_if_needed("a", |token| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
        }));
        assert!(runners.is_running("a"));
        assert!(!runners.spawn_if_needed("a", |_| {}));
        runners.cancel("a");
        let deadline = Instant::now() + Duration::from_millis(200);
        while runners.is_running("a") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!runners.is_running("a"));
        // The slot is re-enterable once the previous worker exited.
        assert!(runners.spawn_if_needed("a", |_| {}));
    }

    #[test]
    fn cancel_others_spares_the_named_worker() {
        let runners = RunnerSet::new();
        let spin = |token: CancelToken| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
        };
        assert!(runners.spawn_if_needed("keep", spin));
        assert!(runners.spawn_if_needed("other", spin));
        runners.cancel_others("keep");
        let deadline = Instant::now() + Duration::from_millis(200);
        while runners.is_running("other") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!runners.is_running("other"));
        assert!(runners.is_running("keep"));
        runners.shutdown();
        assert!(!runners.is_running("keep"));
    }
}
