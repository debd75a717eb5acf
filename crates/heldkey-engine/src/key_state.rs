//! Tracks which physical keys and mouse buttons are currently down.

use std::collections::HashMap;

use std::sync::Arc;

use keyname::MouseButton;
use parking_lot::Mutex;

/// Thread-safe pressed-state tracker.
///
/// Mutated only from the hook ingestion path; read from the dispatcher and
/// from every action thread. The left/right mouse buttons get a dedicated
/// boolean pair because click actions read them on their hot path.
#[derive(Clone)]
pub struct KeyStateTracker {
    inner: Arc<Mutex<PressedState>>,
}

#[derive(Default)]
struct PressedState {
    /// Normalized key/button name -> down.
    down: HashMap<String, bool>,
    left_button: bool,
    right_button: bool,
}

impl KeyStateTracker {
    /// Create a tracker with nothing pressed.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PressedState::default())),
        }
    }

    /// Record a key (or hotkey-bound button) transition.
    pub fn set_key_down(&self, name: &str, down: bool) {
        let norm = keyname::normalize(name);
        self.inner.lock().down.insert(norm, down);
    }

    /// Record a mouse-button transition on the fast-path pair.
    pub fn set_button(&self, button: MouseButton, down: bool) {
        let mut state = self.inner.lock();
        match button {
            MouseButton::Left => state.left_button = down,
            MouseButton::Right => state.right_button = down,
        }
    }

    /// Whether the named key/button is currently down.
    ///
    /// A generic modifier name (`shift`/`ctrl`/`alt`/`cmd`) reports down if
    /// the generic flag or either left/right variant is down; `left`/`right`
    /// read the dedicated button pair.
    pub fn is_down(&self, name: &str) -> bool {
        let norm = keyname::normalize(name);
        let state = self.inner.lock();
        match norm.as_str() {
            "left" => state.left_button,
            "right" => state.right_button,
            _ => {
                if state.down.get(&norm).copied().unwrap_or(false) {
                    return true;
                }
                keyname::variants(&norm).is_some_and(|vs| {
                    vs.iter().any(|v| state.down.get(*v).copied().unwrap_or(false))
                })
            }
        }
    }

    /// Fast-path read of the mouse-button pair.
    pub fn button_down(&self, button: MouseButton) -> bool {
        let state = self.inner.lock();
        match button {
            MouseButton::Left => state.left_button,
            MouseButton::Right => state.right_button,
        }
    }
}

impl Default for KeyStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_plain_keys() {
        let keys = KeyStateTracker::new();
        assert!(!keys.is_down("f13"));
        keys.set_key_down("F13", true);
        assert!(keys.is_down("f13"));
        keys.set_key_down("f13", false);
        assert!(!keys.is_down("f13"));
    }

    #[test]
    fn generic_modifier_reports_variants() {
        let keys = KeyStateTracker::new();
        keys.set_key_down("lctrl", true);
        assert!(keys.is_down("ctrl"));
        assert!(keys.is_down("lctrl"));
        assert!(!keys.is_down("rctrl"));
        keys.set_key_down("lctrl", false);
        keys.set_key_down("ctrl", true);
        assert!(keys.is_down("ctrl"));
        assert!(!keys.is_down("lctrl"));
    }

    #[test]
    fn mouse_buttons_use_dedicated_pair() {
        let keys = KeyStateTracker::new();
        keys.set_button(MouseButton::Right, true);
        assert!(keys.is_down("right"));
        assert!(keys.button_down(MouseButton::Right));
        assert!(!keys.button_down(MouseButton::Left));
        keys.set_button(MouseButton::Right, false);
        assert!(!keys.is_down("right"));
    }
}
