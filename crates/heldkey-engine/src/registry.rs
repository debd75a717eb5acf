//! Hotkey definitions and the derived bound-key set.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{Error, Result, runner::ActionSpec};

/// One logical hotkey: a trigger key bound to an action.
///
/// Definitions are created at wiring time and updated in place by the
/// configuration layer; they are never removed during the process lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HotkeyDef {
    /// Stable identifier, e.g. `"DSpam"` or `"ClickSeq1"`.
    pub id: String,
    /// Trigger key name; normalized lazily at match time.
    pub key_name: String,
    /// Disabled hotkeys keep their definition but match nothing.
    pub enabled: bool,
    /// What to run while the trigger is held.
    pub action: ActionSpec,
}

/// The set of hotkey definitions plus the derived set of key names the hook
/// must intercept.
///
/// The bound set is recomputed synchronously on every mutation and published
/// as an `Arc` snapshot, so the hook callback reads a consistent set without
/// holding any lock for longer than a pointer clone.
pub(crate) struct Registry {
    defs: Mutex<HashMap<String, HotkeyDef>>,
    bound: Mutex<Arc<HashSet<String>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            defs: Mutex::new(HashMap::new()),
            bound: Mutex::new(Arc::new(HashSet::new())),
        }
    }

    /// Insert or replace a definition.
    pub(crate) fn define(&self, def: HotkeyDef) {
        let mut defs = self.defs.lock();
        debug!(id = %def.id, key = %def.key_name, enabled = def.enabled, "hotkey defined");
        defs.insert(def.id.clone(), def);
        self.recompute_bound(&defs);
    }

    /// Rebind an existing hotkey to a new trigger key.
    pub(crate) fn update_key(&self, id: &str, key_name: &str) -> Result<()> {
        let mut defs = self.defs.lock();
        let def = defs
            .get_mut(id)
            .ok_or_else(|| Error::UnknownHotkey(id.to_string()))?;
        def.key_name = key_name.to_string();
        debug!(id, key = key_name, "hotkey rebound");
        self.recompute_bound(&defs);
        Ok(())
    }

    /// Enable or disable an existing hotkey.
    pub(crate) fn update_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut defs = self.defs.lock();
        let def = defs
            .get_mut(id)
            .ok_or_else(|| Error::UnknownHotkey(id.to_string()))?;
        def.enabled = enabled;
        debug!(id, enabled, "hotkey enablement updated");
        self.recompute_bound(&defs);
        Ok(())
    }

    /// Snapshot of every key name the hook should intercept.
    pub(crate) fn bound_keys(&self) -> Arc<HashSet<String>> {
        self.bound.lock().clone()
    }

    /// All enabled definitions whose binding matches the incoming normalized
    /// event name, as `(id, normalized trigger, action)`.
    pub(crate) fn lookup(&self, event_norm: &str) -> Vec<(String, String, ActionSpec)> {
        let defs = self.defs.lock();
        defs.values()
            .filter(|def| def.enabled)
            .filter_map(|def| {
                let trigger = keyname::normalize(&def.key_name);
                keyname::matches(&trigger, event_norm)
                    .then(|| (def.id.clone(), trigger, def.action.clone()))
            })
            .collect()
    }

    /// Rebuild the bound set from the enabled definitions, expanding generic
    /// modifiers into their physical variants. Called with the defs lock held
    /// so consumers never observe a partially updated set.
    fn recompute_bound(&self, defs: &HashMap<String, HotkeyDef>) {
        let mut keys = HashSet::new();
        for def in defs.values().filter(|d| d.enabled) {
            keys.extend(keyname::expand(&keyname::normalize(&def.key_name)));
        }
        trace!(count = keys.len(), "bound keys recomputed");
        *self.bound.lock() = Arc::new(keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spam(id: &str, key: &str, enabled: bool) -> HotkeyDef {
        HotkeyDef {
            id: id.to_string(),
            key_name: key.to_string(),
            enabled,
            action: ActionSpec::Spam {
                output_key: "d".to_string(),
                delay_ms: 34,
            },
        }
    }

    #[test]
    fn bound_set_expands_generic_modifiers() {
        let reg = Registry::new();
        reg.define(spam("A", "ctrl", true));
        let bound = reg.bound_keys();
        assert!(bound.contains("ctrl"));
        assert!(bound.contains("lctrl"));
        assert!(bound.contains("rctrl"));
    }

    #[test]
    fn disabled_definitions_are_not_bound() {
        let reg = Registry::new();
        reg.define(spam("A", "f13", true));
        assert!(reg.bound_keys().contains("f13"));
        reg.update_enabled("A", false).unwrap();
        assert!(!reg.bound_keys().contains("f13"));
        assert!(reg.lookup("f13").is_empty());
    }

    #[test]
    fn update_key_recomputes_synchronously() {
        let reg = Registry::new();
        reg.define(spam("A", "f13", true));
        reg.update_key("A", "F14").unwrap();
        let bound = reg.bound_keys();
        assert!(!bound.contains("f13"));
        assert!(bound.contains("f14"));
    }

    #[test]
    fn unknown_id_is_an_error() {
        let reg = Registry::new();
        assert!(matches!(
            reg.update_key("nope", "f1"),
            Err(Error::UnknownHotkey(_))
        ));
        assert!(matches!(
            reg.update_enabled("nope", false),
            Err(Error::UnknownHotkey(_))
        ));
    }

    #[test]
    fn lookup_applies_generic_matching() {
        let reg = Registry::new();
        reg.define(spam("Generic", "ctrl", true));
        reg.define(spam("LeftOnly", "lctrl", true));
        let hits = reg.lookup("lctrl");
        let ids: Vec<_> = hits.iter().map(|(id, _, _)| id.as_str()).collect();
        assert!(ids.contains(&"Generic"));
        assert!(ids.contains(&"LeftOnly"));
        let hits = reg.lookup("rctrl");
        let ids: Vec<_> = hits.iter().map(|(id, _, _)| id.as_str()).collect();
        assert!(ids.contains(&"Generic"));
        assert!(!ids.contains(&"LeftOnly"));
    }
}
