//! keyname: Key-name normalization and matching for input bindings.
//!
//! - [`normalize`]: canonical form used everywhere a key name is compared.
//! - [`variants`] / [`expand`]: generic-modifier handling, so a binding like
//!   `"ctrl"` keeps working while explicit `"lctrl"`/`"rctrl"` bindings are
//!   also possible.
//! - [`matches`]: binding-against-event matching with the generic rule
//!   applied on the binding side only.
//! - [`MouseButton`]: the two buttons click actions can hold.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic modifier names and their left/right physical variants.
///
/// Kept small on purpose: these are the only names where a single binding is
/// satisfied by more than one physical key.
const GENERIC_VARIANTS: [(&str, [&str; 2]); 4] = [
    ("shift", ["lshift", "rshift"]),
    ("ctrl", ["lctrl", "rctrl"]),
    ("alt", ["lalt", "ralt"]),
    ("cmd", ["lcmd", "rcmd"]),
];

/// Normalize a key name for comparison: trimmed, ASCII-lowercased.
///
/// A few aliases are folded: `"~"` is the shifted form of the same physical
/// key as `` "`" ``, and the configuration button names `lbutton`/`rbutton`
/// fold to the event names `left`/`right`.
pub fn normalize(name: &str) -> String {
    let norm = name.trim().to_ascii_lowercase();
    match norm.as_str() {
        "~" => "`".to_string(),
        "lbutton" => "left".to_string(),
        "rbutton" => "right".to_string(),
        _ => norm,
    }
}

/// Left/right physical variants for a generic modifier name, if `name` is one.
///
/// Expects a normalized name; returns `None` for everything that is not a
/// generic modifier.
pub fn variants(name: &str) -> Option<[&'static str; 2]> {
    GENERIC_VARIANTS
        .iter()
        .find(|(generic, _)| *generic == name)
        .map(|(_, v)| *v)
}

/// Expand a normalized binding name into the set of physical names it
/// intercepts: the name itself plus its generic variants, if any.
pub fn expand(name: &str) -> Vec<String> {
    let mut names = vec![name.to_string()];
    if let Some(vs) = variants(name) {
        names.extend(vs.iter().map(|v| (*v).to_string()));
    }
    names
}

/// Whether an incoming event name satisfies a binding name.
///
/// Both arguments must already be normalized. Equality always matches; a
/// generic binding additionally matches either of its physical variants. The
/// rule is one-directional: binding `"lctrl"` is never satisfied by an
/// `"rctrl"` event, and a specific binding is not satisfied by the generic
/// name of its family.
pub fn matches(binding: &str, event: &str) -> bool {
    if binding == event {
        return true;
    }
    variants(binding).is_some_and(|vs| vs.contains(&event))
}

/// A physical mouse button a click action can hold.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Right mouse button.
    Right,
}

impl MouseButton {
    /// Parse a button spec. Accepts the event names (`left`/`right`) and the
    /// configuration names (`lbutton`/`rbutton`), case-insensitively.
    pub fn from_spec(s: &str) -> Option<Self> {
        match normalize(s).as_str() {
            "left" | "lbutton" => Some(Self::Left),
            "right" | "rbutton" => Some(Self::Right),
            _ => None,
        }
    }

    /// Canonical event name for this button, as produced by the hook.
    pub fn as_spec(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// The other button of the pair.
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_spec())
    }
}
