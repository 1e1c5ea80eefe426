//! Suspicious key-combo tables
//!
//! Two tables exist:
//! - the per-session table, checked by the session keydown listener
//! - the extended global table, checked by [`GlobalKeyGuard`] in capture
//!   phase before anything else sees the event, even when no submission
//!   exists yet

use crate::signal::KeyStroke;

const CTRL_SHIFT_LETTERS: &[&str] = &[
    "I", "J", "C", "X", "P", "M", "L", "K", "U", "E", "F", "D", "B", "O", "S", "V", "Y", "Z", "N",
    "T", "Q", "W",
];

const CTRL_ALT_LETTERS: &[&str] = &[
    "I", "J", "C", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
];

const BARE_FUNCTION_KEYS: &[&str] = &["F1", "F11", "F12"];

/// Per-session table: Alt+Tab, bare Meta, Ctrl+Escape, Ctrl+N
#[must_use]
pub fn is_session_suspicious(stroke: &KeyStroke) -> bool {
    (stroke.alt && stroke.key == "Tab")
        || stroke.key == "Meta"
        || (stroke.ctrl && stroke.key == "Escape")
        || (stroke.ctrl && stroke.key == "n")
}

/// Alt+<uppercase ASCII letter>, i.e. menu mnemonics
fn is_alt_mnemonic(key: &str) -> bool {
    let mut chars = key.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_uppercase())
}

/// A forbidden combo hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGuardMatch {
    pub stroke: KeyStroke,
    /// Description reported upstream
    pub reason: String,
}

/// Always-on interceptor for devtools, view-source and navigation combos
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalKeyGuard;

impl GlobalKeyGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check a key press against the extended table
    #[must_use]
    pub fn inspect(&self, stroke: &KeyStroke) -> Option<KeyGuardMatch> {
        if !Self::is_forbidden(stroke) {
            return None;
        }
        Some(KeyGuardMatch {
            stroke: stroke.clone(),
            reason: format!("Combinación de teclas sospechosa: {}", stroke.key),
        })
    }

    /// Whether the stroke is in the extended forbidden table
    #[must_use]
    pub fn is_forbidden(stroke: &KeyStroke) -> bool {
        let key = stroke.key.as_str();
        (stroke.ctrl && stroke.shift && CTRL_SHIFT_LETTERS.contains(&key))
            || (stroke.ctrl && key == "Tab")
            || (stroke.alt && is_alt_mnemonic(key))
            || BARE_FUNCTION_KEYS.contains(&key)
            || (stroke.ctrl && stroke.alt && CTRL_ALT_LETTERS.contains(&key))
    }
}
