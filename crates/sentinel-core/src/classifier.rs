//! Violation classification
//!
//! Maps a raw [`Signal`] plus the current suppression state to a [`Verdict`].
//! Rules, first match wins:
//! 1. Help panel open and a help-surface interaction is pending: the next
//!    blur is attributed to the help surface and ignored (flag consumed).
//! 2. Help panel open, departure signal: away-time only.
//! 3. Help panel open, any other charging signal: ignored.
//! 4. Otherwise every qualifying signal charges exactly one violation.
//! 5. Return signals never charge; they only close an open away window.
//!
//! Keydown and resize only qualify when the key-combo table or the
//! outer-smaller-than-inner heuristic says so.

use crate::keyguard::is_session_suspicious;
use crate::signal::{Signal, ViolationReason};

/// Suppression inputs read from the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressionView {
    pub help_panel_open: bool,
    pub help_interaction_pending: bool,
}

/// Why a signal was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreCause {
    /// Attributed to the help surface; the pending flag must be consumed
    HelpSurface,
    /// Suppressed while the help panel is open
    HelpPanelOpen,
    /// Signal does not match any suspicious pattern
    NotSuspicious,
}

/// What the session should do with a signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ignore(IgnoreCause),
    /// Open an away window without charging
    AwayOnly,
    /// Close the away window if one is open
    Return,
    /// Charge one violation
    Violation(ViolationReason),
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    /// The host should cancel the browser default action
    pub prevent_default: bool,
}

/// Stateless signal classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ViolationClassifier;

impl ViolationClassifier {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify one signal
    #[must_use]
    pub fn classify(&self, signal: &Signal, view: &SuppressionView) -> Classification {
        let prevent_default = Self::blocks_default(signal);

        if signal.is_return() {
            return Classification {
                verdict: Verdict::Return,
                prevent_default,
            };
        }

        let Some(reason) = Self::reason_for(signal) else {
            return Classification {
                verdict: Verdict::Ignore(IgnoreCause::NotSuspicious),
                prevent_default,
            };
        };

        let verdict = if view.help_panel_open {
            if view.help_interaction_pending && matches!(signal, Signal::Blur) {
                Verdict::Ignore(IgnoreCause::HelpSurface)
            } else if signal.is_departure() {
                Verdict::AwayOnly
            } else {
                Verdict::Ignore(IgnoreCause::HelpPanelOpen)
            }
        } else {
            Verdict::Violation(reason)
        };

        Classification {
            verdict,
            prevent_default,
        }
    }

    /// Reason a signal would be charged with, if it qualifies at all
    #[must_use]
    pub fn reason_for(signal: &Signal) -> Option<ViolationReason> {
        match signal {
            Signal::VisibilityHidden => Some(ViolationReason::TabSwitch),
            Signal::Blur => Some(ViolationReason::WindowBlur),
            Signal::KeyDown(stroke) if is_session_suspicious(stroke) => {
                Some(ViolationReason::SuspiciousKey(stroke.key.clone()))
            }
            Signal::Resize(viewport) if viewport.outer_smaller_than_inner() => {
                Some(ViolationReason::Resize)
            }
            Signal::Copy => Some(ViolationReason::Copy),
            Signal::Paste => Some(ViolationReason::Paste),
            Signal::DragStart => Some(ViolationReason::Drag),
            Signal::BeforePrint => Some(ViolationReason::Print),
            Signal::ShareAttempt => Some(ViolationReason::Share),
            Signal::GlobalKeyCombo { reason } => Some(ViolationReason::KeyCombo(reason.clone())),
            Signal::KeyDown(_)
            | Signal::Resize(_)
            | Signal::VisibilityVisible
            | Signal::Focus => None,
        }
    }

    fn blocks_default(signal: &Signal) -> bool {
        match signal {
            Signal::KeyDown(stroke) => is_session_suspicious(stroke),
            Signal::Copy
            | Signal::Paste
            | Signal::DragStart
            | Signal::ShareAttempt
            | Signal::GlobalKeyCombo { .. } => true,
            _ => false,
        }
    }
}
