//! Signal model
//!
//! Raw host signals come in as [`Signal`]; confirmed violations go out as
//! [`ViolationEvent`]s carrying a canonical [`ViolationReason`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Viewport;

/// A single key press with its modifier state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyStroke {
    /// `KeyboardEvent.key` value, e.g. `"I"`, `"Tab"`, `"F12"`
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyStroke {
    /// Bare key without modifiers
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

impl std::fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.meta {
            f.write_str("Meta+")?;
        }
        f.write_str(&self.key)
    }
}

/// Raw signal observed by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Signal {
    /// `visibilitychange` with `document.hidden == true`
    VisibilityHidden,
    /// `visibilitychange` with `document.hidden == false`
    VisibilityVisible,
    /// Window lost focus
    Blur,
    /// Window regained focus
    Focus,
    /// Per-session keydown listener
    KeyDown(KeyStroke),
    /// Window resized; carries the geometry sampled at event time
    Resize(Viewport),
    Copy,
    Paste,
    DragStart,
    BeforePrint,
    /// The share API was invoked
    ShareAttempt,
    /// Forbidden combo reported by the global key guard
    GlobalKeyCombo { reason: String },
}

impl Signal {
    /// Signals that mean the student left the exam surface
    #[inline]
    #[must_use]
    pub fn is_departure(&self) -> bool {
        matches!(self, Self::VisibilityHidden | Self::Blur)
    }

    /// Signals that mean the student came back
    #[inline]
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self, Self::VisibilityVisible | Self::Focus)
    }

    /// Short name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VisibilityHidden => "visibility-hidden",
            Self::VisibilityVisible => "visibility-visible",
            Self::Blur => "blur",
            Self::Focus => "focus",
            Self::KeyDown(_) => "keydown",
            Self::Resize(_) => "resize",
            Self::Copy => "copy",
            Self::Paste => "paste",
            Self::DragStart => "dragstart",
            Self::BeforePrint => "beforeprint",
            Self::ShareAttempt => "share-attempt",
            Self::GlobalKeyCombo { .. } => "global-key-combo",
        }
    }
}

/// Canonical reason attached to a charged violation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationReason {
    TabSwitch,
    WindowBlur,
    SuspiciousKey(String),
    Copy,
    Paste,
    Resize,
    Print,
    Share,
    Drag,
    /// Pre-rendered description from the global key guard
    KeyCombo(String),
}

impl ViolationReason {
    /// Student-facing label
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::TabSwitch => "cambio de pestaña".to_string(),
            Self::WindowBlur => "pérdida de foco de ventana".to_string(),
            Self::SuspiciousKey(key) => format!("uso de tecla sospechosa: {key}"),
            Self::Copy => "intento de copiar contenido".to_string(),
            Self::Paste => "intento de pegar contenido".to_string(),
            Self::Resize => "cambio de tamaño de ventana".to_string(),
            Self::Print => "intento de imprimir".to_string(),
            Self::Share => "intento de compartir contenido".to_string(),
            Self::Drag => "intento de arrastrar contenido".to_string(),
            Self::KeyCombo(description) => description.clone(),
        }
    }

    /// Whether charging this reason also starts an away window
    #[inline]
    #[must_use]
    pub fn opens_away(&self) -> bool {
        matches!(self, Self::TabSwitch | Self::WindowBlur)
    }
}

impl std::fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Severity tier derived from the cumulative violation count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Bajo,
    Medio,
    Alto,
}

impl Severity {
    /// `count > 3` is high, `count > 1` medium, otherwise low
    #[inline]
    #[must_use]
    pub fn from_count(count: u32) -> Self {
        if count > 3 {
            Self::Alto
        } else if count > 1 {
            Self::Medio
        } else {
            Self::Bajo
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bajo => "BAJO",
            Self::Medio => "MEDIO",
            Self::Alto => "ALTO",
        }
    }
}

/// A confirmed violation, produced once per charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub reason: ViolationReason,
    pub timestamp: DateTime<Utc>,
    pub severity_hint: Severity,
    /// Cumulative count including this violation
    pub count: u32,
    /// Cumulative away seconds at the moment of the charge
    pub seconds_away: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_tiers() {
        assert_eq!(Severity::from_count(0), Severity::Bajo);
        assert_eq!(Severity::from_count(1), Severity::Bajo);
        assert_eq!(Severity::from_count(2), Severity::Medio);
        assert_eq!(Severity::from_count(3), Severity::Medio);
        assert_eq!(Severity::from_count(4), Severity::Alto);
        assert_eq!(Severity::Alto.label(), "ALTO");
    }

    #[test]
    fn labels() {
        assert_eq!(ViolationReason::TabSwitch.label(), "cambio de pestaña");
        assert_eq!(
            ViolationReason::SuspiciousKey("Meta".into()).label(),
            "uso de tecla sospechosa: Meta"
        );
        assert!(ViolationReason::WindowBlur.opens_away());
        assert!(!ViolationReason::Copy.opens_away());
    }

    #[test]
    fn keystroke_display() {
        let stroke = KeyStroke::new("I").ctrl().shift();
        assert_eq!(stroke.to_string(), "Ctrl+Shift+I");
    }

    #[test]
    fn signal_deserializes_from_trace_json() {
        let signal: Signal =
            serde_json::from_str(r#"{"kind":"key-down","key":"n","ctrl":true}"#).unwrap();
        assert_eq!(signal, Signal::KeyDown(KeyStroke::new("n").ctrl()));
    }
}
