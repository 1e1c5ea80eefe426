//! Session integrity state
//!
//! Owns the counters and transient flags of one exam attempt. All mutation
//! happens synchronously here so that two back-to-back events are both
//! counted before any asynchronous save observes the counters.
//!
//! Invariants:
//! - `violation_count` and `seconds_away` never decrease
//! - at most one away window is open at a time

use chrono::{DateTime, Utc};

use crate::classifier::{IgnoreCause, SuppressionView, Verdict};
use crate::signal::{Severity, ViolationEvent, ViolationReason};
use crate::types::{CounterSnapshot, SubmissionId};

/// What changed after applying a verdict
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    /// Violation charged by this step
    pub charged: Option<ViolationEvent>,
    /// An away window was opened by this step
    pub away_opened: bool,
    /// Whole seconds added by closing an away window
    pub away_closed: Option<u64>,
}

impl StateDelta {
    /// Whether persisted counters moved
    #[inline]
    #[must_use]
    pub fn counters_changed(&self) -> bool {
        self.charged.is_some() || self.away_closed.is_some()
    }
}

/// Counters and transient state of one exam attempt
#[derive(Debug, Clone, Default)]
pub struct SessionIntegrityState {
    submission_id: Option<SubmissionId>,
    violation_count: u32,
    seconds_away: u64,
    away_since: Option<DateTime<Utc>>,
    help_panel_open: bool,
    help_iframe_interacting: bool,
    server_confirmed: bool,
}

impl SessionIntegrityState {
    /// Fresh session with zeroed counters
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session resuming from previously recorded counters
    #[inline]
    #[must_use]
    pub fn restored(snapshot: CounterSnapshot) -> Self {
        Self {
            violation_count: snapshot.violation_count,
            seconds_away: snapshot.seconds_away,
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn submission_id(&self) -> Option<SubmissionId> {
        self.submission_id
    }

    /// Attach the server-side submission once it exists
    pub fn attach_submission(&mut self, id: SubmissionId) {
        self.submission_id = Some(id);
    }

    #[inline]
    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    #[inline]
    #[must_use]
    pub fn seconds_away(&self) -> u64 {
        self.seconds_away
    }

    #[inline]
    #[must_use]
    pub fn away_since(&self) -> Option<DateTime<Utc>> {
        self.away_since
    }

    #[inline]
    #[must_use]
    pub fn help_panel_open(&self) -> bool {
        self.help_panel_open
    }

    #[inline]
    #[must_use]
    pub fn help_interaction_pending(&self) -> bool {
        self.help_iframe_interacting
    }

    /// Whether a save has succeeded, making the server the source of truth
    #[inline]
    #[must_use]
    pub fn server_confirmed(&self) -> bool {
        self.server_confirmed
    }

    pub fn mark_server_confirmed(&mut self) {
        self.server_confirmed = true;
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot::new(self.violation_count, self.seconds_away)
    }

    /// Inputs the classifier needs
    #[inline]
    #[must_use]
    pub fn suppression(&self) -> SuppressionView {
        SuppressionView {
            help_panel_open: self.help_panel_open,
            help_interaction_pending: self.help_iframe_interacting,
        }
    }

    /// Open an away window; no-op if one is already open
    ///
    /// Returns `true` if a window was opened.
    pub fn open_away(&mut self, now: DateTime<Utc>) -> bool {
        if self.away_since.is_some() {
            return false;
        }
        self.away_since = Some(now);
        true
    }

    /// Close the away window and accumulate its length
    ///
    /// The delta is floored to whole seconds and clamped at zero, so a clock
    /// that stepped backwards never shrinks `seconds_away`. Returns the added
    /// seconds, or `None` if no window was open.
    pub fn close_away(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let since = self.away_since.take()?;
        let delta = u64::try_from((now - since).num_seconds()).unwrap_or(0);
        self.seconds_away = self.seconds_away.saturating_add(delta);
        Some(delta)
    }

    /// Charge exactly one violation
    pub fn charge_violation(&mut self, reason: ViolationReason, now: DateTime<Utc>) -> ViolationEvent {
        self.violation_count = self.violation_count.saturating_add(1);
        ViolationEvent {
            reason,
            timestamp: now,
            severity_hint: Severity::from_count(self.violation_count),
            count: self.violation_count,
            seconds_away: self.seconds_away,
        }
    }

    /// Toggle help-panel suppression
    ///
    /// Closing the panel drops any pending help-surface attribution.
    pub fn set_help_panel_open(&mut self, open: bool) {
        if self.help_panel_open && !open {
            self.help_iframe_interacting = false;
        }
        self.help_panel_open = open;
    }

    /// The help surface's own content was interacted with; the next blur is
    /// attributed to it. Ignored while the panel is closed.
    pub fn mark_help_surface_interaction(&mut self) -> bool {
        if !self.help_panel_open {
            return false;
        }
        self.help_iframe_interacting = true;
        true
    }

    /// Apply a classifier verdict
    pub fn apply(&mut self, verdict: &Verdict, now: DateTime<Utc>) -> StateDelta {
        let mut delta = StateDelta::default();
        match verdict {
            Verdict::Ignore(IgnoreCause::HelpSurface) => {
                self.help_iframe_interacting = false;
            }
            Verdict::Ignore(_) => {}
            Verdict::AwayOnly => {
                delta.away_opened = self.open_away(now);
            }
            Verdict::Return => {
                delta.away_closed = self.close_away(now);
            }
            Verdict::Violation(reason) => {
                if reason.opens_away() {
                    delta.away_opened = self.open_away(now);
                }
                delta.charged = Some(self.charge_violation(reason.clone(), now));
            }
        }
        delta
    }
}
