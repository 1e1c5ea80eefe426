//! Core types shared across the monitor
//!
//! - Submission and question identifiers
//! - Cumulative counter snapshots (the only thing that is ever persisted)
//! - Window/viewport geometry samples

use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};

/// Server-side identifier of the exam submission being monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub i64);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the question the student is currently answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub i64);

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cumulative integrity counters
///
/// Serialized with camelCase field names; this is the local mirror format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    /// Confirmed violations so far
    pub violation_count: u32,
    /// Whole seconds spent away from the exam tab
    pub seconds_away: u64,
}

impl CounterSnapshot {
    /// Create a snapshot
    #[inline]
    #[must_use]
    pub fn new(violation_count: u32, seconds_away: u64) -> Self {
        Self {
            violation_count,
            seconds_away,
        }
    }

    /// True when both counters are zero
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violation_count == 0 && self.seconds_away == 0
    }

    /// Encode as mirror JSON
    ///
    /// # Errors
    /// Only if `serde_json` fails, which it does not for this shape.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode mirror JSON
    ///
    /// # Errors
    /// - `SnapshotError::Corrupt` if the payload is not a snapshot object
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(raw)?;
        Ok(snapshot)
    }
}

/// One sample of window geometry, in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub inner_width: i32,
    pub inner_height: i32,
    pub outer_width: i32,
    pub outer_height: i32,
}

impl Viewport {
    /// Create a sample from inner and outer dimensions
    #[inline]
    #[must_use]
    pub fn new(inner_width: i32, inner_height: i32, outer_width: i32, outer_height: i32) -> Self {
        Self {
            inner_width,
            inner_height,
            outer_width,
            outer_height,
        }
    }

    /// Outer window smaller than the inner viewport in either dimension
    #[inline]
    #[must_use]
    pub fn outer_smaller_than_inner(&self) -> bool {
        self.outer_height < self.inner_height || self.outer_width < self.inner_width
    }

    /// Browser chrome wider or taller than `threshold_px`
    #[inline]
    #[must_use]
    pub fn chrome_exceeds(&self, threshold_px: i32) -> bool {
        self.outer_width.saturating_sub(self.inner_width) > threshold_px
            || self.outer_height.saturating_sub(self.inner_height) > threshold_px
    }
}
