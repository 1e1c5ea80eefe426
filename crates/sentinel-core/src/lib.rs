//! Sentinel Core - exam integrity domain logic
//!
//! The synchronous heart of the exam-integrity monitor:
//! - Canonical signal model for browser events
//! - Suspicious key-combo tables (per-session and global guard)
//! - Violation classification with help-panel suppression
//! - Session counters (`violation_count`, `seconds_away`) and away windows
//! - Edge-triggered developer-tools latch
//!
//! Nothing here touches a runtime, a network or a clock by itself; callers
//! pass timestamps in and receive state deltas out.
//!
//! # Example
//!
//! ```rust
//! use sentinel_core::prelude::*;
//! use chrono::{Duration, Utc};
//!
//! let classifier = ViolationClassifier::new();
//! let mut state = SessionIntegrityState::new();
//! let t0 = Utc::now();
//!
//! let hidden = classifier.classify(&Signal::VisibilityHidden, &state.suppression());
//! state.apply(&hidden.verdict, t0);
//!
//! let visible = classifier.classify(&Signal::VisibilityVisible, &state.suppression());
//! state.apply(&visible.verdict, t0 + Duration::seconds(12));
//!
//! assert_eq!(state.violation_count(), 1);
//! assert_eq!(state.seconds_away(), 12);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod classifier;
pub mod clock;
pub mod devtools;
pub mod error;
pub mod keyguard;
pub mod session;
pub mod signal;
pub mod types;

pub use classifier::{Classification, IgnoreCause, SuppressionView, Verdict, ViolationClassifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use devtools::{DevToolsHeuristic, LatchEdge, LatchState, DEFAULT_DEVTOOLS_THRESHOLD_PX};
pub use error::SnapshotError;
pub use keyguard::{is_session_suspicious, GlobalKeyGuard, KeyGuardMatch};
pub use session::{SessionIntegrityState, StateDelta};
pub use signal::{KeyStroke, Severity, Signal, ViolationEvent, ViolationReason};
pub use types::{CounterSnapshot, QuestionId, SubmissionId, Viewport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Sentinel Core
    pub use crate::{
        Classification, Clock, CounterSnapshot, DevToolsHeuristic, GlobalKeyGuard, KeyStroke,
        ManualClock, QuestionId, SessionIntegrityState, Severity, Signal, SubmissionId,
        SystemClock, Verdict, Viewport, ViolationClassifier, ViolationEvent, ViolationReason,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
