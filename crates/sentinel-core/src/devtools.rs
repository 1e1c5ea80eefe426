//! Developer-tools heuristic
//!
//! Browser chrome noticeably larger than the viewport usually means a docked
//! devtools panel. The measurement is a best-effort advisory signal: some
//! legitimate toolbar setups trip it too, so it only ever raises a notice.
//!
//! Detection is edge-triggered: a two-state latch that reports the
//! closed→open and open→closed crossings and stays silent while the sampled
//! level is unchanged.

use serde::{Deserialize, Serialize};

use crate::types::Viewport;

/// Default chrome excess, in pixels, treated as devtools
pub const DEFAULT_DEVTOOLS_THRESHOLD_PX: i32 = 160;

/// Latch position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatchState {
    #[default]
    Closed,
    Open,
}

/// A boundary crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatchEdge {
    Opened,
    Closed,
}

/// Edge-triggered devtools detector
#[derive(Debug, Clone)]
pub struct DevToolsHeuristic {
    threshold_px: i32,
    state: LatchState,
}

impl DevToolsHeuristic {
    #[inline]
    #[must_use]
    pub fn new(threshold_px: i32) -> Self {
        Self {
            threshold_px,
            state: LatchState::Closed,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> LatchState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == LatchState::Open
    }

    /// Feed one poll sample; returns the edge crossed, if any
    pub fn sample(&mut self, viewport: &Viewport) -> Option<LatchEdge> {
        let level = viewport.chrome_exceeds(self.threshold_px);
        match (self.state, level) {
            (LatchState::Closed, true) => {
                self.state = LatchState::Open;
                Some(LatchEdge::Opened)
            }
            (LatchState::Open, false) => {
                self.state = LatchState::Closed;
                Some(LatchEdge::Closed)
            }
            _ => None,
        }
    }

    /// Back to closed, e.g. on teardown
    pub fn reset(&mut self) {
        self.state = LatchState::Closed;
    }
}

impl Default for DevToolsHeuristic {
    fn default() -> Self {
        Self::new(DEFAULT_DEVTOOLS_THRESHOLD_PX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCKED: Viewport = Viewport {
        inner_width: 1200,
        inner_height: 500,
        outer_width: 1200,
        outer_height: 900,
    };
    const NORMAL: Viewport = Viewport {
        inner_width: 1200,
        inner_height: 820,
        outer_width: 1200,
        outer_height: 900,
    };

    #[test]
    fn fires_once_per_open_edge() {
        let mut latch = DevToolsHeuristic::default();
        assert_eq!(latch.sample(&NORMAL), None);
        assert_eq!(latch.sample(&DOCKED), Some(LatchEdge::Opened));
        for _ in 0..10 {
            assert_eq!(latch.sample(&DOCKED), None);
        }
        assert!(latch.is_open());
        assert_eq!(latch.sample(&NORMAL), Some(LatchEdge::Closed));
        assert_eq!(latch.sample(&DOCKED), Some(LatchEdge::Opened));
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut latch = DevToolsHeuristic::new(160);
        let edge = Viewport::new(1000, 740, 1000, 900);
        assert_eq!(latch.sample(&edge), None);
        let past = Viewport::new(1000, 739, 1000, 900);
        assert_eq!(latch.sample(&past), Some(LatchEdge::Opened));
        latch.reset();
        assert_eq!(latch.state(), LatchState::Closed);
    }
}
