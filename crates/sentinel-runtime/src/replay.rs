//! Trace replay
//!
//! Feeds a recorded, timestamped event trace through a monitor attached to a
//! [`HeadlessHost`], with wall time driven by a [`ManualClock`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_core::{CounterSnapshot, ManualClock, QuestionId, SubmissionId, Viewport};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::TryRecvError;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::host::{EventKind, HeadlessHost, HostEvent};
use crate::mirror::MemoryKvStore;
use crate::monitor::{ExamMonitor, MonitorEvent};
use crate::persistence::InMemoryAnswerStore;

/// A recorded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub config: MonitorConfig,
    /// Wall time of the first step; epoch if absent
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub initial_viewport: Option<Viewport>,
    #[serde(default)]
    pub server_snapshot: Option<CounterSnapshot>,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    /// # Errors
    /// `MonitorError::Replay` if the JSON does not describe a trace
    pub fn from_json(raw: &str) -> Result<Self, MonitorError> {
        serde_json::from_str(raw).map_err(|e| MonitorError::Replay(format!("invalid trace: {e}")))
    }
}

/// One step, at a millisecond offset from the start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: TraceAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TraceAction {
    /// Deliver a host event
    Dispatch { event: HostEvent },
    /// Change geometry, fire `resize` and take a devtools sample
    Viewport { viewport: Viewport },
    HelpPanel { open: bool },
    HelpInteraction,
    AttachSubmission { id: i64 },
    ActiveQuestion { id: i64 },
    SaveAnswer {
        question: i64,
        text: String,
        #[serde(default)]
        score: Option<f64>,
    },
}

/// What the replay produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub steps: usize,
    pub counters: CounterSnapshot,
    /// Reason labels of charged violations, in order
    pub violations: Vec<String>,
    pub devtools_opened: usize,
    /// Save calls the answer store received
    pub writes: usize,
    pub degraded: Vec<EventKind>,
}

/// Run a trace to completion
///
/// Pending debounced saves are flushed before the monitor is stopped.
///
/// # Errors
/// - `MonitorError::Replay` for out-of-order or out-of-range timestamps
/// - `MonitorError::Config` for an invalid embedded configuration
pub async fn replay(trace: &Trace) -> Result<ReplayReport, MonitorError> {
    let start = trace.start.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let clock = ManualClock::new(start);
    let store = Arc::new(InMemoryAnswerStore::new());
    let host = Arc::new(
        trace
            .initial_viewport
            .map_or_else(HeadlessHost::new, HeadlessHost::with_viewport),
    );

    let mut builder = ExamMonitor::builder(trace.config.clone())
        .with_answer_store(store.clone())
        .with_mirror_store(Arc::new(MemoryKvStore::new()))
        .with_clock(Arc::new(clock.clone()));
    if let Some(snapshot) = trace.server_snapshot {
        builder = builder.with_server_snapshot(snapshot);
    }
    let monitor = builder.build()?;
    let mut events = monitor.subscribe();
    let started = monitor.start(host.clone())?;

    let mut report = ReplayReport {
        degraded: started.degraded,
        ..ReplayReport::default()
    };
    let mut last_ms = 0;
    for (index, step) in trace.steps.iter().enumerate() {
        if step.at_ms < last_ms {
            return Err(MonitorError::Replay(format!(
                "step {index} at {}ms goes back in time",
                step.at_ms
            )));
        }
        last_ms = step.at_ms;
        let offset = i64::try_from(step.at_ms)
            .map_err(|_| MonitorError::Replay(format!("step {index} offset out of range")))?;
        clock.set(start + chrono::Duration::milliseconds(offset));

        match &step.action {
            TraceAction::Dispatch { event } => {
                host.dispatch(event);
            }
            TraceAction::Viewport { viewport } => {
                host.resize(*viewport);
                monitor.sample_devtools();
            }
            TraceAction::HelpPanel { open } => monitor.set_help_panel_open(*open),
            TraceAction::HelpInteraction => {
                monitor.mark_help_surface_interaction();
            }
            TraceAction::AttachSubmission { id } => monitor.attach_submission(SubmissionId(*id)),
            TraceAction::ActiveQuestion { id } => monitor.set_active_question(QuestionId(*id)),
            TraceAction::SaveAnswer {
                question,
                text,
                score,
            } => {
                monitor
                    .save_answer(QuestionId(*question), text.clone(), *score)
                    .await;
            }
        }
        report.steps += 1;
        drain(&mut events, &mut report);
    }

    monitor.flush().await;
    drain(&mut events, &mut report);
    report.counters = monitor.snapshot();
    report.writes = store.writes();
    monitor.stop();

    tracing::info!(
        steps = report.steps,
        violation_count = report.counters.violation_count,
        seconds_away = report.counters.seconds_away,
        writes = report.writes,
        "replay finished"
    );
    Ok(report)
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<MonitorEvent>, report: &mut ReplayReport) {
    loop {
        match events.try_recv() {
            Ok(MonitorEvent::ViolationCharged(event)) => report.violations.push(event.reason.label()),
            Ok(MonitorEvent::DevToolsOpened) => report.devtools_opened += 1,
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "replay fell behind monitor events");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACE: &str = r#"{
        "steps": [
            {"at_ms": 0, "action": "attach-submission", "id": 11},
            {"at_ms": 0, "action": "active-question", "id": 2},
            {"at_ms": 1000, "action": "dispatch", "event": {"event": "visibility-change", "hidden": true}},
            {"at_ms": 13000, "action": "dispatch", "event": {"event": "visibility-change", "hidden": false}},
            {"at_ms": 14000, "action": "dispatch", "event": {"event": "copy"}}
        ]
    }"#;

    #[tokio::test]
    async fn replays_tab_switch_and_copy() {
        let trace = Trace::from_json(TRACE).unwrap();
        let report = replay(&trace).await.unwrap();

        assert_eq!(report.steps, 5);
        assert_eq!(report.counters, CounterSnapshot::new(2, 12));
        assert_eq!(
            report.violations,
            vec!["cambio de pestaña".to_string(), "intento de copiar contenido".to_string()]
        );
        assert!(report.writes >= 1);
    }

    #[tokio::test]
    async fn rejects_time_travel() {
        let trace = Trace::from_json(
            r#"{"steps": [
                {"at_ms": 5, "action": "help-interaction"},
                {"at_ms": 1, "action": "help-interaction"}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(replay(&trace).await, Err(MonitorError::Replay(_))));
    }

    #[tokio::test]
    async fn viewport_steps_sample_devtools() {
        let trace = Trace::from_json(
            r#"{"steps": [
                {"at_ms": 0, "action": "viewport", "viewport": {"inner_width": 1280, "inner_height": 500, "outer_width": 1280, "outer_height": 800}},
                {"at_ms": 500, "action": "viewport", "viewport": {"inner_width": 1280, "inner_height": 480, "outer_width": 1280, "outer_height": 800}}
            ]}"#,
        )
        .unwrap();
        let report = replay(&trace).await.unwrap();
        assert_eq!(report.devtools_opened, 1);
        assert_eq!(report.counters.violation_count, 0);
    }
}
