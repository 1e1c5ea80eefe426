//! Testing utilities for the Sentinel workspace
//!
//! Shared fakes, fixtures, and a monitor harness.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentinel_core::{KeyStroke, ManualClock, QuestionId, SubmissionId, Viewport};
use sentinel_runtime::{
    AnswerStore, Dispatch, ExamMonitor, HeadlessHost, HostEvent, MemoryKvStore, MonitorConfig,
    PersistenceError, ReflectionError, ReflectionGenerator, ReflectionPrompt, SaveAck, SaveRequest,
    StartReport,
};

/// Fixed start instant for manual clocks
#[must_use]
pub fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Well-formed generator output
#[must_use]
pub fn reflection_json(title: &str) -> String {
    format!(
        "{{\"title\":\"{title}\",\"message\":\"El conocimiento propio vale más.\",\"suggestion\":\"Sigue con honestidad.\"}}"
    )
}

/// Answer store that records every call and can be told to fail
#[derive(Debug, Default)]
pub struct ScriptedAnswerStore {
    requests: Mutex<Vec<SaveRequest>>,
    failures: Mutex<usize>,
    latency: Mutex<Option<Duration>>,
}

impl ScriptedAnswerStore {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` calls fail with a transient error
    pub fn fail_next(&self, n: usize) {
        *self.failures.lock() = n;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Every request received, including failed ones
    #[must_use]
    pub fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn last(&self) -> Option<SaveRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl AnswerStore for ScriptedAnswerStore {
    async fn save(&self, request: SaveRequest) -> Result<SaveAck, PersistenceError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.requests.lock().push(request);
        let mut failures = self.failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(PersistenceError::Unavailable("scripted failure".into()));
        }
        Ok(SaveAck::ok())
    }
}

/// One scripted generator reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
}

/// Generator answering from a script; well-formed JSON once exhausted
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<ReflectionPrompt>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<ReflectionPrompt> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ReflectionGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &ReflectionPrompt) -> Result<String, ReflectionError> {
        self.prompts.lock().push(prompt.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(reason)) => Err(ReflectionError::Unavailable(reason)),
            None => Ok(reflection_json("Reflexión")),
        }
    }
}

/// A started monitor wired to fakes
pub struct Harness {
    pub monitor: ExamMonitor,
    pub host: Arc<HeadlessHost>,
    pub clock: ManualClock,
    pub store: Arc<ScriptedAnswerStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub kv: Arc<MemoryKvStore>,
    pub report: StartReport,
}

impl Harness {
    /// Started monitor, submission 1, question 1
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::build(MonitorConfig::new(), HeadlessHost::new(), Arc::new(MemoryKvStore::new()))
    }

    #[must_use]
    pub fn with_config(config: MonitorConfig) -> Self {
        Self::build(config, HeadlessHost::new(), Arc::new(MemoryKvStore::new()))
    }

    #[must_use]
    pub fn build(config: MonitorConfig, host: HeadlessHost, kv: Arc<MemoryKvStore>) -> Self {
        let clock = ManualClock::new(t0());
        let store = ScriptedAnswerStore::shared();
        let generator = ScriptedGenerator::shared();
        let monitor = ExamMonitor::builder(config)
            .with_answer_store(store.clone())
            .with_generator(generator.clone())
            .with_mirror_store(kv.clone())
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let host = Arc::new(host);
        let report = monitor.start(host.clone()).unwrap();
        monitor.attach_submission(SubmissionId(1));
        monitor.set_active_question(QuestionId(1));
        Self {
            monitor,
            host,
            clock,
            store,
            generator,
            kv,
            report,
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }

    pub fn hide(&self) -> Dispatch {
        self.host.dispatch(&HostEvent::VisibilityChange { hidden: true })
    }

    pub fn show(&self) -> Dispatch {
        self.host.dispatch(&HostEvent::VisibilityChange { hidden: false })
    }

    pub fn blur(&self) -> Dispatch {
        self.host.dispatch(&HostEvent::Blur)
    }

    pub fn focus(&self) -> Dispatch {
        self.host.dispatch(&HostEvent::Focus)
    }

    pub fn key(&self, stroke: KeyStroke) -> Dispatch {
        self.host.dispatch(&HostEvent::KeyDown(stroke))
    }

    pub fn resize(&self, viewport: Viewport) -> Dispatch {
        self.host.resize(viewport)
    }

    pub fn dispatch(&self, event: &HostEvent) -> Dispatch {
        self.host.dispatch(event)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
