//! Exam monitor
//!
//! The orchestrator that owns one exam attempt's integrity state:
//! - Registers the global key guard and the per-session listeners on a host
//! - Classifies every signal synchronously and applies it to the session
//! - Mirrors counters locally and pushes them to the answer store
//! - Opens the reflection modal and requests reflection text
//! - Polls window geometry for the devtools latch
//!
//! Every registration is torn down by [`ExamMonitor::stop`], which also runs
//! on drop. Results that arrive after teardown are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use sentinel_core::{
    Clock, CounterSnapshot, DevToolsHeuristic, GlobalKeyGuard, IgnoreCause, LatchEdge, QuestionId,
    SessionIntegrityState, Signal, SubmissionId, SystemClock, Verdict, ViolationClassifier,
    ViolationEvent, Viewport,
};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{ModalError, MonitorError};
use crate::host::{Dispatch, EventHost, EventKind, Handler, HostEvent, Phase, SubscriptionSet};
use crate::mirror::{KeyValueStore, LocalMirror, MemoryKvStore};
use crate::modal::{ModalView, ReflectionModal};
use crate::persistence::{AnswerStore, InMemoryAnswerStore, PersistenceBridge, SaveOutcome};
use crate::reflection::{Reflection, ReflectionGenerator, ReflectionRequester, StaticReflections};

const EVENT_CAPACITY: usize = 64;

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// One violation was charged
    ViolationCharged(ViolationEvent),
    /// An away window closed
    AwayReconciled { added_secs: u64, seconds_away: u64 },
    /// Reflection text for the open modal arrived
    ReflectionReady(Reflection),
    /// Devtools latch went closed to open; advisory only
    DevToolsOpened,
    /// Devtools latch went open to closed
    DevToolsClosed,
    /// The tab was hidden while the help panel was open
    HelpPanelForcedClosed,
}

/// Outcome of [`ExamMonitor::start`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartReport {
    /// Listeners that were registered, in registration order
    pub registered: Vec<EventKind>,
    /// Capabilities the host could not provide
    pub degraded: Vec<EventKind>,
}

impl StartReport {
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Builder for [`ExamMonitor`]
pub struct MonitorBuilder {
    config: MonitorConfig,
    store: Arc<dyn AnswerStore>,
    generator: Arc<dyn ReflectionGenerator>,
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    server_snapshot: Option<CounterSnapshot>,
    submission: Option<SubmissionId>,
}

impl MonitorBuilder {
    /// Builder with in-memory collaborators and the system clock
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: Arc::new(InMemoryAnswerStore::new()),
            generator: Arc::new(StaticReflections::new()),
            kv: Arc::new(MemoryKvStore::new()),
            clock: Arc::new(SystemClock),
            server_snapshot: None,
            submission: None,
        }
    }

    #[must_use]
    pub fn with_answer_store(mut self, store: Arc<dyn AnswerStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ReflectionGenerator>) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn with_mirror_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Counters the server already holds for this attempt
    ///
    /// When present the local mirror is not consulted.
    #[must_use]
    pub fn with_server_snapshot(mut self, snapshot: CounterSnapshot) -> Self {
        self.server_snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn with_submission(mut self, id: SubmissionId) -> Self {
        self.submission = Some(id);
        self
    }

    /// Build the monitor
    ///
    /// Must be called from within a tokio runtime; timers and collaborator
    /// calls are spawned on it.
    ///
    /// # Errors
    /// - `MonitorError::Config` if the configuration is invalid
    /// - `MonitorError::NoRuntime` outside a tokio runtime
    pub fn build(self) -> Result<ExamMonitor, MonitorError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|e| MonitorError::NoRuntime(e.to_string()))?;

        let mirror = LocalMirror::new(self.kv, self.config.mirror_key.clone());
        let mut state = match self.server_snapshot {
            Some(snapshot) => {
                let mut state = SessionIntegrityState::restored(snapshot);
                state.mark_server_confirmed();
                state
            }
            None => SessionIntegrityState::restored(mirror.load()),
        };
        if let Some(id) = self.submission {
            state.attach_submission(id);
        }
        let initial = state.snapshot();

        let session = Arc::new(Mutex::new(state));
        let live = Arc::new(AtomicBool::new(true));
        let bridge = PersistenceBridge::new(
            self.store,
            Arc::clone(&session),
            Arc::clone(&live),
            self.config.debounce(),
        );
        let requester = self
            .config
            .reflection_enabled
            .then(|| ReflectionRequester::new(self.generator));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session_id = Uuid::new_v4();

        tracing::info!(
            session = %session_id,
            restored = !initial.is_empty(),
            violation_count = initial.violation_count,
            seconds_away = initial.seconds_away,
            "exam monitor created"
        );

        Ok(ExamMonitor {
            shared: Arc::new(Shared {
                modal: Mutex::new(ReflectionModal::new(self.config.reflection_cooldown())),
                devtools: Mutex::new(DevToolsHeuristic::new(self.config.devtools_threshold_px)),
                config: self.config,
                session,
                classifier: ViolationClassifier::new(),
                guard: GlobalKeyGuard::new(),
                bridge,
                requester,
                mirror,
                clock: self.clock,
                events,
                active_question: Mutex::new(None),
                live,
                devtools_notice: AtomicBool::new(false),
                runtime,
                session_id,
            }),
            running: Mutex::new(None),
        })
    }
}

impl std::fmt::Debug for MonitorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorBuilder")
            .field("config", &self.config)
            .field("server_snapshot", &self.server_snapshot)
            .field("submission", &self.submission)
            .finish_non_exhaustive()
    }
}

/// State reachable from listeners, timers and collaborator callbacks
struct Shared {
    config: MonitorConfig,
    session: Arc<Mutex<SessionIntegrityState>>,
    classifier: ViolationClassifier,
    guard: GlobalKeyGuard,
    bridge: PersistenceBridge,
    requester: Option<ReflectionRequester>,
    modal: Mutex<ReflectionModal>,
    mirror: LocalMirror,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<MonitorEvent>,
    active_question: Mutex<Option<QuestionId>>,
    live: Arc<AtomicBool>,
    devtools: Mutex<DevToolsHeuristic>,
    devtools_notice: AtomicBool,
    runtime: Handle,
    session_id: Uuid,
}

impl Shared {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Capture-phase keydown: forbidden combos stop here
    fn on_guard_key(self: &Arc<Self>, event: &HostEvent) -> Dispatch {
        let HostEvent::KeyDown(stroke) = event else {
            return Dispatch::default();
        };
        let Some(hit) = self.guard.inspect(stroke) else {
            return Dispatch::default();
        };
        tracing::debug!(session = %self.session_id, combo = %hit.stroke, "global key guard hit");
        self.observe(Signal::GlobalKeyCombo { reason: hit.reason });
        Dispatch {
            prevent_default: true,
            stop_propagation: true,
        }
    }

    /// Every session listener lands here
    fn on_event(self: &Arc<Self>, event: &HostEvent) -> Dispatch {
        let dispatch = self.observe(event.to_signal());
        if matches!(event, HostEvent::VisibilityChange { hidden: true }) {
            self.force_close_help_panel();
        }
        dispatch
    }

    fn force_close_help_panel(&self) {
        let closed = {
            let mut session = self.session.lock();
            let was_open = session.help_panel_open();
            session.set_help_panel_open(false);
            was_open
        };
        if closed {
            tracing::debug!(session = %self.session_id, "help panel closed on hidden tab");
            self.publish(MonitorEvent::HelpPanelForcedClosed);
        }
    }

    /// Classify and apply one signal, then fan out the effects
    fn observe(self: &Arc<Self>, signal: Signal) -> Dispatch {
        if !self.is_live() {
            return Dispatch::default();
        }
        let now = self.clock.now();
        let (classification, delta, snapshot, submission) = {
            let mut session = self.session.lock();
            let classification = self.classifier.classify(&signal, &session.suppression());
            let delta = session.apply(&classification.verdict, now);
            (classification, delta, session.snapshot(), session.submission_id())
        };

        match &classification.verdict {
            Verdict::Ignore(IgnoreCause::NotSuspicious) => {}
            Verdict::Ignore(cause) => {
                tracing::debug!(session = %self.session_id, signal = signal.kind(), ?cause, "signal suppressed");
            }
            Verdict::AwayOnly => {
                tracing::debug!(session = %self.session_id, signal = signal.kind(), "away time only, help panel open");
            }
            Verdict::Return | Verdict::Violation(_) => {}
        }

        if delta.counters_changed() {
            self.mirror.store(snapshot);
            self.schedule_save();
        }

        if let Some(added_secs) = delta.away_closed {
            self.publish(MonitorEvent::AwayReconciled {
                added_secs,
                seconds_away: snapshot.seconds_away,
            });
        }

        if let Some(event) = delta.charged {
            tracing::info!(
                session = %self.session_id,
                submission_id = ?submission.map(|id| id.0),
                question_id = ?self.active_question.lock().map(|id| id.0),
                reason = %event.reason,
                violation_count = event.count,
                seconds_away = event.seconds_away,
                "violation charged"
            );
            self.publish(MonitorEvent::ViolationCharged(event.clone()));
            self.show_reflection(event);
        }

        Dispatch {
            prevent_default: classification.prevent_default,
            stop_propagation: false,
        }
    }

    fn schedule_save(&self) {
        match *self.active_question.lock() {
            Some(question) => self.bridge.schedule_counters(question),
            None => tracing::debug!(session = %self.session_id, "no active question, save deferred"),
        }
    }

    fn show_reflection(self: &Arc<Self>, event: ViolationEvent) {
        let ticket = self.modal.lock().open(event.reason.label());

        let Some(requester) = &self.requester else {
            let reflection = StaticReflections::new().pick();
            if self.modal.lock().populate(ticket, reflection.clone()) {
                self.publish(MonitorEvent::ReflectionReady(reflection));
            }
            return;
        };

        let weak = Arc::downgrade(self);
        let _enter = self.runtime.enter();
        requester.request(event, move |reflection| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if !shared.is_live() {
                return;
            }
            if shared.modal.lock().populate(ticket, reflection.clone()) {
                shared.publish(MonitorEvent::ReflectionReady(reflection));
            }
        });
    }

    fn sample_devtools(&self, viewport: &Viewport) {
        match self.devtools.lock().sample(viewport) {
            Some(LatchEdge::Opened) => {
                tracing::warn!(
                    session = %self.session_id,
                    inner_width = viewport.inner_width,
                    outer_width = viewport.outer_width,
                    inner_height = viewport.inner_height,
                    outer_height = viewport.outer_height,
                    "developer tools appear to be open"
                );
                self.devtools_notice.store(true, Ordering::Release);
                self.publish(MonitorEvent::DevToolsOpened);
            }
            Some(LatchEdge::Closed) => {
                tracing::debug!(session = %self.session_id, "developer tools closed");
                self.publish(MonitorEvent::DevToolsClosed);
            }
            None => {}
        }
    }
}

fn route(shared: &Weak<Shared>, f: fn(&Arc<Shared>, &HostEvent) -> Dispatch) -> Handler {
    let weak = Weak::clone(shared);
    Arc::new(move |event: &HostEvent| {
        weak.upgrade()
            .map_or_else(Dispatch::default, |shared| f(&shared, event))
    })
}

async fn poll_devtools(shared: Weak<Shared>, host: Arc<dyn EventHost>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.is_live() {
            break;
        }
        shared.sample_devtools(&host.viewport());
    }
}

struct Running {
    subscriptions: SubscriptionSet,
    poller: JoinHandle<()>,
    report: StartReport,
}

/// Integrity monitor for one exam attempt
pub struct ExamMonitor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl ExamMonitor {
    /// Start building a monitor
    #[inline]
    #[must_use]
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    /// Attach to a host
    ///
    /// Registers the global key guard first (capture phase), then the session
    /// listeners, then spawns the devtools poller. Calling it again while
    /// running returns the first report. Capabilities the host lacks are
    /// listed in [`StartReport::degraded`].
    ///
    /// # Errors
    /// `MonitorError::Stopped` after [`stop`](Self::stop)
    pub fn start(&self, host: Arc<dyn EventHost>) -> Result<StartReport, MonitorError> {
        if !self.shared.is_live() {
            return Err(MonitorError::Stopped);
        }
        let mut running = self.running.lock();
        if let Some(running) = running.as_ref() {
            return Ok(running.report.clone());
        }

        let weak = Arc::downgrade(&self.shared);
        let mut listeners: Vec<(EventKind, Phase, Handler)> =
            vec![(EventKind::KeyDown, Phase::Capture, route(&weak, Shared::on_guard_key))];
        for (kind, phase) in [
            (EventKind::VisibilityChange, Phase::Bubble),
            (EventKind::Blur, Phase::Bubble),
            (EventKind::Focus, Phase::Bubble),
            (EventKind::KeyDown, Phase::Capture),
            (EventKind::Resize, Phase::Bubble),
            (EventKind::Copy, Phase::Bubble),
            (EventKind::Paste, Phase::Bubble),
            (EventKind::DragStart, Phase::Bubble),
            (EventKind::BeforePrint, Phase::Bubble),
            (EventKind::Share, Phase::Bubble),
        ] {
            listeners.push((kind, phase, route(&weak, Shared::on_event)));
        }

        let mut subscriptions = SubscriptionSet::new(Arc::clone(&host));
        let mut report = StartReport::default();
        for (kind, phase, handler) in listeners {
            match subscriptions.listen(kind, phase, handler) {
                Ok(_) => report.registered.push(kind),
                Err(error) => {
                    tracing::warn!(session = %self.shared.session_id, ?kind, %error, "listener unavailable, feature degraded");
                    report.degraded.push(kind);
                }
            }
        }

        let poller = self.shared.runtime.spawn(poll_devtools(
            weak,
            host,
            self.shared.config.devtools_poll(),
        ));

        tracing::info!(
            session = %self.shared.session_id,
            listeners = report.registered.len(),
            degraded = report.degraded.len(),
            "exam monitor started"
        );
        *running = Some(Running {
            subscriptions,
            poller,
            report: report.clone(),
        });
        Ok(report)
    }

    /// Tear everything down; safe to call more than once
    ///
    /// Listeners are removed in reverse registration order, the poller and
    /// any pending debounced save are cancelled, and the modal is closed.
    pub fn stop(&self) {
        let was_live = self.shared.live.swap(false, Ordering::AcqRel);
        if let Some(mut running) = self.running.lock().take() {
            running.subscriptions.teardown();
            running.poller.abort();
        }
        if !was_live {
            return;
        }
        self.shared.bridge.cancel();
        self.shared.modal.lock().close();
        self.shared.devtools.lock().reset();
        let snapshot = self.snapshot();
        tracing::info!(
            session = %self.shared.session_id,
            violation_count = snapshot.violation_count,
            seconds_away = snapshot.seconds_away,
            "exam monitor stopped"
        );
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Whether [`stop`](Self::stop) has not been called yet
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.is_live()
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    /// Attach the server-side submission and push the counters held so far
    pub fn attach_submission(&self, id: SubmissionId) {
        self.shared.session.lock().attach_submission(id);
        tracing::info!(session = %self.shared.session_id, submission_id = id.0, "submission attached");
        self.shared.schedule_save();
    }

    /// Question that counter-only saves are written against
    ///
    /// Counters held while no question was active are pushed once a
    /// submission exists.
    pub fn set_active_question(&self, id: QuestionId) {
        *self.shared.active_question.lock() = Some(id);
        let pending = {
            let session = self.shared.session.lock();
            session.submission_id().is_some() && !session.snapshot().is_empty()
        };
        if pending {
            self.shared.schedule_save();
        }
    }

    #[must_use]
    pub fn active_question(&self) -> Option<QuestionId> {
        *self.shared.active_question.lock()
    }

    pub fn set_help_panel_open(&self, open: bool) {
        self.shared.session.lock().set_help_panel_open(open);
        tracing::debug!(session = %self.shared.session_id, open, "help panel toggled");
    }

    /// Called by the help surface's own content before it takes focus
    ///
    /// Returns `false` (and does nothing) while the panel is closed.
    pub fn mark_help_surface_interaction(&self) -> bool {
        self.shared.session.lock().mark_help_surface_interaction()
    }

    /// Current counters
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        self.shared.session.lock().snapshot()
    }

    /// Copy of the full session state
    #[must_use]
    pub fn state(&self) -> SessionIntegrityState {
        self.shared.session.lock().clone()
    }

    /// Receive monitor notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    /// Save an answer together with the current counters
    ///
    /// Works after [`stop`](Self::stop) too; answer submission never depends
    /// on the monitor.
    pub async fn save_answer(
        &self,
        question: QuestionId,
        answer_text: impl Into<String>,
        score: Option<f64>,
    ) -> SaveOutcome {
        self.shared.bridge.save_answer(question, answer_text, score).await
    }

    /// Send a pending debounced save now
    pub async fn flush(&self) {
        self.shared.bridge.flush().await;
    }

    /// Rendered reflection modal, if open
    #[must_use]
    pub fn modal(&self) -> Option<ModalView> {
        self.shared.modal.lock().view()
    }

    /// Dismiss the reflection modal
    ///
    /// # Errors
    /// `ModalError::CooldownActive` before the cooldown ran out, or
    /// `ModalError::NotOpen`
    pub fn dismiss_modal(&self) -> Result<(), ModalError> {
        self.shared.modal.lock().dismiss()
    }

    /// Whether the advisory devtools notice is raised
    #[must_use]
    pub fn devtools_notice(&self) -> bool {
        self.shared.devtools_notice.load(Ordering::Acquire)
    }

    pub fn dismiss_devtools_notice(&self) {
        self.shared.devtools_notice.store(false, Ordering::Release);
    }

    /// Take one devtools sample now, outside the poll schedule
    pub fn sample_devtools(&self) {
        let host = self
            .running
            .lock()
            .as_ref()
            .map(|running| Arc::clone(running.subscriptions.host()));
        if let Some(host) = host {
            if self.shared.is_live() {
                self.shared.sample_devtools(&host.viewport());
            }
        }
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }
}

impl Drop for ExamMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ExamMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamMonitor")
            .field("session_id", &self.shared.session_id)
            .field("live", &self.shared.is_live())
            .field("running", &self.is_running())
            .field("counters", &self.snapshot())
            .finish_non_exhaustive()
    }
}
