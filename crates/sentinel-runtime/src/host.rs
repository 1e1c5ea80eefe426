//! Event host abstraction
//!
//! The monitor never talks to a DOM directly. A host delivers events to
//! registered handlers and reports window geometry:
//! - [`EventHost`] is the seam a browser binding implements
//! - [`SubscriptionSet`] collects every registration made at start and
//!   removes them in reverse order at stop (or on drop)
//! - [`HeadlessHost`] is an in-process host for tests and trace replay

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sentinel_core::{KeyStroke, Signal, Viewport};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Event types the monitor listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    VisibilityChange,
    Blur,
    Focus,
    KeyDown,
    Resize,
    Copy,
    Paste,
    DragStart,
    BeforePrint,
    /// Interception of the share API
    Share,
}

/// Listener phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Runs before any bubble listener
    Capture,
    Bubble,
}

/// Event delivered by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    VisibilityChange { hidden: bool },
    Blur,
    Focus,
    KeyDown(KeyStroke),
    /// Geometry sampled when the event fired
    Resize(Viewport),
    Copy,
    Paste,
    DragStart,
    BeforePrint,
    Share,
}

impl HostEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::VisibilityChange { .. } => EventKind::VisibilityChange,
            Self::Blur => EventKind::Blur,
            Self::Focus => EventKind::Focus,
            Self::KeyDown(_) => EventKind::KeyDown,
            Self::Resize(_) => EventKind::Resize,
            Self::Copy => EventKind::Copy,
            Self::Paste => EventKind::Paste,
            Self::DragStart => EventKind::DragStart,
            Self::BeforePrint => EventKind::BeforePrint,
            Self::Share => EventKind::Share,
        }
    }

    /// Canonical signal for the classifier
    #[must_use]
    pub fn to_signal(&self) -> Signal {
        match self {
            Self::VisibilityChange { hidden: true } => Signal::VisibilityHidden,
            Self::VisibilityChange { hidden: false } => Signal::VisibilityVisible,
            Self::Blur => Signal::Blur,
            Self::Focus => Signal::Focus,
            Self::KeyDown(stroke) => Signal::KeyDown(stroke.clone()),
            Self::Resize(viewport) => Signal::Resize(*viewport),
            Self::Copy => Signal::Copy,
            Self::Paste => Signal::Paste,
            Self::DragStart => Signal::DragStart,
            Self::BeforePrint => Signal::BeforePrint,
            Self::Share => Signal::ShareAttempt,
        }
    }
}

/// What a handler asks the host to do with the event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Cancel the browser default action (or reject the share call)
    pub prevent_default: bool,
    /// Do not deliver to later listeners
    pub stop_propagation: bool,
}

impl Dispatch {
    #[inline]
    #[must_use]
    pub fn prevented() -> Self {
        Self {
            prevent_default: true,
            stop_propagation: false,
        }
    }

    /// Combine results of several listeners
    #[inline]
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            prevent_default: self.prevent_default || other.prevent_default,
            stop_propagation: self.stop_propagation || other.stop_propagation,
        }
    }
}

/// Event handler
pub type Handler = Arc<dyn Fn(&HostEvent) -> Dispatch + Send + Sync>;

/// Opaque listener handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Something that delivers events and reports geometry
pub trait EventHost: Send + Sync {
    /// Register a handler
    ///
    /// # Errors
    /// `HostError::Unsupported` when the host lacks the capability
    fn add_listener(
        &self,
        kind: EventKind,
        phase: Phase,
        handler: Handler,
    ) -> Result<ListenerId, HostError>;

    /// Remove a handler; unknown ids are ignored
    fn remove_listener(&self, id: ListenerId);

    /// Current window geometry
    fn viewport(&self) -> Viewport;
}

/// Registrations collected during start, torn down in reverse
pub struct SubscriptionSet {
    host: Arc<dyn EventHost>,
    entries: Vec<(ListenerId, EventKind)>,
}

impl SubscriptionSet {
    #[must_use]
    pub fn new(host: Arc<dyn EventHost>) -> Self {
        Self {
            host,
            entries: Vec::new(),
        }
    }

    /// Register and remember a listener
    ///
    /// # Errors
    /// Whatever the host reports; nothing is recorded on failure.
    pub fn listen(
        &mut self,
        kind: EventKind,
        phase: Phase,
        handler: Handler,
    ) -> Result<ListenerId, HostError> {
        let id = self.host.add_listener(kind, phase, handler)?;
        self.entries.push((id, kind));
        Ok(id)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<dyn EventHost> {
        &self.host
    }

    /// Remove every listener, last registered first
    pub fn teardown(&mut self) {
        while let Some((id, kind)) = self.entries.pop() {
            tracing::trace!(?kind, listener = id.0, "removing listener");
            self.host.remove_listener(id);
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for SubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSet")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

struct Registered {
    id: ListenerId,
    kind: EventKind,
    phase: Phase,
    handler: Handler,
}

/// In-process host
///
/// Capture listeners run before bubble listeners, each group in registration
/// order; `stop_propagation` ends delivery.
pub struct HeadlessHost {
    listeners: Mutex<Vec<Registered>>,
    next_id: AtomicU64,
    viewport: Mutex<Viewport>,
    unsupported: HashSet<EventKind>,
}

impl HeadlessHost {
    /// Host with a typical desktop window and every capability
    #[must_use]
    pub fn new() -> Self {
        Self::with_viewport(Viewport::new(1280, 720, 1280, 800))
    }

    #[must_use]
    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            viewport: Mutex::new(viewport),
            unsupported: HashSet::new(),
        }
    }

    /// Drop a capability, e.g. `EventKind::Share`
    #[must_use]
    pub fn without(mut self, kind: EventKind) -> Self {
        self.unsupported.insert(kind);
        self
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.lock() = viewport;
    }

    /// Change geometry and fire `resize`
    pub fn resize(&self, viewport: Viewport) -> Dispatch {
        self.set_viewport(viewport);
        self.dispatch(&HostEvent::Resize(viewport))
    }

    /// Deliver an event to matching listeners
    pub fn dispatch(&self, event: &HostEvent) -> Dispatch {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let listeners = self.listeners.lock();
            let capture = listeners
                .iter()
                .filter(|l| l.kind == kind && l.phase == Phase::Capture);
            let bubble = listeners
                .iter()
                .filter(|l| l.kind == kind && l.phase == Phase::Bubble);
            capture.chain(bubble).map(|l| Arc::clone(&l.handler)).collect()
        };

        let mut outcome = Dispatch::default();
        for handler in handlers {
            outcome = outcome.merge(handler(event));
            if outcome.stop_propagation {
                break;
            }
        }
        outcome
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    #[must_use]
    pub fn listener_count_for(&self, kind: EventKind) -> usize {
        self.listeners.lock().iter().filter(|l| l.kind == kind).count()
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHost for HeadlessHost {
    fn add_listener(
        &self,
        kind: EventKind,
        phase: Phase,
        handler: Handler,
    ) -> Result<ListenerId, HostError> {
        if self.unsupported.contains(&kind) {
            return Err(HostError::Unsupported(kind));
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Registered {
            id,
            kind,
            phase,
            handler,
        });
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|l| l.id != id);
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.lock()
    }
}

impl std::fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessHost")
            .field("listeners", &self.listener_count())
            .field("viewport", &self.viewport())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str, out: Dispatch) -> Handler {
        let log = Arc::clone(log);
        Arc::new(move |_: &HostEvent| {
            log.lock().push(name);
            out
        })
    }

    #[test]
    fn capture_runs_before_bubble_and_can_stop() {
        let host = HeadlessHost::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        host.add_listener(EventKind::KeyDown, Phase::Bubble, recorder(&log, "bubble", Dispatch::default()))
            .unwrap();
        host.add_listener(EventKind::KeyDown, Phase::Capture, recorder(&log, "capture", Dispatch::prevented()))
            .unwrap();

        let out = host.dispatch(&HostEvent::KeyDown(KeyStroke::new("a")));
        assert!(out.prevent_default);
        assert_eq!(*log.lock(), vec!["capture", "bubble"]);

        let stopper = Dispatch {
            prevent_default: true,
            stop_propagation: true,
        };
        host.add_listener(EventKind::Copy, Phase::Capture, recorder(&log, "guard", stopper))
            .unwrap();
        host.add_listener(EventKind::Copy, Phase::Capture, recorder(&log, "late", Dispatch::default()))
            .unwrap();
        log.lock().clear();
        host.dispatch(&HostEvent::Copy);
        assert_eq!(*log.lock(), vec!["guard"]);
    }

    #[test]
    fn subscription_set_tears_down_in_reverse() {
        let host = Arc::new(HeadlessHost::new());
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let mut subs = SubscriptionSet::new(host.clone());
            for kind in [EventKind::Blur, EventKind::Focus, EventKind::Copy] {
                let calls = Arc::clone(&calls);
                subs.listen(
                    kind,
                    Phase::Bubble,
                    Arc::new(move |_: &HostEvent| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Dispatch::default()
                    }),
                )
                .unwrap();
            }
            assert_eq!(subs.len(), 3);
            assert_eq!(host.listener_count(), 3);
        }
        assert_eq!(host.listener_count(), 0);
        host.dispatch(&HostEvent::Blur);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupported_capability_is_reported() {
        let host: Arc<dyn EventHost> = Arc::new(HeadlessHost::new().without(EventKind::Share));
        let mut subs = SubscriptionSet::new(host);
        let err = subs
            .listen(EventKind::Share, Phase::Bubble, Arc::new(|_: &HostEvent| Dispatch::default()))
            .unwrap_err();
        assert!(matches!(err, HostError::Unsupported(EventKind::Share)));
        assert!(subs.is_empty());
    }

    #[test]
    fn visibility_maps_to_signals() {
        assert_eq!(
            HostEvent::VisibilityChange { hidden: true }.to_signal(),
            Signal::VisibilityHidden
        );
        assert_eq!(HostEvent::Share.to_signal(), Signal::ShareAttempt);
    }
}
