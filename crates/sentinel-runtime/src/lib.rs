//! Sentinel Runtime - exam integrity monitor on tokio
//!
//! Connects the synchronous domain logic of `sentinel-core` to an event host
//! and to the outside collaborators:
//! - Event host abstraction with reverse-order teardown
//! - Debounced counter persistence and the local counter mirror
//! - Reflection requests and the cooldown-gated reflection modal
//! - Devtools polling
//! - The [`ExamMonitor`] orchestrator with an explicit `start`/`stop` lifecycle
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sentinel_runtime::prelude::*;
//!
//! let monitor = ExamMonitor::builder(MonitorConfig::new())
//!     .with_answer_store(store)
//!     .with_generator(generator)
//!     .build()?;
//! monitor.start(host)?;
//! monitor.attach_submission(SubmissionId(42));
//! monitor.set_active_question(QuestionId(1));
//! // ...
//! monitor.stop();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod debounce;
pub mod error;
pub mod host;
pub mod mirror;
pub mod modal;
pub mod monitor;
pub mod persistence;
pub mod reflection;
pub mod replay;

pub use config::{MonitorConfig, DEFAULT_MIRROR_KEY};
pub use debounce::Debouncer;
pub use error::{
    ConfigError, HostError, MirrorError, ModalError, MonitorError, PersistenceError,
    ReflectionError,
};
pub use host::{
    Dispatch, EventHost, EventKind, Handler, HeadlessHost, HostEvent, ListenerId, Phase,
    SubscriptionSet,
};
pub use mirror::{FileKvStore, KeyValueStore, LocalMirror, MemoryKvStore};
pub use modal::{ModalTicket, ModalView, ReflectionModal};
pub use monitor::{ExamMonitor, MonitorBuilder, MonitorEvent, StartReport};
pub use persistence::{
    AnswerStore, InMemoryAnswerStore, PersistenceBridge, SaveAck, SaveOutcome, SaveRequest,
};
pub use reflection::{
    parse_reflection, Reflection, ReflectionGenerator, ReflectionPrompt, ReflectionRequester,
    StaticReflections,
};
pub use replay::{replay, ReplayReport, Trace, TraceAction, TraceStep};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding the monitor
    pub use crate::{
        AnswerStore, EventHost, ExamMonitor, HeadlessHost, HostEvent, MonitorConfig, MonitorError,
        MonitorEvent, Reflection, ReflectionGenerator, SaveOutcome,
    };
    pub use sentinel_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
