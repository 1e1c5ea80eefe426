//! Error types for the monitor runtime
//!
//! Nothing here is fatal to exam taking. The taxonomy:
//! - transient collaborator failures (save, reflection) - logged, retried by
//!   the next debounce cycle
//! - malformed collaborator output - replaced with a fallback
//! - host capability gaps (share API missing) - feature degrades
//! - local mirror failures - treated as "no prior session"

use sentinel_core::SnapshotError;

use crate::host::EventKind;

/// Main monitor error type
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Persistence collaborator failed
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Reflection collaborator failed
    #[error("reflection error: {0}")]
    Reflection(#[from] ReflectionError),

    /// Local mirror failed
    #[error("mirror error: {0}")]
    Mirror(#[from] MirrorError),

    /// Host refused a listener
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Modal operation refused
    #[error("modal error: {0}")]
    Modal(#[from] ModalError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Trace replay failed
    #[error("replay error: {0}")]
    Replay(String),

    /// Monitor was stopped and cannot be restarted
    #[error("monitor already stopped")]
    Stopped,

    /// Constructed outside a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl MonitorError {
    /// Check if the next natural cycle may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Persistence(e) => e.is_transient(),
            Self::Reflection(_) | Self::Modal(ModalError::CooldownActive { .. }) => true,
            Self::Mirror(_)
            | Self::Host(_)
            | Self::Modal(_)
            | Self::Config(_)
            | Self::Replay(_)
            | Self::Stopped
            | Self::NoRuntime(_) => false,
        }
    }
}

/// Persistence collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store answered but refused the write
    #[error("save rejected: {0}")]
    Rejected(String),

    /// Store did not answer in time
    #[error("save timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

impl PersistenceError {
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Reflection collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    /// Text generation service failed
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    /// Service answered with no text
    #[error("generator returned no content")]
    Empty,
}

/// Local durable mirror errors
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Backing storage failed
    #[error("mirror io: {0}")]
    Io(#[from] std::io::Error),

    /// Stored payload could not be decoded
    #[error("mirror payload: {0}")]
    Corrupt(#[from] SnapshotError),

    /// Storage not available in this host
    #[error("mirror unavailable: {0}")]
    Unavailable(String),
}

/// Host listener registration errors
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Host has no such capability (e.g. no share API)
    #[error("event {0:?} not supported by host")]
    Unsupported(EventKind),

    /// Host refused the registration
    #[error("listener rejected: {0}")]
    Rejected(String),
}

/// Reflection modal errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModalError {
    /// Minimum reading time has not elapsed
    #[error("modal cannot be dismissed for another {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },

    /// Nothing to dismiss
    #[error("modal is not open")]
    NotOpen,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}
