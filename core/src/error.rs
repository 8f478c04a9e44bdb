//! Error types shared across the crate
//!
//! Transport faults are translated into session events by the runner, so the
//! only errors that reach callers are user-correctable rejections and startup
//! failures.

use thiserror::Error;

use crate::session::Phase;

/// Failures reported by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Send attempted with no open channel
    #[error("Not connected")]
    NotConnected,

    /// Remote identifier did not resolve to a reachable peer
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Remote identifier equals the local identifier
    #[error("Cannot connect to yourself")]
    SelfConnectAttempt,

    /// A channel is already open or mid-handshake
    #[error("Already connected")]
    AlreadyConnected,

    /// Generic channel error, treated as a disconnect
    #[error("Transport failure: {0}")]
    Failure(String),

    /// The signaling/listening endpoint itself is gone
    #[error("Critical transport failure: {0}")]
    Critical(String),
}

impl TransportError {
    /// Whether the failure ends the session for good.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical(_))
    }
}

/// User actions the session refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Remote identifier is empty")]
    InvalidRemoteId,

    #[error("Local identifier has not been assigned yet")]
    IdentityPending,

    #[error("Cannot connect to yourself")]
    SelfConnectAttempt,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Session terminated, restart required")]
    Terminated,

    #[error("Rematch is cooling down")]
    CoolingDown,

    #[error("{action} not allowed while {phase:?}")]
    NotAllowed { action: &'static str, phase: Phase },
}

impl SessionError {
    /// Whether this is a refused connect request the user should see as a
    /// connection status.
    pub fn is_connect_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidRemoteId | Self::IdentityPending | Self::SelfConnectAttempt
        )
    }
}

/// Failures of the score/bar model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BarError {
    /// Perspective is unknown until a role is assigned
    #[error("Role not assigned")]
    RoleNotAssigned,

    /// A zero threshold has no bar mapping
    #[error("Push threshold must be positive")]
    InvalidThreshold,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
