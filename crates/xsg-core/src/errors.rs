//! Error types for the session layer.
//!
//! Datagram-level problems (bad tags, truncated or unknown packets, stale
//! sequence numbers) never appear here: they are logged and dropped inside the
//! session. What remains is what a caller can act on.

use thiserror::Error;

use crate::channel::ChannelKind;
use crate::machine::SessionState;

// ============================================================================
// Connect
// ============================================================================

/// Why `connect()` did not reach `Authenticated`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// No matching discovery response within the retry budget.
    #[error("discovery timed out")]
    DiscoveryTimeout,

    /// The console refused the connect request or its key was unusable.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The console rejected the client's authentication.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// A connect attempt is already running, or the session is already up.
    #[error("connect already in progress")]
    InProgress,

    #[error("session closed")]
    SessionClosed,

    #[error("transport failed: {0}")]
    Transport(String),
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Issued while the session was not `Authenticated`; nothing was sent.
    #[error("session not authenticated (state: {0:?})")]
    NotAuthenticated(SessionState),

    /// No correlated response before the command deadline.
    #[error("command timed out")]
    Timeout,

    #[error("console refused to open the {channel} channel (result {result})")]
    ChannelRejected { channel: ChannelKind, result: u32 },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("session closed")]
    SessionClosed,

    #[error("transport failed: {0}")]
    Transport(String),
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Reason carried by the `Disconnected` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Requested,
    /// No inbound traffic for the heartbeat loss window.
    ConnectionLost,
    /// The console sent Disconnect with this reason code.
    ConsoleDisconnected(u32),
    /// `power_off()` was called.
    PoweredOff,
    TransportFailed(String),
}

/// Category of an error reported on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Discovery,
    Handshake,
    Authentication,
    Transport,
    Channel,
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::DiscoveryTimeout => ErrorKind::Discovery,
            ConnectError::HandshakeFailed(_)
            | ConnectError::HandshakeTimeout
            | ConnectError::InProgress
            | ConnectError::SessionClosed => ErrorKind::Handshake,
            ConnectError::AuthRejected(_) => ErrorKind::Authentication,
            ConnectError::Transport(_) => ErrorKind::Transport,
        }
    }
}
