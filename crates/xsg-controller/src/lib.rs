//! XSG Controller - CLI for console LAN control
//!
//! This crate provides a command-line interface for:
//! - Discovering consoles on the local network
//! - Waking and powering off a console
//! - Watching device state changes on a live session
//! - Sending input, media and tv-remote commands

pub mod cli;
pub mod config;
pub mod output;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use xsg_core::{CommandError, ConnectError};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting:
/// - 0: Success - operation completed successfully
/// - 1: General error - unspecified error occurred
/// - 2: Authentication failed - the console rejected the client
/// - 3: Timeout - discovery, handshake or command timed out
/// - 4: Connection failed - handshake or transport failure
/// - 5: Invalid input - bad arguments or command
/// - 6: Not connected - the session was not authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    AuthenticationFailed = 2,
    Timeout = 3,
    ConnectionFailed = 4,
    InvalidInput = 5,
    NotConnected = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::AuthenticationFailed => "AUTH_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NotConnected => "NOT_CONNECTED",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::AuthenticationFailed => "The console rejected the client",
            ExitCode::Timeout => "Operation timed out",
            ExitCode::ConnectionFailed => "Could not establish a session",
            ExitCode::InvalidInput => "Invalid arguments or command",
            ExitCode::NotConnected => "No authenticated session",
        }
    }
}

impl From<&ConnectError> for ExitCode {
    fn from(err: &ConnectError) -> Self {
        match err {
            ConnectError::DiscoveryTimeout | ConnectError::HandshakeTimeout => ExitCode::Timeout,
            ConnectError::AuthRejected(_) => ExitCode::AuthenticationFailed,
            ConnectError::HandshakeFailed(_) | ConnectError::Transport(_) => ExitCode::ConnectionFailed,
            ConnectError::InProgress | ConnectError::SessionClosed => ExitCode::GeneralError,
        }
    }
}

impl From<&CommandError> for ExitCode {
    fn from(err: &CommandError) -> Self {
        match err {
            CommandError::NotAuthenticated(_) | CommandError::SessionClosed => ExitCode::NotConnected,
            CommandError::Timeout => ExitCode::Timeout,
            CommandError::ChannelRejected { .. } | CommandError::Transport(_) => ExitCode::ConnectionFailed,
            CommandError::InvalidCommand(_) => ExitCode::InvalidInput,
        }
    }
}
