//! XSG Core - session logic for the console LAN control protocol.
//!
//! This crate implements:
//! - The session state machine (discovery, handshake, authentication, liveness)
//! - Channel management and fragment reassembly
//! - Device state reduction with change-only emission
//! - An async `Session` handle driving the machine over a transport
//! - Discovery scans and power-on

#![forbid(unsafe_code)]

// Core state machine
pub mod machine;
pub mod session;

// Services
pub mod channel;
pub mod command;
pub mod discovery;
pub mod state;

// Supporting modules
pub mod config;
pub mod errors;
pub mod harness;

pub use channel::ChannelKind;
pub use command::{Command, Response, TvRemoteRequest};
pub use config::{AuthToken, SessionConfig};
pub use discovery::{discover, power_on, DiscoveredConsole};
pub use errors::{CommandError, ConnectError, DisconnectReason, ErrorKind};
pub use machine::{ConsoleInfo, SessionEvent, SessionMachine, SessionState};
pub use session::Session;
pub use state::{DeviceState, MediaPlayback, StatusUpdate};
