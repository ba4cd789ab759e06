//! Datagram transport for the console LAN protocol.
//!
//! The protocol layers above treat the transport as an unreliable, unordered
//! datagram pipe. Reliability, ordering and retries live in the session.

pub mod pump;
pub mod testing;
pub mod traits;
pub mod udp;

pub use pump::*;
pub use testing::*;
pub use traits::*;
pub use udp::*;
