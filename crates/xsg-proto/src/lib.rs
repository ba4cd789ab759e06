//! Wire format for the console LAN control protocol.
//!
//! Two packet families share one UDP port:
//! - simple packets (discovery, power-on, connect handshake) with fixed layouts
//! - message packets (sequenced, channel-addressed, encrypted payloads)
//!
//! The codec is stateless. Encrypted regions are carried as opaque bytes here;
//! sealing and opening them is the job of `xsg-crypto`.

#![forbid(unsafe_code)]

pub mod error;
pub mod message;
pub mod packet;
pub mod payload;
pub mod primitives;
pub mod simple;

pub use error::DecodeError;
pub use message::{MessageFlags, MessageHeader, MessagePacket, MessageType};
pub use packet::{decode, encode, Packet, PacketType};
pub use payload::*;
pub use simple::*;

/// UDP port the console listens on.
pub const CONSOLE_PORT: u16 = 5050;

/// Size of the HMAC-SHA256 integrity tag trailing every protected packet.
pub const TAG_LEN: usize = 32;

/// Cipher block size used for padding protected payloads.
pub const BLOCK_LEN: usize = 16;

/// Channel id used for core (session-level) messages.
pub const CORE_CHANNEL_ID: u64 = 0;

/// Channel id acknowledgements travel on.
pub const ACK_CHANNEL_ID: u64 = 0x1000_0000_0000_0000;

/// Length of `len` once padded to the cipher block size.
pub fn padded_len(len: usize) -> usize {
    let overlap = len % BLOCK_LEN;
    if overlap == 0 {
        len
    } else {
        len + BLOCK_LEN - overlap
    }
}

#[cfg(test)]
mod proptests;
